//! Remote catch source: the paginated query seam.
//!
//! [`CatchSource`] is the trait the collector and enricher depend on; the
//! production implementation [`GraphqlSource`] posts the documents from
//! [`crate::queries`] to the Fishbrain GraphQL endpoint via a shared
//! `reqwest::Client`. Tests substitute scripted stub sources.
//!
//! Transport semantics: connect errors, timeouts and 500/502/503/504
//! responses are retried with the configured backoff; a 2xx body that does
//! not parse as the expected GraphQL shape is a permanent
//! [`Error::Protocol`] carrying the raw body.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::queries;
use crate::retry::fetch_with_retry;
use crate::types::{CatchRecord, DetailRecord, FishingWater, Page, Region, Species};

/// A paginated, geographically-queryable record source.
///
/// Both calls are stateless: all continuation state lives in the cursor,
/// which is only valid for the region that produced it.
#[async_trait]
pub trait CatchSource: Send + Sync {
    /// Fetch one page of catches for a region.
    ///
    /// `cursor = None` starts the sequence; the returned page's `next_cursor`
    /// continues it. `total_count` is meaningful on the first page.
    async fn fetch_page(&self, region: &Region, cursor: Option<&str>) -> Result<Page>;

    /// Fetch extended attributes for one catch by its external id.
    async fn fetch_detail(&self, catch_id: &str) -> Result<DetailRecord>;
}

/// Production [`CatchSource`] backed by the Fishbrain GraphQL API.
///
/// The `reqwest::Client` (connection pool) and retry policy are shared
/// read-only across all workers.
#[derive(Clone)]
pub struct GraphqlSource {
    client: reqwest::Client,
    endpoint: String,
    page_size: u32,
    retry: RetryConfig,
}

impl GraphqlSource {
    /// Build a source from the harvester configuration
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            page_size: config.page_size,
            retry: config.retry.clone(),
        }
    }

    /// POST one GraphQL request body and return the raw response text.
    ///
    /// HTTP-level failures (including 5xx statuses) surface as
    /// [`Error::Transport`] so the retry layer can classify them.
    async fn post(&self, body: &serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl CatchSource for GraphqlSource {
    async fn fetch_page(&self, region: &Region, cursor: Option<&str>) -> Result<Page> {
        let body = queries::page_request(region, self.page_size, cursor);
        let text = fetch_with_retry(&self.retry, || self.post(&body)).await?;
        parse_page(&text)
    }

    async fn fetch_detail(&self, catch_id: &str) -> Result<DetailRecord> {
        let body = queries::detail_request(catch_id);
        let text = fetch_with_retry(&self.retry, || self.post(&body)).await?;
        parse_detail(&text)
    }
}

/// Decode a bounding-box page response, preserving the raw body on failure
fn parse_page(text: &str) -> Result<Page> {
    let envelope: PageEnvelope = serde_json::from_str(text).map_err(|e| Error::Protocol {
        message: format!("page response did not parse: {e}"),
        body: text.to_string(),
    })?;

    let connection = envelope
        .data
        .and_then(|d| d.map_area)
        .map(|m| m.catches)
        .ok_or_else(|| Error::Protocol {
            message: "page response missing data.mapArea.catches".to_string(),
            body: text.to_string(),
        })?;

    let records = connection
        .edges
        .into_iter()
        .map(|edge| edge.node.into_record())
        .collect();

    Ok(Page {
        records,
        total_count: connection.total_count,
        next_cursor: connection.page_info.end_cursor,
        has_more: connection.page_info.has_next_page,
    })
}

/// Decode a catch-detail response, preserving the raw body on failure
fn parse_detail(text: &str) -> Result<DetailRecord> {
    let envelope: DetailEnvelope = serde_json::from_str(text).map_err(|e| Error::Protocol {
        message: format!("detail response did not parse: {e}"),
        body: text.to_string(),
    })?;

    let detail = envelope
        .data
        .and_then(|d| d.catch_details)
        .ok_or_else(|| Error::Protocol {
            message: "detail response missing data.catchDetails".to_string(),
            body: text.to_string(),
        })?;

    let conditions = detail.catch_conditions.unwrap_or_default();
    let catch_post = detail.catch_post.unwrap_or_default();

    Ok(DetailRecord {
        fishing_method: catch_post.fishing_method.map(|m| m.display_name),
        catch_and_release: catch_post.catch_and_release,
        length: catch_post.length,
        weight: catch_post.weight,
        has_exact_position: catch_post.has_exact_position,
        latitude: conditions.latitude,
        longitude: conditions.longitude,
    })
}

// Wire-format structs. Field names follow the GraphQL response; only the
// subset the exporter consumes is decoded, unknown fields are ignored.

#[derive(Deserialize)]
struct PageEnvelope {
    data: Option<PageData>,
}

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "mapArea")]
    map_area: Option<MapArea>,
}

#[derive(Deserialize)]
struct MapArea {
    catches: CatchConnection,
}

#[derive(Deserialize)]
struct CatchConnection {
    #[serde(rename = "totalCount")]
    total_count: u64,
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    edges: Vec<CatchEdge>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct CatchEdge {
    node: CatchNode,
}

#[derive(Deserialize)]
struct CatchNode {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "caughtAtGmt")]
    caught_at_gmt: Option<String>,
    post: PostNode,
    species: Option<SpeciesNode>,
}

impl CatchNode {
    fn into_record(self) -> CatchRecord {
        let inner = self.post.catch;
        let fishing_water = inner.as_ref().and_then(|c| c.fishing_water.clone());
        // Species appears both on the node and inside the post's catch;
        // prefer the post's copy, fall back to the node's.
        let species = inner
            .and_then(|c| c.species)
            .or(self.species)
            .map(|s| Species {
                id: s.id,
                name: s.name,
            });

        CatchRecord {
            id: self.id,
            caught_at_gmt: self.caught_at_gmt,
            fishing_water: fishing_water.map(|w| FishingWater {
                id: w.id,
                name: w.name,
                longitude: w.longitude,
                latitude: w.latitude,
            }),
            species,
            likes_count: self.post.likes_count.unwrap_or(0),
            text: self.post.text.and_then(|t| t.text),
            user_id: self.post.user.id,
        }
    }
}

#[derive(Deserialize)]
struct PostNode {
    catch: Option<InnerCatchNode>,
    #[serde(rename = "likesCount")]
    likes_count: Option<i64>,
    text: Option<TextNode>,
    user: UserNode,
}

#[derive(Deserialize)]
struct InnerCatchNode {
    #[serde(rename = "fishingWater")]
    fishing_water: Option<WaterNode>,
    species: Option<SpeciesNode>,
}

#[derive(Clone, Deserialize)]
struct WaterNode {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "displayName")]
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct SpeciesNode {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "displayName")]
    name: String,
}

#[derive(Deserialize)]
struct TextNode {
    text: Option<String>,
}

#[derive(Deserialize)]
struct UserNode {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct DetailEnvelope {
    data: Option<DetailData>,
}

#[derive(Deserialize)]
struct DetailData {
    #[serde(rename = "catchDetails")]
    catch_details: Option<DetailNode>,
}

#[derive(Deserialize)]
struct DetailNode {
    #[serde(rename = "catchConditions")]
    catch_conditions: Option<ConditionsNode>,
    #[serde(rename = "catchPost")]
    catch_post: Option<CatchPostNode>,
}

#[derive(Default, Deserialize)]
struct ConditionsNode {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Default, Deserialize)]
struct CatchPostNode {
    #[serde(rename = "catchAndRelease")]
    catch_and_release: Option<bool>,
    #[serde(rename = "fishingMethod")]
    fishing_method: Option<MethodNode>,
    #[serde(rename = "hasExactPosition")]
    has_exact_position: Option<bool>,
    length: Option<f64>,
    weight: Option<f64>,
}

#[derive(Deserialize)]
struct MethodNode {
    #[serde(rename = "displayName")]
    display_name: String,
}
