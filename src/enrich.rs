//! Detail enrichment: the optional per-record second pass.
//!
//! For every record in a sealed region result, one follow-up query fetches
//! extended attributes. A record whose detail fetch fails permanently is
//! recorded as missing detail rather than dropped or aborting the batch:
//! partial *detail* coverage is acceptable, partial *record* coverage is not.
//! The final export keeps a row for every originally-collected record.

use std::collections::BTreeMap;

use crate::source::CatchSource;
use crate::types::{DetailResult, RegionResult};

/// Runs the detail pass for one region's sealed result
pub struct DetailEnricher<'a> {
    source: &'a dyn CatchSource,
}

impl<'a> DetailEnricher<'a> {
    /// Create an enricher over a source
    pub fn new(source: &'a dyn CatchSource) -> Self {
        Self { source }
    }

    /// Fetch detail for every record in `result`.
    ///
    /// Always succeeds as a unit: per-record failures become `None` entries.
    pub async fn enrich(&self, result: &RegionResult) -> DetailResult {
        let mut details = BTreeMap::new();

        for collected in &result.records {
            let id = &collected.record.id;
            // A record can appear once per id even if the source repeats it
            if details.contains_key(id) {
                continue;
            }
            match self.source.fetch_detail(id).await {
                Ok(detail) => {
                    details.insert(id.clone(), Some(detail));
                }
                Err(e) => {
                    tracing::warn!(
                        region = %result.region,
                        catch_id = %id,
                        error = %e,
                        "detail fetch failed, exporting record without detail"
                    );
                    details.insert(id.clone(), None);
                }
            }
        }

        let missing = details.values().filter(|d| d.is_none()).count();
        tracing::info!(
            region = %result.region,
            enriched = details.len() - missing,
            missing,
            "detail pass complete"
        );

        DetailResult {
            region: result.region,
            details,
        }
    }
}
