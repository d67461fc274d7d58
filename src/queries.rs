//! GraphQL documents for the Fishbrain API
//!
//! Two operations are used: `GetCatchesInMapBoundingBox` pages through the
//! catches inside a bounding box, and `GetCatchDetails` fetches extended
//! attributes for one catch. Request bodies are standard GraphQL-over-HTTP
//! JSON: `{ "query": ..., "variables": ... }`.

use serde_json::{Value, json};

use crate::types::Region;

/// Paged bounding-box query. Returns `totalCount`, `pageInfo` (cursor and
/// has-next flag) and one page of catch edges.
pub const CATCHES_IN_BOUNDING_BOX: &str = r#"
query GetCatchesInMapBoundingBox($boundingBox: BoundingBoxInputObject, $first: Int, $after: String) {
  mapArea(boundingBox: $boundingBox) {
    catches(first: $first, after: $after) {
      totalCount
      pageInfo {
        startCursor
        hasNextPage
        endCursor
        __typename
      }
      edges {
        node {
          ...CatchId
          createdAt
          caughtAtGmt
          post {
            ...PostId
            catch {
              ...CatchId
              ...CatchFishingWaterName
              ...CatchSpeciesName
              __typename
            }
            likesCount
            text {
              text
              __typename
            }
            user {
              ...UserId
              nickname
              __typename
            }
            __typename
          }
          species {
            ...SpeciesId
            displayName
            __typename
          }
          __typename
        }
        __typename
      }
      __typename
    }
    __typename
  }
}

fragment CatchId on Catch {
  _id: externalId
  __typename
}

fragment CatchFishingWaterName on Catch {
  fishingWater {
    ...FishingWaterId
    displayName
    latitude
    longitude
    __typename
  }
  __typename
}

fragment FishingWaterId on FishingWater {
  _id: externalId
  __typename
}

fragment CatchSpeciesName on Catch {
  species {
    ...SpeciesId
    displayName
    __typename
  }
  __typename
}

fragment SpeciesId on Species {
  _id: externalId
  __typename
}

fragment PostId on Post {
  _id: externalId
  __typename
}

fragment UserId on User {
  _id: externalId
  __typename
}
"#;

/// Per-catch detail query: conditions, position, method, measurements.
pub const CATCH_DETAILS: &str = r#"
query GetCatchDetails($externalId: String) {
  catchDetails: post(externalId: $externalId) {
    ...PostId
    catchConditions: catch {
      ...CatchId
      caughtAtLocalTimeZone
      latitude
      longitude
      __typename
    }
    catchPost: catch {
      ...CatchId
      catchAndRelease
      caughtAtGmt
      fishingMethod {
        ...FishingMethodId
        displayName
        __typename
      }
      hasExactPosition
      length
      weight
      __typename
    }
    __typename
  }
}

fragment CatchId on Catch {
  _id: externalId
  __typename
}

fragment FishingMethodId on FishingMethod {
  _id: externalId
  __typename
}

fragment PostId on Post {
  _id: externalId
  __typename
}
"#;

/// Build the request body for one bounding-box page fetch.
///
/// `cursor` is the opaque continuation token from the previous page's
/// `pageInfo.endCursor`; omitted entirely for the first page.
pub fn page_request(region: &Region, page_size: u32, cursor: Option<&str>) -> Value {
    let mut variables = json!({
        "boundingBox": {
            "southWest": {
                "latitude": region.min_lat,
                "longitude": region.min_lon,
            },
            "northEast": {
                "latitude": region.max_lat,
                "longitude": region.max_lon,
            }
        },
        "first": page_size,
    });
    if let Some(cursor) = cursor {
        variables["after"] = json!(cursor);
    }
    json!({
        "query": CATCHES_IN_BOUNDING_BOX,
        "variables": variables,
    })
}

/// Build the request body for one catch's detail fetch.
pub fn detail_request(catch_id: &str) -> Value {
    json!({
        "query": CATCH_DETAILS,
        "variables": { "externalId": catch_id },
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_request_omits_cursor() {
        let region = Region::new(-1.0, -2.0, 3.0, 4.0).unwrap();
        let body = page_request(&region, 50, None);

        assert!(body["variables"].get("after").is_none());
        assert_eq!(body["variables"]["first"], 50);
        assert_eq!(
            body["variables"]["boundingBox"]["southWest"]["longitude"],
            -1.0
        );
        assert_eq!(
            body["variables"]["boundingBox"]["northEast"]["latitude"],
            4.0
        );
    }

    #[test]
    fn continuation_request_carries_cursor() {
        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let body = page_request(&region, 50, Some("WzE2ODJd"));
        assert_eq!(body["variables"]["after"], "WzE2ODJd");
    }

    #[test]
    fn detail_request_keys_on_external_id() {
        let body = detail_request("abc123");
        assert_eq!(body["variables"]["externalId"], "abc123");
        assert!(
            body["query"]
                .as_str()
                .unwrap()
                .contains("GetCatchDetails")
        );
    }
}
