//! Core types for fishbrain-dl

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// An axis-aligned geographic bounding box in EPSG:4326 lat/lon degrees.
///
/// Regions are immutable once created and are identified by their coordinates:
/// [`Region::artifact_stem`] derives the stable file name used for the
/// region's durable artifact. Subdivision produces four children that exactly
/// tile the parent with no gaps or overlaps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Western edge (minimum longitude)
    pub min_lon: f64,
    /// Southern edge (minimum latitude)
    pub min_lat: f64,
    /// Eastern edge (maximum longitude)
    pub max_lon: f64,
    /// Northern edge (maximum latitude)
    pub max_lat: f64,
}

impl Region {
    /// Create a region, validating that both axes have positive extent
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        if !(min_lon < max_lon && min_lat < max_lat) {
            return Err(Error::InvalidRegion(format!(
                "degenerate bounds ({min_lon}, {min_lat}, {max_lon}, {max_lat})"
            )));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Center point of the region as `(lon, lat)`
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Longitude extent in degrees
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitude extent in degrees
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Split into four quadrants by halving both axes at the midpoint.
    ///
    /// The children exactly tile the parent. Order: north-west, north-east,
    /// south-west, south-east.
    pub fn quadrants(&self) -> [Region; 4] {
        let (mid_lon, mid_lat) = self.center();
        [
            Region {
                min_lon: self.min_lon,
                min_lat: mid_lat,
                max_lon: mid_lon,
                max_lat: self.max_lat,
            },
            Region {
                min_lon: mid_lon,
                min_lat: mid_lat,
                max_lon: self.max_lon,
                max_lat: self.max_lat,
            },
            Region {
                min_lon: self.min_lon,
                min_lat: self.min_lat,
                max_lon: mid_lon,
                max_lat: mid_lat,
            },
            Region {
                min_lon: mid_lon,
                min_lat: self.min_lat,
                max_lon: self.max_lon,
                max_lat: mid_lat,
            },
        ]
    }

    /// Stable identifier derived from the coordinates, used as the artifact
    /// file stem (e.g. `0_0_1_1` for the unit square)
    pub fn artifact_stem(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// One page of results from the remote source
#[derive(Clone, Debug)]
pub struct Page {
    /// Records in the source's natural order
    pub records: Vec<CatchRecord>,
    /// Total record count for the queried region (meaningful on the first page)
    pub total_count: u64,
    /// Continuation token for the next page, scoped to this region's query
    pub next_cursor: Option<String>,
    /// Whether more pages remain
    pub has_more: bool,
}

/// A named water body attached to a catch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FishingWater {
    /// Stable external id of the water body
    pub id: String,
    /// Display name
    pub name: String,
    /// Longitude of the water body
    pub longitude: f64,
    /// Latitude of the water body
    pub latitude: f64,
}

/// A fish species attached to a catch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Stable external id of the species
    pub id: String,
    /// Display name
    pub name: String,
}

/// One catch record as returned by the bounding-box page query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatchRecord {
    /// Stable external id of the catch
    pub id: String,
    /// Capture timestamp in GMT, as reported by the source
    pub caught_at_gmt: Option<String>,
    /// Water body the catch was reported on, if any
    pub fishing_water: Option<FishingWater>,
    /// Species, if identified
    pub species: Option<Species>,
    /// Like count on the post
    pub likes_count: i64,
    /// Post text
    pub text: Option<String>,
    /// Stable external id of the reporting user
    pub user_id: String,
}

/// A collected record tagged with the page it arrived on.
///
/// Keeping the page index explicit (rather than merging region metadata into
/// the raw record) preserves arrival order through serialization and avoids
/// key collisions between source fields and collection metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectedRecord {
    /// Zero-based index of the page this record arrived on
    pub page_index: u32,
    /// The record itself
    pub record: CatchRecord,
}

/// The sealed result of draining one region's pagination.
///
/// Created empty when the region is scheduled, grown page by page, and
/// persisted as a single durable artifact once pagination is exhausted.
/// Never mutated after sealing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionResult {
    /// The region this result covers
    pub region: Region,
    /// Total count the source reported for the region
    pub total_count: u64,
    /// True when `total_count` met or exceeded the retrieval ceiling, meaning
    /// the record set is capped and incomplete
    pub truncated: bool,
    /// All records in arrival order
    pub records: Vec<CollectedRecord>,
}

/// Extended per-catch attributes from the detail query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    /// Fishing method display name
    pub fishing_method: Option<String>,
    /// Whether the catch was released
    pub catch_and_release: Option<bool>,
    /// Length in source units
    pub length: Option<f64>,
    /// Weight in source units
    pub weight: Option<f64>,
    /// Whether the reported position is exact
    pub has_exact_position: Option<bool>,
    /// Catch latitude
    pub latitude: Option<f64>,
    /// Catch longitude
    pub longitude: Option<f64>,
}

/// The sealed result of one region's detail-enrichment pass.
///
/// `None` for a record id means its detail fetch failed permanently; the
/// record still exports, with blank detail columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailResult {
    /// The region whose records were enriched
    pub region: Region,
    /// Detail per catch id, in stable id order
    pub details: BTreeMap<String, Option<DetailRecord>>,
}

/// One failed unit of work in the final run report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Artifact stem of the failed unit
    pub unit: String,
    /// Rendered error
    pub error: String,
}

/// Aggregated outcome of a collection run.
///
/// A failed run still reports everything that did succeed; the orchestrator
/// never aborts sibling units on one unit's failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Leaf regions scheduled for collection
    pub regions_total: usize,
    /// Regions collected by this run
    pub regions_collected: usize,
    /// Regions skipped because their artifact already existed
    pub regions_resumed: usize,
    /// Region units that failed, with errors
    pub regions_failed: Vec<UnitFailure>,
    /// Detail units that never ran because their region unit failed
    pub details_blocked: Vec<UnitFailure>,
    /// Detail units that failed during execution
    pub details_failed: Vec<UnitFailure>,
    /// Regions whose count met the ceiling and were collected truncated
    pub truncated_regions: Vec<Region>,
    /// Total records accumulated across collected and resumed regions
    pub records_collected: u64,
    /// Path of the final export, when the export stage ran
    pub export_path: Option<PathBuf>,
    /// Rows written to the export
    pub export_rows: u64,
}

impl RunReport {
    /// True when any unit failed or was blocked; drives the process exit status
    pub fn has_failures(&self) -> bool {
        !self.regions_failed.is_empty()
            || !self.details_blocked.is_empty()
            || !self.details_failed.is_empty()
    }
}

/// Progress events broadcast during a run.
///
/// Consumers subscribe via [`crate::CatchHarvester::subscribe`]; dropping the
/// receiver is safe, events are fire-and-forget.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A leaf region was scheduled for collection
    RegionQueued {
        /// The region
        region: Region,
    },
    /// One page of records was appended to a region's accumulator
    PageCollected {
        /// The region being drained
        region: Region,
        /// Zero-based page index
        page_index: u32,
        /// Records accumulated so far for the region
        records_so_far: usize,
    },
    /// A region's count met the retrieval ceiling; its result is capped
    RegionTruncated {
        /// The region
        region: Region,
        /// The count the source reported
        total_count: u64,
    },
    /// A region's result was sealed and persisted
    RegionComplete {
        /// The region
        region: Region,
        /// Records in the sealed result
        records: usize,
        /// True when the artifact already existed and no fetching happened
        resumed: bool,
    },
    /// A region's unit of work failed permanently
    RegionFailed {
        /// The region
        region: Region,
        /// Rendered error
        error: String,
    },
    /// A region's detail-enrichment pass finished
    DetailComplete {
        /// The region
        region: Region,
        /// Records with detail fetched
        enriched: usize,
        /// Records whose detail fetch failed (exported with blank detail)
        missing: usize,
    },
    /// The export stage wrote the final table
    ExportComplete {
        /// Rows written (one per collected record)
        rows: u64,
        /// Export file path
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_tile_parent_exactly() {
        let parent = Region::new(-10.0, -4.0, 6.0, 8.0).unwrap();
        let quads = parent.quadrants();

        let area: f64 = quads.iter().map(|q| q.width() * q.height()).sum();
        assert!((area - parent.width() * parent.height()).abs() < 1e-9);

        for q in &quads {
            assert!(q.min_lon >= parent.min_lon && q.max_lon <= parent.max_lon);
            assert!(q.min_lat >= parent.min_lat && q.max_lat <= parent.max_lat);
        }

        // Adjacent quadrants share edges at the midpoint, no gaps
        let (mid_lon, mid_lat) = parent.center();
        assert_eq!(quads[0].max_lon, mid_lon);
        assert_eq!(quads[1].min_lon, mid_lon);
        assert_eq!(quads[2].max_lat, mid_lat);
        assert_eq!(quads[0].min_lat, mid_lat);
    }

    #[test]
    fn degenerate_region_rejected() {
        assert!(Region::new(1.0, 0.0, 1.0, 2.0).is_err());
        assert!(Region::new(0.0, 2.0, 1.0, 2.0).is_err());
        assert!(Region::new(2.0, 0.0, 1.0, 3.0).is_err());
    }

    #[test]
    fn artifact_stem_is_stable() {
        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert_eq!(region.artifact_stem(), "0_0_1_1");

        let region = Region::new(-122.5, 37.25, -122.0, 37.5).unwrap();
        assert_eq!(region.artifact_stem(), "-122.5_37.25_-122_37.5");
    }

    #[test]
    fn run_report_failure_detection() {
        let mut report = RunReport::default();
        assert!(!report.has_failures());

        report.regions_failed.push(UnitFailure {
            unit: "0_0_1_1".to_string(),
            error: "transport error".to_string(),
        });
        assert!(report.has_failures());
    }
}
