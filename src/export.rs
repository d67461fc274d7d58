//! Tabular export: flattening sealed artifacts into the final CSV.
//!
//! Mechanically simple by design: reads whatever sealed region (and detail)
//! artifacts exist, in whatever order the store lists them, and writes
//! exactly one row per originally-collected record. Enrichment columns are
//! blank when detail collection failed or was skipped. No cross-region
//! ordering is promised.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::types::{CollectedRecord, DetailRecord, DetailResult, RegionResult};

/// The fixed output schema, in column order. Written explicitly so the
/// header row is present even when no records were collected.
const HEADERS: [&str; 17] = [
    "region_center_lon",
    "region_center_lat",
    "id",
    "caught_at_gmt",
    "fishing_water_id",
    "fishing_water_name",
    "fishing_water_lon",
    "fishing_water_lat",
    "species_id",
    "species_name",
    "likes_count",
    "text",
    "user_id",
    "fishing_method",
    "catch_and_release",
    "length",
    "weight",
];

/// One row of the fixed output schema. Field order matches [`HEADERS`].
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    region_center_lon: f64,
    region_center_lat: f64,
    id: &'a str,
    caught_at_gmt: String,
    fishing_water_id: Option<&'a str>,
    fishing_water_name: Option<&'a str>,
    fishing_water_lon: Option<f64>,
    fishing_water_lat: Option<f64>,
    species_id: Option<&'a str>,
    species_name: Option<&'a str>,
    likes_count: i64,
    text: Option<&'a str>,
    user_id: &'a str,
    fishing_method: Option<&'a str>,
    catch_and_release: Option<bool>,
    length: Option<f64>,
    weight: Option<f64>,
}

impl<'a> ExportRow<'a> {
    fn new(
        center: (f64, f64),
        collected: &'a CollectedRecord,
        detail: Option<&'a DetailRecord>,
    ) -> Self {
        let record = &collected.record;
        Self {
            region_center_lon: center.0,
            region_center_lat: center.1,
            id: &record.id,
            caught_at_gmt: normalize_timestamp(record.caught_at_gmt.as_deref()),
            fishing_water_id: record.fishing_water.as_ref().map(|w| w.id.as_str()),
            fishing_water_name: record.fishing_water.as_ref().map(|w| w.name.as_str()),
            fishing_water_lon: record.fishing_water.as_ref().map(|w| w.longitude),
            fishing_water_lat: record.fishing_water.as_ref().map(|w| w.latitude),
            species_id: record.species.as_ref().map(|s| s.id.as_str()),
            species_name: record.species.as_ref().map(|s| s.name.as_str()),
            likes_count: record.likes_count,
            text: record.text.as_deref(),
            user_id: &record.user_id,
            fishing_method: detail.and_then(|d| d.fishing_method.as_deref()),
            catch_and_release: detail.and_then(|d| d.catch_and_release),
            length: detail.and_then(|d| d.length),
            weight: detail.and_then(|d| d.weight),
        }
    }
}

/// Re-emit the source timestamp as RFC 3339 when it parses; pass it through
/// untouched when it does not (the export never drops a row over a timestamp)
fn normalize_timestamp(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.to_rfc3339(),
        Err(_) => raw.to_string(),
    }
}

/// Flatten all sealed artifacts into a CSV file at `path`.
///
/// `details` is keyed by region artifact stem; a missing entry means the
/// whole region's detail pass was skipped or blocked. Returns the number of
/// rows written.
pub fn write_export(
    path: &Path,
    regions: &[RegionResult],
    details: &HashMap<String, DetailResult>,
) -> Result<u64> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(HEADERS)?;
    let mut rows = 0u64;

    for region_result in regions {
        let center = region_result.region.center();
        let region_details = details.get(&region_result.region.artifact_stem());

        for collected in &region_result.records {
            let detail = region_details
                .and_then(|d| d.details.get(&collected.record.id))
                .and_then(|d| d.as_ref());
            writer.serialize(ExportRow::new(center, collected, detail))?;
            rows += 1;
        }
    }

    writer.flush()?;
    tracing::info!(rows, path = %path.display(), "export complete");
    Ok(rows)
}
