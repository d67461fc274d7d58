//! Durable artifact store: completion-by-existence persistence.
//!
//! Each unit of work owns exactly one target path under the workspace:
//! region results under `regions/`, detail results under `details/`. A unit
//! is complete iff its artifact exists and parses; that existence check is
//! the only completion signal the orchestrator consumes, which is what makes
//! reruns idempotent across process restarts.
//!
//! Writes go to a uniquely named temp file in the same directory followed by
//! an atomic rename, so a crash mid-write never leaves a corrupt "done"
//! artifact. Immediately before the rename the final path is re-checked: if
//! a concurrent run already published it, the temp file is discarded and the
//! existing artifact wins (at-most-one successful execution per unit).

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::types::{DetailResult, Region, RegionResult};

/// Outcome of publishing one artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This writer created the artifact
    Written,
    /// Another writer got there first; this unit's work was discarded
    AlreadyComplete,
}

/// Filesystem-backed artifact store rooted at the workspace directory
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `workspace_dir` (directories are created by [`ArtifactStore::init`])
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: workspace_dir.into(),
        }
    }

    /// Create the workspace directory layout
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.regions_dir()).await?;
        tokio::fs::create_dir_all(self.details_dir()).await?;
        Ok(())
    }

    /// Directory of sealed region artifacts
    pub fn regions_dir(&self) -> PathBuf {
        self.root.join("regions")
    }

    /// Directory of sealed detail artifacts
    pub fn details_dir(&self) -> PathBuf {
        self.root.join("details")
    }

    /// Path of the final CSV export
    pub fn export_path(&self) -> PathBuf {
        self.root.join("catches.csv")
    }

    /// Path of the run-completion marker
    pub fn marker_path(&self) -> PathBuf {
        self.root.join("query_complete.txt")
    }

    /// Path of the persisted run report ledger
    pub fn report_path(&self) -> PathBuf {
        self.root.join("run_report.json")
    }

    /// Target artifact path for a region's collection unit
    pub fn region_path(&self, region: &Region) -> PathBuf {
        self.regions_dir()
            .join(format!("{}.json", region.artifact_stem()))
    }

    /// Target artifact path for a region's detail unit
    pub fn detail_path(&self, region: &Region) -> PathBuf {
        self.details_dir()
            .join(format!("{}.json", region.artifact_stem()))
    }

    /// Load a region's sealed result if its unit is complete.
    ///
    /// Missing artifact ⇒ `None` (unit pending). An artifact that exists but
    /// does not parse is treated as incomplete (logged and re-executed),
    /// since "done" requires a well-formed artifact.
    pub async fn load_region_if_complete(&self, region: &Region) -> Option<RegionResult> {
        load_if_complete(&self.region_path(region)).await
    }

    /// Load a region's sealed detail result if its unit is complete
    pub async fn load_details_if_complete(&self, region: &Region) -> Option<DetailResult> {
        load_if_complete(&self.detail_path(region)).await
    }

    /// Seal and publish a region result
    pub async fn publish_region(&self, result: &RegionResult) -> Result<PublishOutcome> {
        publish(&self.region_path(&result.region), result).await
    }

    /// Seal and publish a region's detail result
    pub async fn publish_details(&self, result: &DetailResult) -> Result<PublishOutcome> {
        publish(&self.detail_path(&result.region), result).await
    }

    /// Load every sealed region artifact in the store, in directory order.
    ///
    /// The export stage must be robust to any artifact order; no ordering is
    /// promised here. Unparseable files are skipped with a warning.
    pub async fn list_region_results(&self) -> Result<Vec<RegionResult>> {
        let mut results = Vec::new();
        let mut entries = tokio::fs::read_dir(self.regions_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match load_if_complete::<RegionResult>(&path).await {
                Some(result) => results.push(result),
                None => {
                    tracing::warn!(path = %path.display(), "skipping unreadable region artifact");
                }
            }
        }
        Ok(results)
    }

    /// Write the run-completion marker with the grand total, like the export
    /// of record counts an operator checks after a run
    pub async fn write_marker(&self, grand_total: u64, root: &str) -> Result<()> {
        let content = format!("Collected {grand_total} catches in {root}\n");
        tokio::fs::write(self.marker_path(), content).await?;
        Ok(())
    }
}

async fn load_if_complete<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "artifact unreadable");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "artifact exists but is malformed, unit treated as incomplete"
            );
            None
        }
    }
}

async fn publish<T: Serialize>(target: &Path, value: &T) -> Result<PublishOutcome> {
    let json = serde_json::to_vec_pretty(value)?;

    // Unique temp name in the target directory so the rename stays on one
    // filesystem and remains atomic.
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp = target.with_file_name(format!(".{file_name}.tmp-{:08x}", rand::random::<u32>()));

    tokio::fs::write(&tmp, &json).await?;

    // The losing writer of a concurrent race observes the published artifact
    // and discards its own work.
    if tokio::fs::try_exists(target).await? {
        tokio::fs::remove_file(&tmp).await.ok();
        tracing::info!(path = %target.display(), "artifact already published, skipping");
        return Ok(PublishOutcome::AlreadyComplete);
    }

    tokio::fs::rename(&tmp, target).await?;
    Ok(PublishOutcome::Written)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use crate::types::CollectedRecord;
    use tempfile::TempDir;

    fn sample_result(region: Region) -> RegionResult {
        RegionResult {
            region,
            total_count: 1,
            truncated: false,
            records: vec![CollectedRecord {
                page_index: 0,
                record: record("a"),
            }],
        }
    }

    #[tokio::test]
    async fn publish_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.init().await.unwrap();

        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let result = sample_result(region);

        assert!(store.load_region_if_complete(&region).await.is_none());
        assert_eq!(
            store.publish_region(&result).await.unwrap(),
            PublishOutcome::Written
        );

        let loaded = store.load_region_if_complete(&region).await.unwrap();
        assert_eq!(loaded, result);
    }

    #[tokio::test]
    async fn second_publish_observes_existing_artifact_and_skips() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.init().await.unwrap();

        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let first = sample_result(region);
        let mut second = first.clone();
        second.records.push(CollectedRecord {
            page_index: 1,
            record: record("b"),
        });

        assert_eq!(
            store.publish_region(&first).await.unwrap(),
            PublishOutcome::Written
        );
        assert_eq!(
            store.publish_region(&second).await.unwrap(),
            PublishOutcome::AlreadyComplete
        );

        // The first writer's artifact is untouched
        let loaded = store.load_region_if_complete(&region).await.unwrap();
        assert_eq!(loaded.records.len(), 1);

        // No temp litter left behind
        let mut entries = tokio::fs::read_dir(store.regions_dir()).await.unwrap();
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert_eq!(entry.path().extension().unwrap(), "json");
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn malformed_artifact_is_not_complete() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.init().await.unwrap();

        let region = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        tokio::fs::write(store.region_path(&region), b"{ truncated garbage")
            .await
            .unwrap();

        assert!(store.load_region_if_complete(&region).await.is_none());
    }

    #[tokio::test]
    async fn list_region_results_skips_non_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.init().await.unwrap();

        let a = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = Region::new(1.0, 0.0, 2.0, 1.0).unwrap();
        store.publish_region(&sample_result(a)).await.unwrap();
        store.publish_region(&sample_result(b)).await.unwrap();
        tokio::fs::write(store.regions_dir().join("notes.txt"), b"ignore me")
            .await
            .unwrap();

        let results = store.list_region_results().await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
