//! Collection orchestration: the unit-of-work graph walker.
//!
//! `CatchHarvester` plans the leaf regions for an area of interest, runs one
//! collection unit per leaf on a bounded worker pool, optionally runs one
//! detail-enrichment unit per sealed region, and finishes with the CSV
//! export. Per-unit state machine: Pending → Running → {Done, Failed}. Done
//! is the existence of the unit's artifact on durable storage, so a fresh
//! run against the same workspace resumes without re-fetching completed
//! regions. One unit's failure never cancels its siblings; failures are
//! aggregated into the [`RunReport`].

use std::collections::HashMap;
use std::sync::Arc;

use geo::{BoundingRect, Polygon};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::collector::RegionCollector;
use crate::config::Config;
use crate::enrich::DetailEnricher;
use crate::error::{Error, Result};
use crate::export::write_export;
use crate::partition::{Leaf, partition_adaptive, partition_grid};
use crate::source::{CatchSource, GraphqlSource};
use crate::store::{ArtifactStore, PublishOutcome};
use crate::types::{DetailResult, Event, Region, RegionResult, RunReport, UnitFailure};

/// Broadcast channel capacity for progress events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of one region's collection unit
enum RegionOutcome {
    /// Collected by this run and published
    Collected(RegionResult),
    /// Artifact already existed; no fetching happened
    Resumed(RegionResult),
    /// Unit failed permanently (rendered error)
    Failed(String),
}

/// Orchestrates a full collection run over an area of interest
pub struct CatchHarvester {
    config: Arc<Config>,
    source: Arc<dyn CatchSource>,
    store: ArtifactStore,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl CatchHarvester {
    /// Create a harvester backed by the production GraphQL source
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = Arc::new(GraphqlSource::new(&config));
        Self::with_source(config, source)
    }

    /// Create a harvester over an arbitrary source (stubs in tests, wrapped
    /// transports in embedders)
    pub fn with_source(config: Config, source: Arc<dyn CatchSource>) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::new(&config.workspace_dir);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            source,
            store,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Request a graceful stop: no new units are issued, in-flight units
    /// finish or hit their own retry ceiling
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested, no new units will start");
        self.cancel.cancel();
    }

    /// Spawn a task that calls [`CatchHarvester::shutdown`] on Ctrl+C
    pub fn shutdown_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping new units");
                cancel.cancel();
            }
        });
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Run a full collection over `aoi`: plan leaves, collect, optionally
    /// enrich, export. Returns the aggregated report; per-unit failures live
    /// in the report, only setup-level problems (bad AOI, unusable
    /// workspace) surface as `Err`.
    pub async fn run(&self, aoi: &Polygon<f64>) -> Result<RunReport> {
        self.store.init().await?;
        let mut report = RunReport::default();

        // Planning: fixed grid when a cell size is configured, adaptive
        // quadrant splitting otherwise.
        let leaves = match self.config.cell_size {
            Some(cell_size) => partition_grid(aoi, cell_size)
                .into_iter()
                .map(|region| Leaf {
                    region,
                    truncation_risk: false,
                })
                .collect(),
            None => {
                let bounds = aoi.bounding_rect().ok_or_else(|| {
                    Error::InvalidRegion("area of interest has no extent".to_string())
                })?;
                let root = Region::new(
                    bounds.min().x,
                    bounds.min().y,
                    bounds.max().x,
                    bounds.max().y,
                )?;
                let outcome = partition_adaptive(
                    self.source.as_ref(),
                    root,
                    self.config.count_ceiling,
                    self.config.max_split_depth,
                    self.config.min_cell_size,
                )
                .await;
                report.regions_failed.extend(outcome.failures);
                outcome.leaves
            }
        };

        report.regions_total = leaves.len();
        tracing::info!(regions = leaves.len(), "planned leaf regions");

        // Collection units
        let sealed = self.run_region_units(&leaves, &mut report).await;

        // Detail units depend on their region unit's Done state
        let mut detail_results: HashMap<String, DetailResult> = HashMap::new();
        if self.config.fetch_details {
            self.run_detail_units(&leaves, &sealed, &mut report, &mut detail_results)
                .await;
        }

        // Export reads the store, not this run's in-memory state, so regions
        // completed by earlier runs are included too.
        let all_regions = self.store.list_region_results().await?;
        for result in &all_regions {
            if let Some(details) = self.store.load_details_if_complete(&result.region).await {
                detail_results.insert(result.region.artifact_stem(), details);
            }
        }
        let export_path = self.store.export_path();
        let rows = write_export(&export_path, &all_regions, &detail_results)?;
        report.export_rows = rows;
        report.export_path = Some(export_path.clone());
        self.emit(Event::ExportComplete {
            rows,
            path: export_path,
        });

        let grand_total: u64 = all_regions.iter().map(|r| r.records.len() as u64).sum();
        let aoi_bounds = aoi
            .bounding_rect()
            .map(|b| format!("({}, {}, {}, {})", b.min().x, b.min().y, b.max().x, b.max().y))
            .unwrap_or_else(|| "(empty)".to_string());
        self.store.write_marker(grand_total, &aoi_bounds).await?;

        // Persist the ledger of what succeeded and what did not
        tokio::fs::write(
            self.store.report_path(),
            serde_json::to_vec_pretty(&report)?,
        )
        .await?;

        if report.has_failures() {
            tracing::warn!(
                failed = report.regions_failed.len(),
                blocked = report.details_blocked.len(),
                "run finished with failures, see run report"
            );
        } else {
            tracing::info!(
                records = report.records_collected,
                rows = report.export_rows,
                "run complete"
            );
        }
        Ok(report)
    }

    /// Execute one collection unit per leaf on the bounded pool.
    ///
    /// Returns the sealed result per region stem for the detail phase.
    async fn run_region_units(
        &self,
        leaves: &[Leaf],
        report: &mut RunReport,
    ) -> HashMap<String, RegionResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_units));
        let mut join_set: JoinSet<(Region, RegionOutcome)> = JoinSet::new();

        for leaf in leaves {
            if self.cancel.is_cancelled() {
                tracing::warn!("cancelled, not issuing further region units");
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            self.emit(Event::RegionQueued {
                region: leaf.region,
            });

            let region = leaf.region;
            let source = Arc::clone(&self.source);
            let store = self.store.clone();
            let ceiling = self.config.count_ceiling;
            let event_tx = self.event_tx.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let outcome =
                    run_region_unit(source.as_ref(), &store, ceiling, event_tx, &region).await;
                (region, outcome)
            });
        }

        let mut sealed = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (region, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "region unit task panicked");
                    continue;
                }
            };
            match outcome {
                RegionOutcome::Collected(result) => {
                    report.regions_collected += 1;
                    report.records_collected += result.records.len() as u64;
                    if result.truncated {
                        report.truncated_regions.push(region);
                    }
                    sealed.insert(region.artifact_stem(), result);
                }
                RegionOutcome::Resumed(result) => {
                    report.regions_resumed += 1;
                    report.records_collected += result.records.len() as u64;
                    if result.truncated {
                        report.truncated_regions.push(region);
                    }
                    sealed.insert(region.artifact_stem(), result);
                }
                RegionOutcome::Failed(error) => {
                    report.regions_failed.push(UnitFailure {
                        unit: region.artifact_stem(),
                        error,
                    });
                }
            }
        }
        sealed
    }

    /// Execute detail units for every sealed region; report blocked units
    /// for regions whose collection failed.
    async fn run_detail_units(
        &self,
        leaves: &[Leaf],
        sealed: &HashMap<String, RegionResult>,
        report: &mut RunReport,
        detail_results: &mut HashMap<String, DetailResult>,
    ) {
        // A failed region unit blocks its dependent detail unit; it never
        // runs, and that is reported distinctly from an execution failure.
        for failure in &report.regions_failed {
            report.details_blocked.push(UnitFailure {
                unit: failure.unit.clone(),
                error: Error::DependencyBlocked {
                    unit: format!("details/{}", failure.unit),
                    dependency: format!("regions/{}", failure.unit),
                }
                .to_string(),
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_units));
        let mut join_set: JoinSet<(Region, std::result::Result<DetailResult, String>)> =
            JoinSet::new();

        for leaf in leaves {
            let Some(result) = sealed.get(&leaf.region.artifact_stem()) else {
                continue; // failed or never ran; already reported as blocked
            };
            if self.cancel.is_cancelled() {
                tracing::warn!("cancelled, not issuing further detail units");
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let region = leaf.region;
            let result = result.clone();
            let source = Arc::clone(&self.source);
            let store = self.store.clone();
            let event_tx = self.event_tx.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let outcome = run_detail_unit(source.as_ref(), &store, event_tx, &result).await;
                (region, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (region, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "detail unit task panicked");
                    continue;
                }
            };
            match outcome {
                Ok(details) => {
                    detail_results.insert(region.artifact_stem(), details);
                }
                Err(error) => {
                    report.details_failed.push(UnitFailure {
                        unit: region.artifact_stem(),
                        error,
                    });
                }
            }
        }
    }
}

/// One region's collection unit: resume if Done, otherwise collect and publish
async fn run_region_unit(
    source: &dyn CatchSource,
    store: &ArtifactStore,
    ceiling: u64,
    event_tx: broadcast::Sender<Event>,
    region: &Region,
) -> RegionOutcome {
    if let Some(existing) = store.load_region_if_complete(region).await {
        tracing::info!(region = %region, records = existing.records.len(), "region already collected, skipping");
        event_tx
            .send(Event::RegionComplete {
                region: *region,
                records: existing.records.len(),
                resumed: true,
            })
            .ok();
        return RegionOutcome::Resumed(existing);
    }

    let collector = RegionCollector::new(source, ceiling).with_events(event_tx.clone());
    let result = match collector.collect(region).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(region = %region, error = %e, "region collection failed");
            event_tx
                .send(Event::RegionFailed {
                    region: *region,
                    error: e.to_string(),
                })
                .ok();
            return RegionOutcome::Failed(e.to_string());
        }
    };

    match store.publish_region(&result).await {
        Ok(PublishOutcome::Written) => {
            event_tx
                .send(Event::RegionComplete {
                    region: *region,
                    records: result.records.len(),
                    resumed: false,
                })
                .ok();
            RegionOutcome::Collected(result)
        }
        Ok(PublishOutcome::AlreadyComplete) => {
            // A concurrent run won the publish race; its artifact is the
            // unit's result of record.
            let published = store
                .load_region_if_complete(region)
                .await
                .unwrap_or(result);
            RegionOutcome::Resumed(published)
        }
        Err(e) => {
            tracing::error!(region = %region, error = %e, "failed to persist region result");
            RegionOutcome::Failed(e.to_string())
        }
    }
}

/// One region's detail unit: resume if Done, otherwise enrich and publish
async fn run_detail_unit(
    source: &dyn CatchSource,
    store: &ArtifactStore,
    event_tx: broadcast::Sender<Event>,
    result: &RegionResult,
) -> std::result::Result<DetailResult, String> {
    if let Some(existing) = store.load_details_if_complete(&result.region).await {
        tracing::info!(region = %result.region, "details already collected, skipping");
        return Ok(existing);
    }

    let details = DetailEnricher::new(source).enrich(result).await;
    let missing = details.details.values().filter(|d| d.is_none()).count();

    match store.publish_details(&details).await {
        Ok(_) => {
            event_tx
                .send(Event::DetailComplete {
                    region: result.region,
                    enriched: details.details.len() - missing,
                    missing,
                })
                .ok();
            Ok(details)
        }
        Err(e) => {
            tracing::error!(region = %result.region, error = %e, "failed to persist details");
            Err(e.to_string())
        }
    }
}
