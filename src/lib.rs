//! # fishbrain-dl
//!
//! Resumable geographic collector for Fishbrain catch data.
//!
//! The Fishbrain API only answers bounded-area queries and caps the number of
//! records it returns per area, so collecting a large region means carving it
//! into sub-regions small enough to retrieve reliably, draining cursor-based
//! pagination inside each one, and treating every sub-region as an
//! independently-persisted unit of work. A multi-hour run can be interrupted
//! and restarted without re-fetching completed regions or duplicating
//! records: a region is done exactly when its artifact exists on disk.
//!
//! ## Design Philosophy
//!
//! - **Resumable by construction** - durable per-region artifacts are the
//!   only completion state; reruns skip what exists
//! - **Failures stay small** - one region's failure never aborts its siblings
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to progress events, no polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use fishbrain_dl::{CatchHarvester, Config};
//! use geo::polygon;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         workspace_dir: "./workspace".into(),
//!         cell_size: Some(0.25),
//!         ..Default::default()
//!     };
//!
//!     let harvester = CatchHarvester::new(config)?;
//!     harvester.shutdown_on_ctrl_c();
//!
//!     // Subscribe to progress events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let aoi = polygon![
//!         (x: -94.0, y: 44.0),
//!         (x: -92.0, y: 44.0),
//!         (x: -92.0, y: 46.0),
//!         (x: -94.0, y: 46.0),
//!         (x: -94.0, y: 44.0),
//!     ];
//!     let report = harvester.run(&aoi).await?;
//!     println!("collected {} records", report.records_collected);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Region pagination draining
pub mod collector;
/// Configuration types
pub mod config;
/// Detail enrichment second pass
pub mod enrich;
/// Error types
pub mod error;
/// CSV flattening of sealed artifacts
pub mod export;
/// Collection orchestration
pub mod harvester;
/// Spatial partitioning policies
pub mod partition;
/// GraphQL documents and request builders
pub mod queries;
/// Retry logic with exponential backoff
pub mod retry;
/// The remote catch source seam
pub mod source;
/// Durable artifact store
pub mod store;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use collector::RegionCollector;
pub use config::{Config, DEFAULT_ENDPOINT, RetryConfig};
pub use enrich::DetailEnricher;
pub use error::{Error, Result};
pub use export::write_export;
pub use harvester::CatchHarvester;
pub use partition::{Leaf, Partition, PartitionOutcome, decide, partition_adaptive, partition_grid};
pub use source::{CatchSource, GraphqlSource};
pub use store::{ArtifactStore, PublishOutcome};
pub use types::{
    CatchRecord, CollectedRecord, DetailRecord, DetailResult, Event, FishingWater, Page, Region,
    RegionResult, RunReport, Species, UnitFailure,
};
