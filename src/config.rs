//! Configuration types for fishbrain-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default Fishbrain GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://rutilus.fishbrain.com/graphql";

/// Main configuration for [`crate::CatchHarvester`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// GraphQL endpoint URL (default: the public Fishbrain API)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Workspace directory holding artifacts and the export (default: "./workspace")
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Records requested per page (default: 50, the source's observed maximum)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum record count the source reliably returns for one region
    /// (default: 10,000). Counts at or above this are a truncation condition.
    #[serde(default = "default_count_ceiling")]
    pub count_ceiling: u64,

    /// Fixed grid cell size in degrees. When set, the area of interest is
    /// tiled into cells of this size (fixed-grid policy); when `None`, regions
    /// are split adaptively by quadrant halving until each falls under the
    /// ceiling.
    #[serde(default)]
    pub cell_size: Option<f64>,

    /// Maximum adaptive subdivision depth before giving up on splitting a
    /// pathologically dense region (default: 12)
    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: u32,

    /// Minimum adaptive cell edge length in degrees (default: 1e-4, roughly
    /// ten meters at the equator)
    #[serde(default = "default_min_cell_size")]
    pub min_cell_size: f64,

    /// Maximum units of work executed in parallel (default: 4)
    #[serde(default = "default_max_concurrent_units")]
    pub max_concurrent_units: usize,

    /// Run the per-record detail-enrichment pass after collection (default: false)
    #[serde(default)]
    pub fetch_details: bool,

    /// Retry configuration for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            workspace_dir: default_workspace_dir(),
            page_size: default_page_size(),
            count_ceiling: default_count_ceiling(),
            cell_size: None,
            max_split_depth: default_max_split_depth(),
            min_cell_size: default_min_cell_size(),
            max_concurrent_units: default_max_concurrent_units(),
            fetch_details: false,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Validate settings that serde defaults cannot guard
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config {
                message: "page_size must be at least 1".to_string(),
                key: Some("page_size".to_string()),
            });
        }
        if self.count_ceiling == 0 {
            return Err(Error::Config {
                message: "count_ceiling must be at least 1".to_string(),
                key: Some("count_ceiling".to_string()),
            });
        }
        if self.max_concurrent_units == 0 {
            return Err(Error::Config {
                message: "max_concurrent_units must be at least 1".to_string(),
                key: Some("max_concurrent_units".to_string()),
            });
        }
        if let Some(size) = self.cell_size {
            if size <= 0.0 {
                return Err(Error::Config {
                    message: format!("cell_size must be positive, got {size}"),
                    key: Some("cell_size".to_string()),
                });
            }
        }
        if self.min_cell_size <= 0.0 {
            return Err(Error::Config {
                message: "min_cell_size must be positive".to_string(),
                key: Some("min_cell_size".to_string()),
            });
        }
        Ok(())
    }
}

/// Retry configuration for transient failures.
///
/// Defaults mirror a 5-attempt exponential schedule starting at 100ms,
/// capped at 30 seconds, with jitter against thundering-herd retries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 100ms)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_page_size() -> u32 {
    50
}

fn default_count_ceiling() -> u64 {
    10_000
}

fn default_max_split_depth() -> u32 {
    12
}

fn default_min_cell_size() -> f64 {
    1e-4
}

fn default_max_concurrent_units() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
