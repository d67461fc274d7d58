//! Error types for fishbrain-dl
//!
//! The error taxonomy mirrors how failures propagate through a collection run:
//! - Transient transport failures are retried and only surface after the retry
//!   budget is exhausted; they fail one unit of work, never the whole run.
//! - Protocol failures (unparseable responses, repeated cursors) are permanent
//!   and carry enough raw material to diagnose the server's behavior.
//! - Dependency blocks are reported distinctly from execution failures so an
//!   operator can tell "never ran" apart from "ran and failed".

use thiserror::Error;

/// Result type alias for fishbrain-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fishbrain-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cell_size")
        key: Option<String>,
    },

    /// Region bounds failed validation (min >= max on an axis)
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Network or HTTP transport error (retryable when transient)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server returned a response the client cannot interpret.
    ///
    /// Never retried. Carries the raw body so the offending payload can be
    /// inspected without reproducing the request.
    #[error("protocol error: {message}")]
    Protocol {
        /// What failed to parse or which contract was violated
        message: String,
        /// Raw response body as received from the server
        body: String,
    },

    /// The source returned the same pagination cursor twice for one region.
    ///
    /// This is an integrity violation: continuing would loop forever and
    /// duplicate records, so the region's unit of work aborts instead.
    #[error("pagination cursor repeated, aborting region: {cursor}")]
    CursorRepeated {
        /// The cursor value that was returned twice
        cursor: String,
    },

    /// A unit of work was blocked because a prerequisite unit failed
    #[error("unit {unit} blocked: dependency {dependency} failed")]
    DependencyBlocked {
        /// Name of the unit that never ran
        unit: String,
        /// Name of the failed prerequisite
        dependency: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export error
    #[error("export error: {0}")]
    Csv(#[from] csv::Error),
}
