//! Error types for media-dl
//!
//! Errors in this crate only surface from synchronous API calls (starting a run,
//! resizing the pool, collaborator I/O). While a run is in progress every failure
//! is expressed as data: a [`Severity`](crate::types::Severity) on the finished job
//! plus events delivered through the progress channel.

use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pool.default_pool_size")
        key: Option<String>,
    },

    /// The work source handed to `start` cannot be turned into a work queue
    #[error("invalid work source: {0}")]
    InvalidWorkSource(String),

    /// `start` was called while a previous run is still in progress
    #[error("orchestrator is already running")]
    AlreadyRunning,

    /// An operation that needs a live run was called while idle
    #[error("orchestrator is not running")]
    NotRunning,

    /// Worker pool slot error
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// External tool could not be located or executed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Catalog collaborator failed to record a media item
    #[error("catalog error: {0}")]
    Catalog(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised by a pool slot when it is handed work
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker already holds a job
    #[error("worker {worker} is busy")]
    Busy {
        /// Index of the worker that rejected the job
        worker: usize,
    },

    /// The worker has been closed and no longer accepts jobs
    #[error("worker {worker} is closed")]
    Closed {
        /// Index of the closed worker
        worker: usize,
    },
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
