//! Error types for the load pipeline

use pagehits_common::PagehitsError;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Failure reported by a backend while opening, writing, or closing.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("{count} of {requested} items were left unprocessed")]
    Unprocessed { count: usize, requested: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend error: {0}")]
    Other(String),
}

/// Pipeline-level error returned to the caller of a load.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Source error: {0}")]
    Source(#[from] PagehitsError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker {worker_id} connection failed: {source}")]
    Connection {
        worker_id: usize,
        #[source]
        source: SinkError,
    },

    #[error("Worker {worker_id} stopped after {failed_batches} failed batch write(s)")]
    BatchFailed { worker_id: usize, failed_batches: u64 },

    #[error("Worker {worker_id} panicked: {message}")]
    WorkerPanicked { worker_id: usize, message: String },

    #[error("{missing} of {expected} workers exited without reporting a result")]
    MissingResults { expected: usize, missing: usize },

    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}
