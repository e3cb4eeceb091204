//! Scheduler errors.

use thiserror::Error;

/// Errors from the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),

    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Store I/O failure.
    #[error("store error: {0}")]
    Store(String),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
