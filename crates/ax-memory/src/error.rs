//! Memory store errors.

use thiserror::Error;

/// Errors from memory stores.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Scope is not a safe path segment.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Entry not found.
    #[error("memory entry not found: {0}")]
    NotFound(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
