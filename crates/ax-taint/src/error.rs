//! Taint subsystem errors.

use thiserror::Error;

/// Errors from taint tracking and sidecar handling.
#[derive(Debug, Error)]
pub enum TaintError {
    /// Sidecar file could not be read or written.
    #[error("sidecar io error: {0}")]
    SidecarIo(#[from] std::io::Error),

    /// Sidecar file contents are not valid JSON.
    ///
    /// Callers recover by treating the workspace as clean and warning.
    #[error("sidecar corrupted: {0}")]
    SidecarCorrupted(String),
}

/// Result type for taint operations.
pub type TaintResult<T> = Result<T, TaintError>;
