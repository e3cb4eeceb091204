//! Sandbox errors.

use thiserror::Error;

/// Errors from sandbox spawning and supervision.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The backend is not usable on this host (missing binary).
    #[error("sandbox backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The agent process could not be spawned.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    /// The run was cancelled (client disconnect, shutdown); the agent
    /// process has been killed.
    #[error("run cancelled")]
    Cancelled,

    /// Feeding stdin or collecting output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
