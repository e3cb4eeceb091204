//! Host errors.

use thiserror::Error;

use ax_core::PolicyDenial;

/// Errors from the host pipeline.
#[derive(Debug, Error)]
pub enum HostError {
    /// Inbound request failed validation (bad session ID, malformed body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Denied by policy. Terse for the caller; audit has the detail.
    #[error("blocked by security policy ({code})")]
    PolicyDenied {
        /// Opaque reason code.
        code: PolicyDenial,
    },

    /// The sandbox could not run the agent.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] ax_sandbox::SandboxError),

    /// A provider failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// Store failure.
    #[error("store error: {0}")]
    Store(String),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
