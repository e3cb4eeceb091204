//! Proxy errors.

use thiserror::Error;

/// Errors from the proxy subsystem.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request path is not on the vendor allowlist.
    #[error("path not allowed: {0}")]
    PathNotAllowed(String),

    /// No credential is configured for the vendor.
    #[error("no credential for vendor: {0}")]
    MissingCredential(String),

    /// The secrets file is missing, unreadable, or badly permissioned.
    #[error("secret store error: {0}")]
    SecretStore(String),

    /// Token refresh failed.
    #[error("oauth refresh failed: {0}")]
    RefreshFailed(String),

    /// Forwarding to the vendor failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Socket binding or I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
