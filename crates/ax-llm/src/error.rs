//! LLM provider errors.

use thiserror::Error;

/// Errors from LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport-level failure talking to the endpoint.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The vendor returned a non-success status.
    #[error("api error {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body (bounded).
        body: String,
    },

    /// The vendor asked us to slow down.
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited {
        /// Suggested wait, if the vendor sent one.
        retry_after_secs: Option<u64>,
    },

    /// A streamed event could not be parsed.
    #[error("malformed stream event: {0}")]
    MalformedEvent(String),

    /// The stream ended before a terminal event.
    #[error("stream ended unexpectedly")]
    Truncated,

    /// Every provider in a fallback chain failed.
    #[error("all providers failed, last error: {0}")]
    AllProvidersFailed(String),
}

impl LlmError {
    /// Whether retrying the same provider may help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Truncated => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::MalformedEvent(_) | Self::AllProvidersFailed(_) => false,
        }
    }
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;
