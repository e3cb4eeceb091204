//! Shared error taxonomy for AX operations.
//!
//! Errors fall into four families with different propagation rules:
//! validation errors fail the single call, policy errors fail the call and
//! must be audited, provider errors may be retried or surfaced to the agent
//! as tool results, and fatal errors terminate the process.

use thiserror::Error;

/// Errors that can occur across the AX host and agent.
#[derive(Debug, Error)]
pub enum AxError {
    // Validation errors
    /// Request payload could not be parsed as JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// Action name is not recognized.
    #[error("unknown action: {action}")]
    UnknownAction {
        /// The unrecognized action string.
        action: String,
    },

    /// A field failed schema validation.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Session ID is not a lowercase UUIDv4.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// A caller-supplied path escaped its allowed root.
    #[error("path traversal rejected: {path}")]
    PathTraversal {
        /// The offending path fragment.
        path: String,
    },

    // Policy errors
    /// An action was denied by security policy. The user-facing message is
    /// terse; the detailed reason lives only in the audit log.
    #[error("blocked by security policy ({code})")]
    PolicyDenied {
        /// Opaque reason code surfaced to the caller.
        code: PolicyDenial,
    },

    // Provider errors
    /// An external provider (LLM vendor, web, browser, sandbox) failed.
    #[error("provider error: {provider}: {message}")]
    Provider {
        /// Provider name.
        provider: String,
        /// Error detail.
        message: String,
    },

    /// A provider timed out.
    #[error("provider timeout: {provider} after {timeout_secs}s")]
    ProviderTimeout {
        /// Provider name.
        provider: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    // Fatal errors
    /// Configuration could not be loaded at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A listener socket could not be bound.
    #[error("failed to bind {path}: {reason}")]
    Bind {
        /// Socket path.
        path: String,
        /// Underlying reason.
        reason: String,
    },

    /// Secret store is corrupted or unreadable.
    #[error("secret store error: {0}")]
    SecretStore(String),

    // Plumbing
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AxError {
    /// Whether this error must produce an audit entry before being returned.
    #[must_use]
    pub fn requires_audit(&self) -> bool {
        matches!(self, Self::PolicyDenied { .. })
    }

    /// Whether this error should terminate the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Bind { .. } | Self::SecretStore(_)
        )
    }
}

/// Opaque reason codes for policy denials.
///
/// The code is the only detail the caller sees; it is deliberately not
/// actionable enough to let a compromised agent learn how to bypass the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDenial {
    /// The session's taint ratio exceeds the profile threshold.
    TaintBudget,
    /// Only admins may interact during bootstrap.
    Bootstrap,
    /// The session's canary token appeared in model output.
    CanaryLeak,
    /// Inbound content matched a blocking injection pattern.
    InboundScan,
    /// A channel adapter declined to respond in this context.
    ChannelRefusal,
    /// A skill proposal matched the hard-reject list.
    SkillRejected,
}

impl std::fmt::Display for PolicyDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::TaintBudget => "AX-P01",
            Self::Bootstrap => "AX-P02",
            Self::CanaryLeak => "AX-P03",
            Self::InboundScan => "AX-P04",
            Self::ChannelRefusal => "AX-P05",
            Self::SkillRejected => "AX-P06",
        };
        write!(f, "{code}")
    }
}

/// Result type for AX operations.
pub type AxResult<T> = Result<T, AxError>;
