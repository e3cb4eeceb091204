//! Taint tags and trust levels.

use ax_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Where a piece of content ultimately came from.
///
/// Trust is a total function over content: the absence of a tag means
/// [`TrustLevel::User`] by policy, never `External`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Directly authored by the user.
    User,
    /// Fetched from outside the user's direct instructions.
    External,
    /// Produced by the host itself.
    System,
}

/// A label attached to externally-sourced content.
///
/// Attached at the moment external content first enters the system and
/// copied on every persistence hop. The sandboxed agent can never forge one:
/// tags are host-authored only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintTag {
    /// Action that produced the taint (e.g. `web_fetch`).
    pub source: String,
    /// Trust classification.
    pub trust: TrustLevel,
    /// When the taint entered the system.
    pub timestamp: Timestamp,
}

impl TaintTag {
    /// Build an `external` tag for the given producing action.
    #[must_use]
    pub fn external(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            trust: TrustLevel::External,
            timestamp: Timestamp::now(),
        }
    }

    /// Whether this tag marks external content.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.trust == TrustLevel::External
    }
}

/// Actions whose successful results taint the session.
const TAINT_PRODUCING: &[&str] = &[
    "web_fetch",
    "web_search",
    "browser_navigate",
    "browser_snapshot",
];

/// Whether a successful call to `action` taints the calling session.
#[must_use]
pub fn is_taint_producing(action: &str) -> bool {
    TAINT_PRODUCING.contains(&action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taint_producing_set() {
        assert!(is_taint_producing("web_fetch"));
        assert!(is_taint_producing("web_search"));
        assert!(is_taint_producing("browser_navigate"));
        assert!(is_taint_producing("browser_snapshot"));
        assert!(!is_taint_producing("memory_read"));
        assert!(!is_taint_producing("browser_click"));
        assert!(!is_taint_producing("llm_call"));
    }

    #[test]
    fn test_external_tag() {
        let tag = TaintTag::external("web_fetch");
        assert!(tag.is_external());
        assert_eq!(tag.source, "web_fetch");
    }
}
