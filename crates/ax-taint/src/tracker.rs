//! Per-session records of which actions produced taint.

use ax_core::{SessionId, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::tag::{TaintTag, TrustLevel};

/// One taint-producing event in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintSource {
    /// The action that produced taint (e.g. `web_fetch`).
    pub action: String,
    /// When it happened.
    pub timestamp: Timestamp,
    /// Optional detail (a URL host, a memory entry ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Tracks taint sources per session, in arrival order.
///
/// Runs parallel to the budget: the budget answers "how much", the tracker
/// answers "from where", which is what gets stamped onto outgoing
/// persistence writes.
#[derive(Debug, Default)]
pub struct SessionTaintTracker {
    sessions: DashMap<SessionId, Vec<TaintSource>>,
}

impl SessionTaintTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a taint source for a session.
    ///
    /// The IPC server calls this only after a taint-producing action
    /// succeeds.
    pub fn record_taint_source(
        &self,
        session_id: &SessionId,
        action: impl Into<String>,
        detail: Option<String>,
    ) {
        let source = TaintSource {
            action: action.into(),
            timestamp: Timestamp::now(),
            detail,
        };
        self.sessions
            .entry(session_id.clone())
            .or_default()
            .push(source);
    }

    /// Whether the session has recorded any taint source.
    #[must_use]
    pub fn is_tainted(&self, session_id: &SessionId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|s| !s.is_empty())
    }

    /// Build a tag from the most recent source, if any.
    #[must_use]
    pub fn get_taint_tag(&self, session_id: &SessionId) -> Option<TaintTag> {
        self.sessions.get(session_id).and_then(|sources| {
            sources.last().map(|source| TaintTag {
                source: source.action.clone(),
                trust: TrustLevel::External,
                timestamp: source.timestamp,
            })
        })
    }

    /// All sources recorded for a session, in order.
    #[must_use]
    pub fn sources(&self, session_id: &SessionId) -> Vec<TaintSource> {
        self.sessions
            .get(session_id)
            .map_or_else(Vec::new, |s| s.clone())
    }

    /// Drop a session's records.
    pub fn end_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::is_taint_producing;

    #[test]
    fn test_tracker_orders_sources() {
        let tracker = SessionTaintTracker::new();
        let session = SessionId::new();

        assert!(!tracker.is_tainted(&session));
        assert!(tracker.get_taint_tag(&session).is_none());

        tracker.record_taint_source(&session, "web_fetch", Some("example.com".into()));
        tracker.record_taint_source(&session, "web_search", None);

        assert!(tracker.is_tainted(&session));
        let tag = tracker.get_taint_tag(&session).unwrap();
        assert_eq!(tag.source, "web_search");
        assert_eq!(tag.trust, TrustLevel::External);

        let sources = tracker.sources(&session);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].action, "web_fetch");
    }

    #[test]
    fn test_end_session() {
        let tracker = SessionTaintTracker::new();
        let session = SessionId::new();
        tracker.record_taint_source(&session, "browser_snapshot", None);
        tracker.end_session(&session);
        assert!(!tracker.is_tainted(&session));
    }

    #[test]
    fn test_only_enumerated_actions_taint() {
        // The tracker records whatever it is told; the static predicate is
        // what the IPC server consults first.
        assert!(is_taint_producing("browser_navigate"));
        assert!(!is_taint_producing("scheduler_add_cron"));
    }
}
