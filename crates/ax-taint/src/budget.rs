//! Per-session taint budgets.
//!
//! A budget is a pair of token counters: everything recorded into the
//! session's context, and the tainted subset. The ratio between them gates
//! sensitive actions. The ratio is always derived, never stored.

use ax_core::SessionId;
use dashmap::DashMap;
use tracing::debug;

/// Approximate token count for a piece of text.
///
/// `ceil(bytes / 4)`, deliberately the same estimator everywhere (budget
/// recording, workspace pre-seeding, prompt sizing) so the numbers compose.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_tokens: usize,
    tainted_tokens: usize,
}

/// A point-in-time view of one session's budget.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BudgetSnapshot {
    /// All tokens recorded for the session.
    pub total_tokens: usize,
    /// Tainted tokens recorded for the session.
    pub tainted_tokens: usize,
    /// `tainted / total`, 0.0 when nothing is recorded.
    pub ratio: f64,
}

/// Process-wide taint budget, keyed by session.
///
/// Created in `main` and threaded into constructors as an explicit handle.
#[derive(Debug, Default)]
pub struct TaintBudget {
    sessions: DashMap<SessionId, Counters>,
}

impl TaintBudget {
    /// Create an empty budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record content into a session's budget.
    ///
    /// Counters only grow; idempotency is the caller's concern.
    pub fn record_content(&self, session_id: &SessionId, text: &str, tainted: bool) {
        let tokens = estimate_tokens(text);
        self.record_tokens(session_id, tokens, tainted);
    }

    /// Record a pre-estimated token count (workspace pre-seeding).
    pub fn record_tokens(&self, session_id: &SessionId, tokens: usize, tainted: bool) {
        let mut entry = self.sessions.entry(session_id.clone()).or_default();
        entry.total_tokens = entry.total_tokens.saturating_add(tokens);
        if tainted {
            entry.tainted_tokens = entry.tainted_tokens.saturating_add(tokens);
        }
        debug!(
            session = %session_id,
            tokens,
            tainted,
            total = entry.total_tokens,
            "Recorded content into taint budget"
        );
    }

    /// The session's tainted ratio in `[0, 1]`.
    #[must_use]
    pub fn ratio(&self, session_id: &SessionId) -> f64 {
        self.sessions.get(session_id).map_or(0.0, |c| {
            if c.total_tokens == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                {
                    c.tainted_tokens as f64 / c.total_tokens as f64
                }
            }
        })
    }

    /// Whether sensitive actions are blocked at the given threshold.
    #[must_use]
    pub fn blocks_sensitive(&self, session_id: &SessionId, threshold: f64) -> bool {
        self.ratio(session_id) > threshold
    }

    /// A snapshot of the session's counters and derived ratio.
    #[must_use]
    pub fn snapshot(&self, session_id: &SessionId) -> BudgetSnapshot {
        let counters = self
            .sessions
            .get(session_id)
            .map_or_else(Counters::default, |c| *c);
        BudgetSnapshot {
            total_tokens: counters.total_tokens,
            tainted_tokens: counters.tainted_tokens,
            ratio: self.ratio(session_id),
        }
    }

    /// Drop a session's counters.
    pub fn end_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimator_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_ratio_is_derived() {
        let budget = TaintBudget::new();
        let session = SessionId::new();

        assert_eq!(budget.ratio(&session), 0.0);

        budget.record_content(&session, &"x".repeat(400), false);
        budget.record_content(&session, &"y".repeat(400), true);

        let snapshot = budget.snapshot(&session);
        assert_eq!(snapshot.total_tokens, 200);
        assert_eq!(snapshot.tainted_tokens, 100);
        assert!((snapshot.ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_gate() {
        let budget = TaintBudget::new();
        let session = SessionId::new();

        // 29 tainted / 100 total
        budget.record_tokens(&session, 71, false);
        budget.record_tokens(&session, 29, true);
        assert!(!budget.blocks_sensitive(&session, 0.30));

        // push to 31 / 102
        budget.record_tokens(&session, 2, true);
        assert!(budget.blocks_sensitive(&session, 0.30));
    }

    #[test]
    fn test_end_session_clears() {
        let budget = TaintBudget::new();
        let session = SessionId::new();
        budget.record_tokens(&session, 10, true);
        budget.end_session(&session);
        assert_eq!(budget.snapshot(&session).total_tokens, 0);
    }
}
