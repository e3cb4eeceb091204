//! Hallucination guard.
//!
//! Some model back-ends happily claim "I've scheduled that" without ever
//! calling the scheduler. The guard matches assistant text against a
//! conservative set of scheduling claims; when the text claims and the tool
//! log disagrees, the runner injects a corrective instruction.

use regex::RegexSet;
use std::sync::OnceLock;

/// Patterns that read as "a scheduling action happened".
fn claim_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)\bscheduled a\b",
            r"(?i)\bI(?:'ve| have) scheduled\b",
            r"(?i)\bset up a reminder\b",
            r"(?i)\breminder (?:is )?set\b",
            r"(?i)\bwill run (?:every|at)\b",
            r"(?i)\bcron job (?:is )?(?:created|added)\b",
            r"scheduler_add_cron",
            r"scheduler_run_at",
        ])
        .unwrap_or_else(|_| RegexSet::empty())
    })
}

/// Tool names that make a scheduling claim legitimate.
const SCHEDULER_TOOLS: &[&str] = &["scheduler_add_cron", "scheduler_run_at"];

/// Whether `text` claims a scheduling action that `called_tools` does not
/// back up.
#[must_use]
pub fn scheduling_claim_without_call(text: &str, called_tools: &[String]) -> bool {
    if !claim_patterns().is_match(text) {
        return false;
    }
    !called_tools
        .iter()
        .any(|t| SCHEDULER_TOOLS.contains(&t.as_str()))
}

/// The corrective instruction injected when the guard fires.
pub const CORRECTIVE_INSTRUCTION: &str = "Your previous message claimed a scheduling action, \
but no scheduler tool was called. Nothing has been scheduled. Call scheduler_add_cron or \
scheduler_run_at now to actually perform the action, or correct your statement to the user.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_without_call_triggers() {
        assert!(scheduling_claim_without_call(
            "I've scheduled a task for 3pm.",
            &[]
        ));
        assert!(scheduling_claim_without_call(
            "Done! Set up a reminder for Monday.",
            &["memory_write".to_string()]
        ));
    }

    #[test]
    fn test_claim_with_call_passes() {
        assert!(!scheduling_claim_without_call(
            "I've scheduled a task for 3pm.",
            &["scheduler_add_cron".to_string()]
        ));
    }

    #[test]
    fn test_no_claim_never_triggers() {
        assert!(!scheduling_claim_without_call(
            "Here is the summary you asked for.",
            &[]
        ));
        // Talking about scheduling abstractly is fine too.
        assert!(!scheduling_claim_without_call(
            "I can schedule things if you like.",
            &[]
        ));
    }
}
