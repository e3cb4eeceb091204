//! Inbound and outbound scanning.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Verdict for an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanVerdict {
    /// Nothing suspicious.
    Pass,
    /// Suspicious but allowed; logged for review.
    Flag,
    /// Rejected without invoking the model.
    Block,
}

/// Regex-based inbound injection scanner.
///
/// Patterns are conservative: blocking a benign message costs one retry,
/// missing a hostile one costs the session.
pub struct InboundScanner {
    block: RegexSet,
    flag: RegexSet,
}

impl Default for InboundScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundScanner {
    /// Create the scanner with the built-in pattern sets.
    #[must_use]
    pub fn new() -> Self {
        let block = RegexSet::new([
            r"(?i)ignore (?:all |your )?(?:previous|prior|above) instructions",
            r"(?i)disregard (?:all |your )?(?:previous|prior) (?:instructions|rules)",
            r"(?i)you are now (?:DAN|jailbroken|unrestricted)",
            r"(?i)reveal (?:your )?(?:system prompt|instructions|hidden rules)",
            r"(?i)print (?:your )?(?:system prompt|initial instructions)",
            r"(?i)exfiltrate",
            r"(?i)\bbegin admin override\b",
        ])
        .unwrap_or_else(|_| RegexSet::empty());

        let flag = RegexSet::new([
            r"(?i)pretend (?:to be|you are)",
            r"(?i)role.?play as",
            r"(?i)as an experiment, bypass",
            r"(?i)base64 decode and (?:run|execute)",
            r"(?i)do not tell the user",
        ])
        .unwrap_or_else(|_| RegexSet::empty());

        Self { block, flag }
    }

    /// Scan a user message plus any attached external content.
    #[must_use]
    pub fn scan(&self, message: &str, attachments: &[&str]) -> ScanVerdict {
        let mut verdict = ScanVerdict::Pass;
        for text in std::iter::once(message).chain(attachments.iter().copied()) {
            if self.block.is_match(text) {
                return ScanVerdict::Block;
            }
            if self.flag.is_match(text) {
                verdict = ScanVerdict::Flag;
            }
        }
        verdict
    }
}

/// Result of scanning assistant output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundResult {
    /// Output is safe to deliver.
    Clean(String),
    /// The canary leaked; the whole response is replaced.
    CanaryLeak,
    /// Sensitive patterns were redacted in place.
    Redacted(String),
}

/// Placeholder delivered instead of a leaked response.
pub const CANARY_REDACTION: &str =
    "[response withheld: the reply failed a security check and was not delivered]";

/// Outbound scanner: canary leak detection plus sensitive-pattern redaction.
pub struct OutboundScanner {
    sensitive: regex::Regex,
}

impl Default for OutboundScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundScanner {
    /// Create the scanner with built-in sensitive patterns (key material
    /// shapes that must never leave the host).
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::unwrap_used)]
        let sensitive = regex::Regex::new(
            r"(?:sk-ant-[A-Za-z0-9_-]{8,}|sk-[A-Za-z0-9]{32,}|AKIA[0-9A-Z]{16}|ghp_[A-Za-z0-9]{36})",
        )
        .unwrap();
        Self { sensitive }
    }

    /// Scan a completed assistant turn against the session's canary.
    #[must_use]
    pub fn scan(&self, output: &str, canary: &str) -> OutboundResult {
        if !canary.is_empty() && output.contains(canary) {
            warn!("Canary token found in model output");
            return OutboundResult::CanaryLeak;
        }
        if self.sensitive.is_match(output) {
            let redacted = self.sensitive.replace_all(output, "[redacted]").to_string();
            return OutboundResult::Redacted(redacted);
        }
        OutboundResult::Clean(output.to_string())
    }
}
