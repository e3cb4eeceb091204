//! Audit entry model.

use ax_core::{SessionId, Timestamp};
use ax_taint::TaintTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique audit entry identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    /// Mint a fresh entry ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result status of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The action completed.
    Success,
    /// The action was denied by policy.
    Blocked,
    /// The action failed.
    Error,
}

/// Chain-link hash over the previous entry's canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// The zero hash that starts every per-session chain.
    #[must_use]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Hash arbitrary bytes.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: AuditEntryId,
    /// When this entry was created.
    pub timestamp: Timestamp,
    /// Session this entry belongs to.
    pub session_id: SessionId,
    /// The audited action name (IPC action, router step, proxy event).
    pub action: String,
    /// Bounded summary of the validated arguments. Never raw payloads and
    /// never credentials.
    pub args_summary: String,
    /// Outcome of the action.
    pub status: AuditStatus,
    /// Detailed reason, recorded only here (policy denials surface an opaque
    /// code to the caller).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Wall-clock duration of the action in milliseconds.
    pub duration_ms: u64,
    /// The session's taint tag at the time of the call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taint: Option<TaintTag>,
    /// Hash of the previous entry in this session's chain.
    pub previous_hash: ChainHash,
}

impl AuditEntry {
    /// Canonical bytes used for chain hashing.
    #[must_use]
    pub fn chain_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(self.id.0.as_bytes());
        data.extend_from_slice(self.session_id.0.as_bytes());
        data.extend_from_slice(self.action.as_bytes());
        data.extend_from_slice(self.args_summary.as_bytes());
        data.push(match self.status {
            AuditStatus::Success => 0,
            AuditStatus::Blocked => 1,
            AuditStatus::Error => 2,
        });
        data.extend_from_slice(&self.previous_hash.0);
        data
    }

    /// This entry's chain hash.
    #[must_use]
    pub fn content_hash(&self) -> ChainHash {
        ChainHash::hash(&self.chain_data())
    }

    /// Whether this entry links to `previous`.
    #[must_use]
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        self.previous_hash == previous.content_hash()
    }
}

/// Truncate an args summary to a bounded length on a char boundary.
#[must_use]
pub fn summarize_args(summary: &str) -> String {
    const MAX: usize = 512;
    if summary.len() <= MAX {
        return summary.to_string();
    }
    let mut end = MAX;
    while !summary.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    format!("{}…", &summary[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session: &SessionId, action: &str, previous: ChainHash) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            timestamp: Timestamp::now(),
            session_id: session.clone(),
            action: action.to_string(),
            args_summary: "scope=notes".to_string(),
            status: AuditStatus::Success,
            detail: None,
            duration_ms: 3,
            taint: None,
            previous_hash: previous,
        }
    }

    #[test]
    fn test_chain_linking() {
        let session = SessionId::new();
        let first = entry(&session, "memory_write", ChainHash::zero());
        let second = entry(&session, "memory_read", first.content_hash());

        assert!(second.follows(&first));
        assert!(!first.follows(&second));
    }

    #[test]
    fn test_tampering_breaks_chain() {
        let session = SessionId::new();
        let first = entry(&session, "memory_write", ChainHash::zero());
        let mut second = entry(&session, "memory_read", first.content_hash());
        assert!(second.follows(&first));

        second.previous_hash = ChainHash::zero();
        assert!(!second.follows(&first));
    }

    #[test]
    fn test_summarize_args_bounds() {
        let long = "a".repeat(2000);
        let summary = summarize_args(&long);
        assert!(summary.len() < 520);
        assert!(summary.ends_with('…'));
        assert_eq!(summarize_args("short"), "short");
    }
}
