//! Memory entry model.

use ax_core::Timestamp;
use ax_taint::TaintTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique memory entry identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryEntryId(pub Uuid);

impl MemoryEntryId {
    /// Mint a fresh entry ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Entry ID.
    pub id: MemoryEntryId,
    /// Scope the entry lives in (a safe path segment).
    pub scope: String,
    /// The remembered content.
    pub content: String,
    /// Free-form tags for querying.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Host-authored taint tag. Absent means user-trust by policy; entries
    /// that predate taint tracking are therefore clean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taint: Option<TaintTag>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl MemoryEntry {
    /// Create a clean entry.
    #[must_use]
    pub fn new(scope: impl Into<String>, content: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: MemoryEntryId::new(),
            scope: scope.into(),
            content: content.into(),
            tags,
            taint: None,
            created_at: Timestamp::now(),
        }
    }

    /// Attach a host-authored taint tag.
    #[must_use]
    pub fn with_taint(mut self, tag: TaintTag) -> Self {
        self.taint = Some(tag);
        self
    }

    /// Whether this entry carries external-trust content.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.taint.as_ref().is_some_and(TaintTag::is_external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_entry_is_clean() {
        let entry = MemoryEntry::new("notes", "the sky is blue", vec![]);
        assert!(!entry.is_external());
    }

    #[test]
    fn test_tagged_entry_is_external() {
        let entry = MemoryEntry::new("notes", "from the web", vec![])
            .with_taint(TaintTag::external("web_fetch"));
        assert!(entry.is_external());
    }

    #[test]
    fn test_pre_feature_entry_deserializes_clean() {
        // Entries written before taint tracking have no `taint` key at all.
        let json = r#"{
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "scope": "notes",
            "content": "old",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let entry: MemoryEntry = serde_json::from_str(json).unwrap();
        assert!(entry.taint.is_none());
        assert!(!entry.is_external());
    }
}
