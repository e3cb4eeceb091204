//! Audit sinks.
//!
//! A sink owns the per-session chain heads and appends entries atomically
//! with respect to its own lock. Two implementations: JSONL on disk for the
//! host, in-memory for tests.

use ax_core::{SessionId, Timestamp};
use ax_taint::TaintTag;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::error;

use crate::entry::{AuditEntry, AuditEntryId, AuditStatus, ChainHash, summarize_args};
use crate::error::{AuditError, AuditResult};

/// Filter for audit queries. All fields are conjunctive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Only entries for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Only entries for this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Only entries with this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AuditStatus>,
    /// Cap on returned entries (most recent last). Defaults to 100.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ref session) = self.session_id
            && entry.session_id != *session
        {
            return false;
        }
        if let Some(ref action) = self.action
            && entry.action != *action
        {
            return false;
        }
        if let Some(status) = self.status
            && entry.status != status
        {
            return false;
        }
        true
    }

    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(100).min(1000)
    }
}

/// Append-only audit sink.
pub trait AuditSink: Send + Sync {
    /// Append an entry describing a completed (or denied) action.
    ///
    /// The sink assigns the entry ID, timestamp, and chain link.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        session_id: SessionId,
        action: &str,
        args_summary: &str,
        status: AuditStatus,
        detail: Option<String>,
        duration_ms: u64,
        taint: Option<TaintTag>,
    ) -> AuditResult<AuditEntryId>;

    /// Query entries matching a filter, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if entries cannot be read back.
    fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>>;

    /// Verify the chain for one session, returning the entry count.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainBroken`] at the first bad link.
    fn verify_chain(&self, session_id: &SessionId) -> AuditResult<usize> {
        let entries = self.query(&AuditFilter {
            session_id: Some(session_id.clone()),
            limit: Some(usize::MAX),
            ..AuditFilter::default()
        })?;
        let mut expected = ChainHash::zero();
        for entry in &entries {
            if entry.previous_hash != expected {
                return Err(AuditError::ChainBroken {
                    entry_id: entry.id.to_string(),
                });
            }
            expected = entry.content_hash();
        }
        Ok(entries.len())
    }

    /// Flush pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails to flush.
    fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

fn build_entry(
    heads: &DashMap<SessionId, ChainHash>,
    session_id: SessionId,
    action: &str,
    args_summary: &str,
    status: AuditStatus,
    detail: Option<String>,
    duration_ms: u64,
    taint: Option<TaintTag>,
) -> AuditEntry {
    let previous_hash = heads
        .get(&session_id)
        .map_or_else(ChainHash::zero, |h| *h);
    let entry = AuditEntry {
        id: AuditEntryId::new(),
        timestamp: Timestamp::now(),
        session_id: session_id.clone(),
        action: action.to_string(),
        args_summary: summarize_args(args_summary),
        status,
        detail,
        duration_ms,
        taint,
        previous_hash,
    };
    heads.insert(session_id, entry.content_hash());
    entry
}

/// In-memory sink for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    heads: DashMap<SessionId, ChainHash>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    /// Whether the sink is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(
        &self,
        session_id: SessionId,
        action: &str,
        args_summary: &str,
        status: AuditStatus,
        detail: Option<String>,
        duration_ms: u64,
        taint: Option<TaintTag>,
    ) -> AuditResult<AuditEntryId> {
        let entry = build_entry(
            &self.heads,
            session_id,
            action,
            args_summary,
            status,
            detail,
            duration_ms,
            taint,
        );
        let id = entry.id.clone();
        self.entries
            .lock()
            .map_err(|_| AuditError::WriteFailed("poisoned lock".to_string()))?
            .push(entry);
        Ok(id)
    }

    fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AuditError::ReadFailed("poisoned lock".to_string()))?;
        let mut matched: Vec<AuditEntry> =
            entries.iter().filter(|e| filter.matches(e)).cloned().collect();
        let limit = filter.effective_limit();
        if matched.len() > limit {
            matched.drain(..matched.len().saturating_sub(limit));
        }
        Ok(matched)
    }
}

/// JSONL sink: one entry per line, append-only, fsync on flush.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
    heads: DashMap<SessionId, ChainHash>,
}

impl JsonlAuditSink {
    /// Open (creating if needed) the JSONL log at `path` and rebuild the
    /// per-session chain heads from existing entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or an existing line
    /// cannot be parsed.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let heads = DashMap::new();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let entry: AuditEntry = serde_json::from_str(line)
                    .map_err(|e| AuditError::ReadFailed(format!("bad entry: {e}")))?;
                heads.insert(entry.session_id.clone(), entry.content_hash());
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            heads,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(
        &self,
        session_id: SessionId,
        action: &str,
        args_summary: &str,
        status: AuditStatus,
        detail: Option<String>,
        duration_ms: u64,
        taint: Option<TaintTag>,
    ) -> AuditResult<AuditEntryId> {
        let entry = build_entry(
            &self.heads,
            session_id,
            action,
            args_summary,
            status,
            detail,
            duration_ms,
            taint,
        );
        let id = entry.id.clone();
        let line = serde_json::to_string(&entry)
            .map_err(|e| AuditError::WriteFailed(e.to_string()))?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::WriteFailed("poisoned lock".to_string()))?;
        if let Err(e) = writeln!(file, "{line}") {
            error!(error = %e, "Audit append failed");
            return Err(AuditError::Io(e));
        }
        Ok(id)
    }

    fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| AuditError::ReadFailed("poisoned lock".to_string()))?;
            file.flush()?;
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let mut matched = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let entry: AuditEntry = serde_json::from_str(line)
                .map_err(|e| AuditError::ReadFailed(format!("bad entry: {e}")))?;
            if filter.matches(&entry) {
                matched.push(entry);
            }
        }
        let limit = filter.effective_limit();
        if matched.len() > limit {
            matched.drain(..matched.len().saturating_sub(limit));
        }
        Ok(matched)
    }

    fn flush(&self) -> AuditResult<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::WriteFailed("poisoned lock".to_string()))?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_chains_per_session() {
        let sink = MemoryAuditSink::new();
        let a = SessionId::new();
        let b = SessionId::new();

        sink.append(a.clone(), "web_fetch", "url=example.com", AuditStatus::Success, None, 12, None)
            .unwrap();
        sink.append(b.clone(), "memory_write", "scope=notes", AuditStatus::Success, None, 1, None)
            .unwrap();
        sink.append(a.clone(), "skill_propose", "name=summarize", AuditStatus::Blocked, Some("taint ratio 0.82 > 0.30".into()), 0, None)
            .unwrap();

        assert_eq!(sink.verify_chain(&a).unwrap(), 2);
        assert_eq!(sink.verify_chain(&b).unwrap(), 1);
    }

    #[test]
    fn test_query_filters() {
        let sink = MemoryAuditSink::new();
        let session = SessionId::new();
        sink.append(session.clone(), "web_fetch", "", AuditStatus::Success, None, 1, None)
            .unwrap();
        sink.append(session.clone(), "web_fetch", "", AuditStatus::Error, Some("timeout".into()), 1, None)
            .unwrap();

        let blocked = sink
            .query(&AuditFilter {
                status: Some(AuditStatus::Error),
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].detail.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_jsonl_sink_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let session = SessionId::new();

        {
            let sink = JsonlAuditSink::open(&path).unwrap();
            sink.append(session.clone(), "web_fetch", "url=a", AuditStatus::Success, None, 5, None)
                .unwrap();
            sink.flush().unwrap();
        }

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(session.clone(), "web_search", "q=b", AuditStatus::Success, None, 6, None)
            .unwrap();
        sink.flush().unwrap();

        // Chain heads were rebuilt on reopen, so the chain still verifies.
        assert_eq!(sink.verify_chain(&session).unwrap(), 2);
    }
}
