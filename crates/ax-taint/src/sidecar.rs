//! Workspace taint sidecar.
//!
//! Persistent workspaces carry a `.ax-taint.json` file listing files written
//! by tainted sessions. A JSON sidecar survives container image exports and
//! stays inspectable, which extended attributes do not.

use ax_core::{SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use walkdir::WalkDir;

use crate::budget::{TaintBudget, estimate_tokens};
use crate::error::{TaintError, TaintResult};
use crate::tag::TaintTag;

/// Sidecar file name inside a persistent workspace.
pub const SIDECAR_FILE: &str = ".ax-taint.json";

/// One tainted file in a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceTaintEntry {
    /// Path relative to the workspace root.
    pub path: String,
    /// The taint carried by the writing session.
    pub taint: TaintTag,
    /// Session that wrote the file.
    pub session_id: SessionId,
    /// When the entry was recorded.
    pub written_at: Timestamp,
}

/// In-memory view of a workspace's sidecar.
#[derive(Debug, Default)]
pub struct WorkspaceTaintSidecar {
    entries: Vec<WorkspaceTaintEntry>,
}

impl WorkspaceTaintSidecar {
    /// Load the sidecar for a workspace.
    ///
    /// A missing sidecar is an empty one. A corrupted sidecar is treated as
    /// empty with a warning: the safe default is "clean workspace" because
    /// pre-feature workspaces have no sidecar either.
    #[must_use]
    pub fn load(workspace: &Path) -> Self {
        let path = workspace.join(SIDECAR_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<WorkspaceTaintEntry>>(&contents) {
                Ok(entries) => Self { entries },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupted taint sidecar, treating workspace as clean");
                    Self::default()
                },
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the sidecar into the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`TaintError::SidecarIo`] on write failure.
    pub fn save(&self, workspace: &Path) -> TaintResult<()> {
        let path = workspace.join(SIDECAR_FILE);
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| TaintError::SidecarCorrupted(e.to_string()))?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// The recorded entries.
    #[must_use]
    pub fn entries(&self) -> &[WorkspaceTaintEntry] {
        &self.entries
    }

    /// Whether a relative path is marked tainted.
    #[must_use]
    pub fn is_tainted(&self, rel_path: &str) -> bool {
        self.entries.iter().any(|e| e.path == rel_path)
    }

    /// Pre-seed a session's budget with the estimated tokens of every
    /// tainted file still present in the workspace.
    ///
    /// Called before the agent runs so that a fresh session inheriting a
    /// tainted workspace starts with the taint already on its books.
    pub fn preseed_budget(&self, workspace: &Path, budget: &TaintBudget, session_id: &SessionId) {
        for entry in &self.entries {
            let Ok(full) = ax_core::safe_join(workspace, &entry.path) else {
                warn!(path = %entry.path, "Sidecar entry escapes workspace, skipping");
                continue;
            };
            if let Ok(contents) = std::fs::read_to_string(&full) {
                budget.record_tokens(session_id, estimate_tokens(&contents), true);
            }
        }
    }

    /// Record files modified since `agent_start` as tainted by `session_id`.
    ///
    /// Called after a tainted session's agent exits. Existing entries for the
    /// same path are replaced (latest writer wins).
    pub fn mark_modified_since(
        &mut self,
        workspace: &Path,
        agent_start: SystemTime,
        session_id: &SessionId,
        tag: &TaintTag,
    ) {
        let modified = scan_modified_since(workspace, agent_start);
        for rel_path in modified {
            self.entries.retain(|e| e.path != rel_path);
            self.entries.push(WorkspaceTaintEntry {
                path: rel_path,
                taint: tag.clone(),
                session_id: session_id.clone(),
                written_at: Timestamp::now(),
            });
        }
    }
}

/// Relative paths of regular files under `workspace` modified at or after
/// `cutoff`. The sidecar itself is excluded.
fn scan_modified_since(workspace: &Path, cutoff: SystemTime) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for entry in WalkDir::new(workspace)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if entry.file_name() == SIDECAR_FILE {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        if mtime < cutoff {
            continue;
        }
        let rel: PathBuf = match entry.path().strip_prefix(workspace) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let rel_str = rel.to_string_lossy().to_string();
        if seen.insert(rel_str.clone()) {
            result.push(rel_str);
        }
    }

    result.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_sidecar_is_clean() {
        let dir = TempDir::new().unwrap();
        let sidecar = WorkspaceTaintSidecar::load(dir.path());
        assert!(sidecar.entries().is_empty());
    }

    #[test]
    fn test_corrupted_sidecar_is_clean() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SIDECAR_FILE), "not json{{").unwrap();
        let sidecar = WorkspaceTaintSidecar::load(dir.path());
        assert!(sidecar.entries().is_empty());
    }

    #[test]
    fn test_mark_and_reload() {
        let dir = TempDir::new().unwrap();
        let session = SessionId::new();
        let cutoff = SystemTime::now() - Duration::from_secs(1);

        std::fs::write(dir.path().join("notes.md"), "fetched content").unwrap();

        let mut sidecar = WorkspaceTaintSidecar::load(dir.path());
        sidecar.mark_modified_since(dir.path(), cutoff, &session, &TaintTag::external("web_fetch"));
        sidecar.save(dir.path()).unwrap();

        let reloaded = WorkspaceTaintSidecar::load(dir.path());
        assert!(reloaded.is_tainted("notes.md"));
        assert_eq!(reloaded.entries().len(), 1);
        assert_eq!(reloaded.entries()[0].taint.source, "web_fetch");
    }

    #[test]
    fn test_preseed_budget_counts_tainted_files() {
        let dir = TempDir::new().unwrap();
        let writer = SessionId::new();
        let cutoff = SystemTime::now() - Duration::from_secs(1);
        std::fs::write(dir.path().join("big.txt"), "x".repeat(400)).unwrap();

        let mut sidecar = WorkspaceTaintSidecar::load(dir.path());
        sidecar.mark_modified_since(dir.path(), cutoff, &writer, &TaintTag::external("web_fetch"));

        let budget = TaintBudget::new();
        let reader = SessionId::new();
        sidecar.preseed_budget(dir.path(), &budget, &reader);

        let snapshot = budget.snapshot(&reader);
        assert_eq!(snapshot.total_tokens, 100);
        assert_eq!(snapshot.tainted_tokens, 100);
    }

    #[test]
    fn test_sidecar_itself_not_scanned() {
        let dir = TempDir::new().unwrap();
        let session = SessionId::new();
        let cutoff = SystemTime::now() - Duration::from_secs(1);

        let mut sidecar = WorkspaceTaintSidecar::load(dir.path());
        sidecar.save(dir.path()).unwrap();
        sidecar.mark_modified_since(dir.path(), cutoff, &session, &TaintTag::external("web_search"));
        assert!(sidecar.entries().is_empty());
    }
}
