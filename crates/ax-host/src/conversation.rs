//! Conversation persistence.
//!
//! Persistent sessions append turns after outbound scanning; history loads
//! are bounded by `history.max_turns`. Thread contexts can backfill a
//! bounded number of prior platform messages the first time the agent
//! participates.

use ax_core::{SessionId, Timestamp};
use ax_taint::TaintTag;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::error::{HostError, HostResult};

/// One persisted turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTurn {
    /// `user` or `assistant`.
    pub role: String,
    /// Turn text.
    pub content: String,
    /// Taint inherited from the producing session, if any. Facts later
    /// extracted from this turn inherit it too.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taint: Option<TaintTag>,
    /// When the turn was stored.
    pub at: Timestamp,
}

/// File-backed conversation store: one JSONL file per session.
#[derive(Debug)]
pub struct ConversationStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    /// Create a store under `root` (e.g. `data/conversations/`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn session_path(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }

    /// Append one turn.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub async fn append(
        &self,
        session_id: &SessionId,
        role: &str,
        content: &str,
        taint: Option<TaintTag>,
    ) -> HostResult<()> {
        let turn = StoredTurn {
            role: role.to_string(),
            content: content.to_string(),
            taint,
            at: Timestamp::now(),
        };
        let line = serde_json::to_string(&turn)?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.session_path(session_id);
        let mut existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        existing.push_str(&line);
        existing.push('\n');
        tokio::fs::write(&path, existing).await?;
        Ok(())
    }

    /// Load the last `max_turns` turns, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if stored turns cannot be parsed.
    pub async fn load_history(
        &self,
        session_id: &SessionId,
        max_turns: usize,
    ) -> HostResult<Vec<StoredTurn>> {
        let path = self.session_path(session_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HostError::Io(e)),
        };

        let mut turns = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let turn: StoredTurn = serde_json::from_str(line)
                .map_err(|e| HostError::Store(format!("bad stored turn: {e}")))?;
            turns.push(turn);
        }
        if turns.len() > max_turns {
            turns.drain(..turns.len().saturating_sub(max_turns));
        }
        Ok(turns)
    }

    /// Whether a session has any stored turns (used to decide thread
    /// backfill on first participation).
    #[must_use]
    pub async fn has_history(&self, session_id: &SessionId) -> bool {
        tokio::fs::try_exists(self.session_path(session_id))
            .await
            .unwrap_or(false)
    }
}
