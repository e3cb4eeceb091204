//! Memory store trait and implementations.

use async_trait::async_trait;
use ax_core::is_safe_id;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::entry::{MemoryEntry, MemoryEntryId};
use crate::error::{MemoryError, MemoryResult};

/// Shared handle to a memory store.
pub type MemoryStoreHandle = Arc<dyn MemoryStore>;

/// Query over a scope.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Substring match against content (case-insensitive).
    pub contains: Option<String>,
    /// Entries must carry all of these tags.
    pub tags: Vec<String>,
    /// Cap on results. Defaults to 50.
    pub limit: Option<usize>,
}

impl MemoryQuery {
    fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(ref needle) = self.contains
            && !entry
                .content
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        self.tags.iter().all(|t| entry.tags.contains(t))
    }

    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(50).min(500)
    }
}

/// A scoped memory store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist an entry.
    async fn write(&self, entry: MemoryEntry) -> MemoryResult<MemoryEntryId>;

    /// Fetch one entry by ID.
    async fn read(&self, scope: &str, id: &MemoryEntryId) -> MemoryResult<MemoryEntry>;

    /// Query a scope, oldest first.
    async fn query(&self, scope: &str, query: &MemoryQuery) -> MemoryResult<Vec<MemoryEntry>>;

    /// Delete an entry.
    async fn delete(&self, scope: &str, id: &MemoryEntryId) -> MemoryResult<()>;

    /// List the scopes that currently hold entries.
    async fn list_scopes(&self) -> MemoryResult<Vec<String>>;
}

fn check_scope(scope: &str) -> MemoryResult<()> {
    if is_safe_id(scope) {
        Ok(())
    } else {
        Err(MemoryError::InvalidScope(scope.to_string()))
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    scopes: RwLock<HashMap<String, Vec<MemoryEntry>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn write(&self, entry: MemoryEntry) -> MemoryResult<MemoryEntryId> {
        check_scope(&entry.scope)?;
        let id = entry.id.clone();
        let mut scopes = self.scopes.write().await;
        scopes.entry(entry.scope.clone()).or_default().push(entry);
        Ok(id)
    }

    async fn read(&self, scope: &str, id: &MemoryEntryId) -> MemoryResult<MemoryEntry> {
        check_scope(scope)?;
        let scopes = self.scopes.read().await;
        scopes
            .get(scope)
            .and_then(|entries| entries.iter().find(|e| e.id == *id))
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    async fn query(&self, scope: &str, query: &MemoryQuery) -> MemoryResult<Vec<MemoryEntry>> {
        check_scope(scope)?;
        let scopes = self.scopes.read().await;
        let mut matched: Vec<MemoryEntry> = scopes
            .get(scope)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| query.matches(e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matched.truncate(query.effective_limit());
        Ok(matched)
    }

    async fn delete(&self, scope: &str, id: &MemoryEntryId) -> MemoryResult<()> {
        check_scope(scope)?;
        let mut scopes = self.scopes.write().await;
        let entries = scopes
            .get_mut(scope)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        let before = entries.len();
        entries.retain(|e| e.id != *id);
        if entries.len() == before {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_scopes(&self) -> MemoryResult<Vec<String>> {
        let scopes = self.scopes.read().await;
        let mut names: Vec<String> = scopes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// File-backed store: one JSON file per scope under the memory root.
///
/// Scope files are small and rewritten whole on mutation; reads go through
/// the filesystem every time so external edits are picked up.
#[derive(Debug)]
pub struct FileMemoryStore {
    root: PathBuf,
}

impl FileMemoryStore {
    /// Create a store rooted at `root` (created on first write).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scope_path(&self, scope: &str) -> PathBuf {
        self.root.join(format!("{scope}.json"))
    }

    async fn load_scope(&self, scope: &str) -> MemoryResult<Vec<MemoryEntry>> {
        let path = self.scope_path(scope);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(MemoryError::Io(e)),
        }
    }

    async fn save_scope(&self, scope: &str, entries: &[MemoryEntry]) -> MemoryResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let json = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(self.scope_path(scope), json).await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn write(&self, entry: MemoryEntry) -> MemoryResult<MemoryEntryId> {
        check_scope(&entry.scope)?;
        let mut entries = self.load_scope(&entry.scope).await?;
        let id = entry.id.clone();
        let scope = entry.scope.clone();
        entries.push(entry);
        self.save_scope(&scope, &entries).await?;
        debug!(%scope, %id, "Memory entry written");
        Ok(id)
    }

    async fn read(&self, scope: &str, id: &MemoryEntryId) -> MemoryResult<MemoryEntry> {
        check_scope(scope)?;
        let entries = self.load_scope(scope).await?;
        entries
            .into_iter()
            .find(|e| e.id == *id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    async fn query(&self, scope: &str, query: &MemoryQuery) -> MemoryResult<Vec<MemoryEntry>> {
        check_scope(scope)?;
        let entries = self.load_scope(scope).await?;
        let mut matched: Vec<MemoryEntry> =
            entries.into_iter().filter(|e| query.matches(e)).collect();
        matched.truncate(query.effective_limit());
        Ok(matched)
    }

    async fn delete(&self, scope: &str, id: &MemoryEntryId) -> MemoryResult<()> {
        check_scope(scope)?;
        let mut entries = self.load_scope(scope).await?;
        let before = entries.len();
        entries.retain(|e| e.id != *id);
        if entries.len() == before {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        self.save_scope(scope, &entries).await
    }

    async fn list_scopes(&self) -> MemoryResult<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(MemoryError::Io(e)),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(scope) = name.strip_suffix(".json") {
                names.push(scope.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
