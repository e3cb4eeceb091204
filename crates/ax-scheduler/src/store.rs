//! Job stores.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::CronJob;

/// Persistent storage for scheduled jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a job.
    async fn add(&self, job: CronJob) -> SchedulerResult<String>;

    /// Remove a job by ID.
    async fn remove(&self, id: &str) -> SchedulerResult<()>;

    /// All jobs, creation order.
    async fn list(&self) -> SchedulerResult<Vec<CronJob>>;
}

/// In-memory store for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<Vec<CronJob>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn add(&self, job: CronJob) -> SchedulerResult<String> {
        let id = job.id.clone();
        self.jobs.write().await.push(job);
        Ok(id)
    }

    async fn remove(&self, id: &str) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(SchedulerError::JobNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<CronJob>> {
        Ok(self.jobs.read().await.clone())
    }
}

/// File-backed store: one JSON document holding all jobs, rewritten whole
/// on mutation.
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileJobStore {
    /// Create a store backed by `path` (e.g. `data/scheduler/jobs.json`).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    async fn load(&self) -> SchedulerResult<Vec<CronJob>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SchedulerError::Io(e)),
        }
    }

    async fn save(&self, jobs: &[CronJob]) -> SchedulerResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(jobs)?).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn add(&self, job: CronJob) -> SchedulerResult<String> {
        let _guard = self.lock.write().await;
        let mut jobs = self.load().await?;
        let id = job.id.clone();
        jobs.push(job);
        self.save(&jobs).await?;
        Ok(id)
    }

    async fn remove(&self, id: &str) -> SchedulerResult<()> {
        let _guard = self.lock.write().await;
        let mut jobs = self.load().await?;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(SchedulerError::JobNotFound(id.to_string()));
        }
        self.save(&jobs).await
    }

    async fn list(&self) -> SchedulerResult<Vec<CronJob>> {
        let _guard = self.lock.read().await;
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_core::AgentId;
    use tempfile::TempDir;

    fn job(prompt: &str) -> CronJob {
        CronJob::cron("0 9 * * *", AgentId::parse("friday").unwrap(), prompt).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryJobStore::new();
        let id = store.add(job("daily")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        store.remove(&id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.remove(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduler/jobs.json");

        let store = FileJobStore::new(&path);
        let id = store.add(job("daily")).await.unwrap();

        let store2 = FileJobStore::new(&path);
        let jobs = store2.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].prompt, "daily");
    }
}
