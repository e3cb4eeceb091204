//! The minute ticker.
//!
//! Wakes at each minute boundary, collects due jobs, and hands them to the
//! host over a channel. Duplicate firings inside one minute are suppressed
//! with a minute-key dedup set (`job_id@YYYY-MM-DDTHH:MM`); ticks outside
//! the configured active hours fire nothing.

use chrono::{DateTime, Local, Timelike};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::job::CronJob;
use crate::store::JobStore;

/// A job the ticker decided to fire.
#[derive(Debug, Clone)]
pub struct FiredJob {
    /// The job as stored.
    pub job: CronJob,
    /// The minute key it fired under.
    pub minute_key: String,
}

/// Whether a local time falls inside a half-open `[start, end)` hour
/// window. `(0, 24)` is always active; `start > end` wraps overnight
/// (e.g. 22..6). Shared by the ticker and the heartbeat loop so both honor
/// the same window.
#[must_use]
pub fn in_active_hours(active_hours: (u8, u8), now: DateTime<Local>) -> bool {
    let hour = u8::try_from(now.hour()).unwrap_or(0);
    let (start, end) = active_hours;
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Fires due jobs once per minute.
pub struct CronTicker {
    store: Arc<dyn JobStore>,
    active_hours: (u8, u8),
    fired: Mutex<HashSet<String>>,
}

impl CronTicker {
    /// Create a ticker over a job store. `active_hours` is a half-open
    /// local-time window `[start, end)`; `(0, 24)` means always active.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, active_hours: (u8, u8)) -> Self {
        Self {
            store,
            active_hours,
            fired: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a local time is inside the active window.
    #[must_use]
    pub fn in_active_hours(&self, now: DateTime<Local>) -> bool {
        in_active_hours(self.active_hours, now)
    }

    /// Evaluate one tick: returns jobs due at `now`, after minute-key
    /// dedup and the active-hours gate. One-shot jobs are removed from the
    /// store as they fire.
    pub async fn check_due(&self, now: DateTime<Local>) -> Vec<FiredJob> {
        if !self.in_active_hours(now) {
            return Vec::new();
        }

        let minute = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let minute_stamp = minute.format("%Y-%m-%dT%H:%M").to_string();

        let jobs = match self.store.list().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Job store unavailable, skipping tick");
                return Vec::new();
            },
        };

        let mut due = Vec::new();
        for job in jobs {
            if !job.is_due(minute) {
                continue;
            }
            let minute_key = format!("{}@{minute_stamp}", job.id);
            {
                let Ok(mut fired) = self.fired.lock() else {
                    continue;
                };
                if !fired.insert(minute_key.clone()) {
                    debug!(job = %job.id, "Duplicate firing suppressed");
                    continue;
                }
                // The set only needs the current minute; prune old keys.
                fired.retain(|k| k.ends_with(&minute_stamp));
            }

            if job.is_one_shot()
                && let Err(e) = self.store.remove(&job.id).await
            {
                warn!(job = %job.id, error = %e, "Failed to remove fired one-shot");
            }
            due.push(FiredJob { job, minute_key });
        }
        due
    }

    /// Run the ticker until aborted, sending fired jobs to `tx`.
    #[must_use]
    pub fn spawn(self: Arc<Self>, tx: mpsc::Sender<FiredJob>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Scheduler ticker running");
            loop {
                let now = Local::now();
                for fired in self.check_due(now).await {
                    if tx.send(fired).await.is_err() {
                        return;
                    }
                }

                // Sleep to just past the next minute boundary.
                let seconds_into_minute = u64::from(now.second());
                let wait = 60u64.saturating_sub(seconds_into_minute).max(1);
                tokio::time::sleep(std::time::Duration::from_secs(wait)).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CronJob, JobSchedule};
    use crate::store::MemoryJobStore;
    use ax_core::{AgentId, Timestamp};
    use chrono::TimeZone;

    fn agent() -> AgentId {
        AgentId::parse("friday").unwrap()
    }

    fn monday_nine() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_fires_matching_jobs_once_per_minute() {
        let store = Arc::new(MemoryJobStore::new());
        store
            .add(CronJob::cron("0 9 * * 1", agent(), "Weekly summary").unwrap())
            .await
            .unwrap();
        let ticker = CronTicker::new(store, (0, 24));

        let first = ticker.check_due(monday_nine()).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].job.prompt, "Weekly summary");

        // Same minute again (e.g. a second tick at :00:30): suppressed.
        let again = ticker
            .check_due(monday_nine() + chrono::Duration::seconds(30))
            .await;
        assert!(again.is_empty());

        // A week later it fires again.
        let next_week = ticker
            .check_due(monday_nine() + chrono::Duration::weeks(1))
            .await;
        assert_eq!(next_week.len(), 1);
    }

    #[tokio::test]
    async fn test_active_hours_gate() {
        let store = Arc::new(MemoryJobStore::new());
        store
            .add(CronJob::cron("0 9 * * 1", agent(), "p").unwrap())
            .await
            .unwrap();
        let ticker = CronTicker::new(store, (10, 18));
        assert!(ticker.check_due(monday_nine()).await.is_empty());
    }

    #[tokio::test]
    async fn test_overnight_active_window() {
        let store = Arc::new(MemoryJobStore::new());
        let ticker = CronTicker::new(store, (22, 6));
        assert!(ticker.in_active_hours(Local.with_ymd_and_hms(2026, 8, 3, 23, 0, 0).unwrap()));
        assert!(ticker.in_active_hours(Local.with_ymd_and_hms(2026, 8, 3, 2, 0, 0).unwrap()));
        assert!(!ticker.in_active_hours(Local.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_one_shot_removed_after_firing() {
        let store = Arc::new(MemoryJobStore::new());
        let when = monday_nine();
        store
            .add(CronJob::at(
                Timestamp(when.with_timezone(&chrono::Utc)),
                agent(),
                "remind once",
            ))
            .await
            .unwrap();
        let ticker = CronTicker::new(Arc::clone(&store) as Arc<dyn JobStore>, (0, 24));

        let fired = ticker.check_due(when).await;
        assert_eq!(fired.len(), 1);
        assert!(matches!(fired[0].job.schedule, JobSchedule::At(_)));
        assert!(store.list().await.unwrap().is_empty());

        // Next minute: nothing left.
        assert!(
            ticker
                .check_due(when + chrono::Duration::minutes(1))
                .await
                .is_empty()
        );
    }
}
