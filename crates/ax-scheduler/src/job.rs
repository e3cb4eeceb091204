//! Job and delivery models.

use ax_core::{AgentId, SessionAddress, Timestamp};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{SchedulerError, SchedulerResult};

/// Where a job's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Post to a channel.
    Channel,
    /// Discard (the run may still write memory or audit).
    None,
}

/// The delivery target before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryTarget {
    /// The literal `"last"`: the agent's most recent channel interaction,
    /// looked up at fire time.
    Last(String),
    /// An explicit address.
    Address(SessionAddress),
}

impl DeliveryTarget {
    /// The `"last"` target.
    #[must_use]
    pub fn last() -> Self {
        Self::Last("last".to_string())
    }
}

/// A delivery specification attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Mode.
    pub mode: DeliveryMode,
    /// Target; meaningless when mode is `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DeliveryTarget>,
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSchedule {
    /// Five-field cron expression, matched once per minute, local time.
    Cron(String),
    /// One-shot: first tick at or after this instant, then the job is
    /// deleted.
    At(Timestamp),
}

/// A scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    /// Job ID.
    pub id: String,
    /// Schedule.
    pub schedule: JobSchedule,
    /// Agent to run.
    pub agent_id: AgentId,
    /// Prompt fed to the agent.
    pub prompt: String,
    /// Per-job token ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_token_budget: Option<u64>,
    /// Delivery spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl CronJob {
    /// Create a cron job, validating the expression.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidExpression`] for a bad expression.
    pub fn cron(
        expression: &str,
        agent_id: AgentId,
        prompt: impl Into<String>,
    ) -> SchedulerResult<Self> {
        parse_cron(expression)?;
        Ok(Self {
            id: Uuid::new_v4().simple().to_string(),
            schedule: JobSchedule::Cron(expression.to_string()),
            agent_id,
            prompt: prompt.into(),
            max_token_budget: None,
            delivery: None,
            created_at: Timestamp::now(),
        })
    }

    /// Create a one-shot job.
    #[must_use]
    pub fn at(when: Timestamp, agent_id: AgentId, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            schedule: JobSchedule::At(when),
            agent_id,
            prompt: prompt.into(),
            max_token_budget: None,
            delivery: None,
            created_at: Timestamp::now(),
        }
    }

    /// Attach a delivery spec.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Attach a token ceiling.
    #[must_use]
    pub fn with_budget(mut self, tokens: u64) -> Self {
        self.max_token_budget = Some(tokens);
        self
    }

    /// Whether this job is due at `now` (minute granularity).
    ///
    /// One-shots are due on any tick at or after their instant.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        match &self.schedule {
            JobSchedule::Cron(expression) => parse_cron(expression)
                .map(|s| s.includes(now))
                .unwrap_or(false),
            JobSchedule::At(when) => now >= when.0,
        }
    }

    /// Whether this job fires once and is then removed.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        matches!(self.schedule, JobSchedule::At(_))
    }
}

/// Parse a five-field cron expression (the `cron` crate wants seconds, so a
/// zero seconds field is prepended).
fn parse_cron(expression: &str) -> SchedulerResult<cron::Schedule> {
    let with_seconds = format!("0 {expression}");
    cron::Schedule::from_str(&with_seconds)
        .map_err(|e| SchedulerError::InvalidExpression(format!("{expression}: {e}")))
}
