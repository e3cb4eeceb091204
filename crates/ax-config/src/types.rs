//! Configuration types.
//!
//! All types are self-contained; domain types are mirrored here and
//! converted at the boundary. Every struct implements [`Default`] with
//! production values so a bare section header in YAML yields a working
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for the AX host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// State root; all persisted data lives under it. Default `~/.ax`.
    pub state_root: Option<PathBuf>,
    /// Security profile mapping to the taint threshold.
    pub profile: SecurityProfile,
    /// Provider selectors, one per pluggable concern.
    pub providers: ProvidersSection,
    /// Sandbox resource limits.
    pub sandbox: SandboxLimits,
    /// Conversation history bounds.
    pub history: HistorySection,
    /// Scheduler behaviour.
    pub scheduler: SchedulerSection,
    /// Channel adapter behaviour.
    pub channels: ChannelsSection,
    /// Logging level/format.
    pub logging: LoggingSection,
    /// Model selection and fallback chain.
    pub model: ModelSection,
    /// Actions gated by the taint budget. Overrides the built-in default
    /// set when non-empty.
    pub sensitive_actions: Vec<String>,
}

/// Security profile: how much tainted context a session may accumulate
/// before sensitive actions are blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityProfile {
    /// Threshold 0.10.
    Paranoid,
    /// Threshold 0.30.
    #[default]
    Standard,
    /// Threshold 0.60.
    PowerUser,
}

impl SecurityProfile {
    /// The taint ratio threshold this profile maps to.
    #[must_use]
    pub fn taint_threshold(self) -> f64 {
        match self {
            Self::Paranoid => 0.10,
            Self::Standard => 0.30,
            Self::PowerUser => 0.60,
        }
    }
}

/// Provider selector names, resolved against the static factory registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    /// LLM provider (`claude`, `openai-compat`).
    pub llm: String,
    /// Memory store (`file`, `memory`).
    pub memory: String,
    /// Inbound/outbound scanner (`regex`).
    pub scanner: String,
    /// Channel adapters to start.
    pub channels: Vec<String>,
    /// Web provider (`http`).
    pub web: String,
    /// Browser provider (`disabled`).
    pub browser: String,
    /// Credential store (`env`).
    pub credentials: String,
    /// Skill store (`file`).
    pub skills: String,
    /// Audit sink (`jsonl`, `memory`).
    pub audit: String,
    /// Sandbox backend (`subprocess`, `seatbelt`, `nsjail`, `docker`).
    pub sandbox: String,
    /// Scheduler job store (`file`, `memory`).
    pub scheduler: String,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            llm: "claude".to_string(),
            memory: "file".to_string(),
            scanner: "regex".to_string(),
            channels: Vec::new(),
            web: "http".to_string(),
            browser: "disabled".to_string(),
            credentials: "env".to_string(),
            skills: "file".to_string(),
            audit: "jsonl".to_string(),
            sandbox: "subprocess".to_string(),
            scheduler: "file".to_string(),
        }
    }
}

/// Sandbox resource limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock timeout for one agent run, in seconds.
    pub timeout_secs: u64,
    /// Memory cap in MiB (enforced by backends that support it).
    pub memory_mb: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            memory_mb: 1024,
        }
    }
}

/// Conversation history bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Maximum prior turns loaded for a persistent session.
    pub max_turns: usize,
    /// Prior channel messages backfilled on first thread participation.
    pub thread_context_turns: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_turns: 40,
            thread_context_turns: 10,
        }
    }
}

/// Scheduler behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Inclusive start of the active window, hour of day 0-23.
    pub active_hours_start: u8,
    /// Exclusive end of the active window, hour of day 0-24.
    pub active_hours_end: u8,
    /// Default per-job token ceiling when a job does not set one.
    pub max_token_budget: Option<u64>,
    /// Heartbeat interval in minutes; 0 disables heartbeats.
    pub heartbeat_interval_mins: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            active_hours_start: 0,
            active_hours_end: 24,
            max_token_budget: None,
            heartbeat_interval_mins: 0,
        }
    }
}

/// Channel adapter behaviour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsSection {
    /// TTL for the `(provider, message_id)` dedup window, seconds.
    pub dedup_ttl_secs: u64,
}

impl Default for ChannelsSection {
    fn default() -> Self {
        Self { dedup_ttl_secs: 60 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter directive (`info`, `ax_host=debug`, ...).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Model selection and fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Primary model identifier.
    pub model: String,
    /// Context window in tokens.
    pub context_window: usize,
    /// Maximum tokens to generate per response.
    pub max_tokens: usize,
    /// Ordered fallback chain: provider names tried after the primary fails.
    pub fallback: Vec<String>,
    /// Vendor name → environment variable carrying its API key. Consumed by
    /// the credential proxy; never read anywhere else.
    pub credential_env: HashMap<String, String>,
}

impl Default for ModelSection {
    fn default() -> Self {
        let mut credential_env = HashMap::new();
        credential_env.insert("anthropic".to_string(), "ANTHROPIC_API_KEY".to_string());
        credential_env.insert("openai".to_string(), "OPENAI_API_KEY".to_string());
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            context_window: 200_000,
            max_tokens: 8192,
            fallback: Vec::new(),
            credential_env,
        }
    }
}

/// Default sensitive action set, used when the config leaves it empty.
pub const DEFAULT_SENSITIVE_ACTIONS: &[&str] = &[
    "skill_propose",
    "browser_navigate",
    "browser_click",
    "browser_type",
    "channel_send",
    "credential_write",
    "email_send",
];

impl Config {
    /// The effective sensitive action set.
    #[must_use]
    pub fn sensitive_actions(&self) -> Vec<String> {
        if self.sensitive_actions.is_empty() {
            DEFAULT_SENSITIVE_ACTIONS
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            self.sensitive_actions.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_thresholds() {
        assert!((SecurityProfile::Paranoid.taint_threshold() - 0.10).abs() < f64::EPSILON);
        assert!((SecurityProfile::Standard.taint_threshold() - 0.30).abs() < f64::EPSILON);
        assert!((SecurityProfile::PowerUser.taint_threshold() - 0.60).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bare_yaml_gives_working_config() {
        let config: Config = serde_yaml::from_str("profile: paranoid\n").unwrap();
        assert_eq!(config.profile, SecurityProfile::Paranoid);
        assert_eq!(config.sandbox.timeout_secs, 300);
        assert_eq!(config.providers.llm, "claude");
        assert!(config.sensitive_actions().contains(&"skill_propose".to_string()));
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let result: Result<Config, _> = serde_yaml::from_str("profile: yolo\n");
        assert!(result.is_err());
    }
}
