//! The immutable per-turn prompt context.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Contents of the agent's identity files. Empty strings mean "absent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityFiles {
    /// Operator-provided, immutable base rules.
    pub agents_md: String,
    /// Operator-provided first-run instructions.
    pub bootstrap_md: String,
    /// The agent's own mutable identity, written after first-run setup.
    pub soul_md: String,
    /// Mutable self-description.
    pub identity_md: String,
}

impl IdentityFiles {
    /// Bootstrap mode: operator rules exist but the agent has not yet
    /// written its own soul.
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        !self.bootstrap_md.is_empty() && self.soul_md.is_empty()
    }
}

/// One skill available to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    /// Skill name.
    pub name: String,
    /// Full markdown body.
    pub content: String,
}

/// Everything a prompt build may look at.
///
/// Built once per agent turn and never mutated mid-build. Time is a field,
/// not a call: the same context must always produce the same prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    /// Agent type label (e.g. `assistant`).
    pub agent_type: String,
    /// Workspace path. Never rendered raw; modules use a sanitized label.
    pub workspace: PathBuf,
    /// Skills copied into the workspace this turn.
    pub skills: Vec<SkillSummary>,
    /// Active security profile name.
    pub profile: String,
    /// Sandbox backend name.
    pub sandbox_kind: String,
    /// The session's current taint ratio.
    pub taint_ratio: f64,
    /// The profile's taint threshold.
    pub taint_threshold: f64,
    /// Identity file contents.
    pub identity: IdentityFiles,
    /// Model context window in tokens.
    pub context_window: usize,
    /// Tokens already consumed by history.
    pub history_tokens: usize,
    /// Render time, RFC 3339. Supplied by the caller for determinism.
    pub now: String,
    /// Whether a heartbeat prompt is enabled for this agent.
    pub heartbeat_enabled: bool,
    /// Whether the agent must justify replying in multi-party channels.
    pub reply_gate_enabled: bool,
}

impl PromptContext {
    /// Whether the agent is still in first-run bootstrap mode.
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.identity.is_bootstrap()
    }

    /// Whether the taint ratio has crossed the threshold.
    #[must_use]
    pub fn taint_elevated(&self) -> bool {
        self.taint_ratio > self.taint_threshold
    }

    /// The sanitized workspace label used in rendered output. The real path
    /// would leak the host user's home directory.
    #[must_use]
    pub fn workspace_label(&self) -> &'static str {
        "./workspace"
    }
}

impl Default for PromptContext {
    fn default() -> Self {
        Self {
            agent_type: "assistant".to_string(),
            workspace: PathBuf::from("."),
            skills: Vec::new(),
            profile: "standard".to_string(),
            sandbox_kind: "subprocess".to_string(),
            taint_ratio: 0.0,
            taint_threshold: 0.30,
            identity: IdentityFiles::default(),
            context_window: 200_000,
            history_tokens: 0,
            now: "1970-01-01T00:00:00Z".to_string(),
            heartbeat_enabled: false,
            reply_gate_enabled: false,
        }
    }
}
