//! Stdin payload parsing.

use serde::{Deserialize, Serialize};

/// One prior turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// `user` or `assistant`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// Taint state handed down by the host for prompt rendering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaintState {
    /// Current ratio.
    pub ratio: f64,
    /// Profile threshold.
    pub threshold: f64,
}

/// The turn payload the host writes to the agent's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    /// The user message for this turn.
    pub message: String,
    /// Bounded prior history, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    /// Taint state for the defense module.
    #[serde(default)]
    pub taint_state: Option<TaintState>,
}

impl AgentInput {
    /// Parse a stdin payload.
    ///
    /// JSON objects get the full treatment; anything else is accepted as a
    /// plain-text message for backward compatibility with older hosts.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{')
            && let Ok(input) = serde_json::from_str::<AgentInput>(trimmed)
        {
            return input;
        }
        Self {
            message: trimmed.to_string(),
            history: Vec::new(),
            taint_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_payload() {
        let input = AgentInput::parse(
            r#"{"message":"hi","history":[{"role":"user","content":"earlier"}],"taint_state":{"ratio":0.4,"threshold":0.3}}"#,
        );
        assert_eq!(input.message, "hi");
        assert_eq!(input.history.len(), 1);
        assert!(input.taint_state.unwrap().ratio > 0.39);
    }

    #[test]
    fn test_plain_text_fallback() {
        let input = AgentInput::parse("just a message\n");
        assert_eq!(input.message, "just a message");
        assert!(input.history.is_empty());
    }

    #[test]
    fn test_malformed_json_degrades_to_text() {
        let input = AgentInput::parse("{not json");
        assert_eq!(input.message, "{not json");
    }
}
