//! Conversation and streaming types shared by all providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// User input.
    User,
    /// Model output.
    Assistant,
    /// Host-injected instruction (corrective guard messages).
    System,
    /// Tool result fed back to the model.
    Tool,
}

/// Message body: plain text, tool invocations, or a tool outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    /// Plain text.
    Text(String),
    /// Assistant-requested tool invocations.
    Invocations(Vec<ToolInvocation>),
    /// Result of one tool invocation.
    Outcome(ToolOutcome),
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced it.
    pub role: ChatRole,
    /// What it says.
    pub body: MessageBody,
}

impl ChatMessage {
    /// A user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            body: MessageBody::Text(text.into()),
        }
    }

    /// An assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            body: MessageBody::Text(text.into()),
        }
    }

    /// A host-injected system instruction.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            body: MessageBody::Text(text.into()),
        }
    }

    /// An assistant message carrying tool invocations.
    #[must_use]
    pub fn invocations(calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            body: MessageBody::Invocations(calls),
        }
    }

    /// A tool outcome message.
    #[must_use]
    pub fn outcome(outcome: ToolOutcome) -> Self {
        Self {
            role: ChatRole::Tool,
            body: MessageBody::Outcome(outcome),
        }
    }

    /// Text content, if this is a text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// A tool the model may invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call ID.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments object.
    pub arguments: Value,
}

/// The result of executing one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The invocation this answers.
    pub call_id: String,
    /// Result content handed back to the model.
    pub content: String,
    /// Whether the tool failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutcome {
    /// A successful outcome.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failed outcome. Tool errors go back to the model as data, never as
    /// process failures.
    pub fn err(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: message.into(),
            is_error: true,
        }
    }
}

/// Token usage for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: usize,
    /// Generated tokens.
    pub output_tokens: usize,
}

/// One chunk of a streamed completion, in arrival order.
///
/// This is also the chunk shape the `llm_call` IPC action returns: an
/// ordered list of text deltas and tool invocations closed by a terminal
/// [`CompletionChunk::Done`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionChunk {
    /// Incremental text.
    TextDelta {
        /// The text fragment.
        text: String,
    },
    /// A complete tool invocation (providers buffer argument deltas).
    ToolUse {
        /// The invocation.
        invocation: ToolInvocation,
    },
    /// Terminal chunk with token counts.
    Done {
        /// Usage for the whole completion.
        usage: TokenUsage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.role, ChatRole::User);
        assert_eq!(msg.text(), Some("hello"));

        let outcome = ChatMessage::outcome(ToolOutcome::err("c1", "boom"));
        assert!(outcome.text().is_none());
    }

    #[test]
    fn test_chunk_serialization_shape() {
        let chunk = CompletionChunk::TextDelta {
            text: "hi".to_string(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "text_delta");

        let done = CompletionChunk::Done {
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 2,
            },
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["usage"]["input_tokens"], 10);
    }
}
