//! OpenAI-compatible chat completions provider.
//!
//! Works against any endpoint speaking the `/v1/chat/completions` dialect.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChunkStream, LlmProvider, ProviderSettings};
use crate::types::{
    ChatMessage, ChatRole, CompletionChunk, MessageBody, TokenUsage, ToolDef, ToolInvocation,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Provider for OpenAI-compatible endpoints.
pub struct OpenAiCompatProvider {
    client: Client,
    settings: ProviderSettings,
}

impl OpenAiCompatProvider {
    /// Create a provider.
    #[must_use]
    pub fn new(settings: ProviderSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, settings }
    }

    fn endpoint(&self) -> String {
        let base = self
            .settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}{COMPLETIONS_PATH}")
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolDef], system: &str) -> Value {
        let mut api_messages = Vec::new();
        if !system.trim().is_empty() {
            api_messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for message in messages {
            match &message.body {
                MessageBody::Text(text) => {
                    let role = match message.role {
                        ChatRole::Assistant => "assistant",
                        ChatRole::System => "system",
                        ChatRole::User | ChatRole::Tool => "user",
                    };
                    api_messages.push(serde_json::json!({"role": role, "content": text}));
                },
                MessageBody::Invocations(calls) => {
                    api_messages.push(serde_json::json!({
                        "role": "assistant",
                        "tool_calls": calls
                            .iter()
                            .map(|c| serde_json::json!({
                                "id": c.id,
                                "type": "function",
                                "function": {
                                    "name": c.name,
                                    "arguments": c.arguments.to_string(),
                                },
                            }))
                            .collect::<Vec<_>>(),
                    }));
                },
                MessageBody::Outcome(outcome) => {
                    api_messages.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": outcome.call_id,
                        "content": outcome.content,
                    }));
                },
            }
        }

        let mut request = serde_json::json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "messages": api_messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !tools.is_empty() {
            request["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            },
                        })
                    })
                    .collect(),
            );
        }

        request
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn into_invocation(self) -> LlmResult<ToolInvocation> {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.arguments)
                .map_err(|e| LlmError::MalformedEvent(format!("tool args: {e}")))?
        };
        Ok(ToolInvocation {
            id: self.id,
            name: self.name,
            arguments,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        system: &str,
    ) -> LlmResult<ChunkStream> {
        let body = self.build_request(messages, tools, system);
        debug!(model = %self.settings.model, "OpenAI-compatible stream request");

        let mut request = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json");
        if let Some(ref key) = self.settings.api_key {
            request = request.header("authorization", format!("Bearer {key}"));
        }
        let response = request.json(&body).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                retry_after_secs: None,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: body.chars().take(1024).collect(),
            });
        }

        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer = String::new();
            let mut usage = TokenUsage::default();
            let mut pending: Vec<PendingCall> = Vec::new();
            let mut finished = false;

            while let Some(piece) = bytes.next().await {
                let piece = piece?;
                buffer.push_str(&String::from_utf8_lossy(&piece));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..pos.saturating_add(1)).collect();
                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        for call in pending.drain(..) {
                            yield CompletionChunk::ToolUse {
                                invocation: call.into_invocation()?,
                            };
                        }
                        finished = true;
                        yield CompletionChunk::Done { usage };
                        continue;
                    }

                    let event: Value = serde_json::from_str(data)
                        .map_err(|e| LlmError::MalformedEvent(e.to_string()))?;

                    if let Some(u) = event.get("usage").filter(|u| !u.is_null()) {
                        usage.input_tokens = u
                            .get("prompt_tokens")
                            .and_then(Value::as_u64)
                            .and_then(|n| usize::try_from(n).ok())
                            .unwrap_or(0);
                        usage.output_tokens = u
                            .get("completion_tokens")
                            .and_then(Value::as_u64)
                            .and_then(|n| usize::try_from(n).ok())
                            .unwrap_or(0);
                    }

                    let Some(delta) = event
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                    else {
                        continue;
                    };

                    if let Some(text) = delta.get("content").and_then(Value::as_str)
                        && !text.is_empty()
                    {
                        yield CompletionChunk::TextDelta {
                            text: text.to_string(),
                        };
                    }

                    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                        for call in calls {
                            let index = call
                                .get("index")
                                .and_then(Value::as_u64)
                                .and_then(|n| usize::try_from(n).ok())
                                .unwrap_or(0);
                            while pending.len() <= index {
                                pending.push(PendingCall::default());
                            }
                            let slot = &mut pending[index];
                            if let Some(id) = call.get("id").and_then(Value::as_str) {
                                slot.id = id.to_string();
                            }
                            if let Some(function) = call.get("function") {
                                if let Some(name) =
                                    function.get("name").and_then(Value::as_str)
                                {
                                    slot.name.push_str(name);
                                }
                                if let Some(args) =
                                    function.get("arguments").and_then(Value::as_str)
                                {
                                    slot.arguments.push_str(args);
                                }
                            }
                        }
                    }
                }
            }

            if !finished {
                Err(LlmError::Truncated)?;
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape_with_tools() {
        let provider = OpenAiCompatProvider::new(ProviderSettings::new("gpt-x"));
        let tools = vec![ToolDef {
            name: "memory_read".to_string(),
            description: "read memory".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = provider.build_request(&[ChatMessage::user("hi")], &tools, "sys");

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "memory_read");
    }

    #[test]
    fn test_pending_call_assembly() {
        let call = PendingCall {
            id: "c1".to_string(),
            name: "web_fetch".to_string(),
            arguments: "{\"url\":\"https://example.com\"}".to_string(),
        };
        let invocation = call.into_invocation().unwrap();
        assert_eq!(invocation.arguments["url"], "https://example.com");
    }

    #[test]
    fn test_empty_args_become_empty_object() {
        let invocation = PendingCall::default().into_invocation().unwrap();
        assert!(invocation.arguments.as_object().unwrap().is_empty());
    }
}
