//! Anthropic Messages API provider.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChunkStream, LlmProvider, ProviderSettings};
use crate::types::{
    ChatMessage, ChatRole, CompletionChunk, MessageBody, TokenUsage, ToolDef, ToolInvocation,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Provider for the Anthropic Messages API.
pub struct AnthropicProvider {
    client: Client,
    settings: ProviderSettings,
}

impl AnthropicProvider {
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
        format!("{base}{MESSAGES_PATH}")
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolDef], system: &str) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(convert_message)
            .collect();

        let mut request = serde_json::json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "messages": api_messages,
            "stream": true,
        });

        // Host-injected system turns ride along with the builder-assembled
        // system prompt.
        let injected: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .filter_map(ChatMessage::text)
            .collect();
        let full_system = if injected.is_empty() {
            system.to_string()
        } else {
            format!("{system}\n\n{}", injected.join("\n\n"))
        };
        if !full_system.trim().is_empty() {
            request["system"] = Value::String(full_system);
        }

        if !tools.is_empty() {
            request["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }

        request
    }
}

fn convert_message(message: &ChatMessage) -> Value {
    match &message.body {
        MessageBody::Text(text) => serde_json::json!({
            "role": if message.role == ChatRole::Assistant { "assistant" } else { "user" },
            "content": text,
        }),
        MessageBody::Invocations(calls) => serde_json::json!({
            "role": "assistant",
            "content": calls
                .iter()
                .map(|c| serde_json::json!({
                    "type": "tool_use",
                    "id": c.id,
                    "name": c.name,
                    "input": c.arguments,
                }))
                .collect::<Vec<_>>(),
        }),
        MessageBody::Outcome(outcome) => serde_json::json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": outcome.call_id,
                "content": outcome.content,
                "is_error": outcome.is_error,
            }],
        }),
    }
}

/// One SSE event from the Messages API, with only the fields we use.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    content_block: Option<Value>,
    #[serde(default)]
    delta: Option<Value>,
    #[serde(default)]
    usage: Option<Value>,
}

fn usage_field(value: Option<&Value>, key: &str) -> usize {
    value
        .and_then(|u| u.get(key))
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "claude"
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
        debug!(model = %self.settings.model, "Anthropic stream request");

        let mut request = self
            .client
            .post(self.endpoint())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json");
        if let Some(ref key) = self.settings.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.json(&body).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
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
            let mut input_tokens = 0usize;
            let mut output_tokens = 0usize;
            let mut tool_id = String::new();
            let mut tool_name = String::new();
            let mut tool_args = String::new();
            let mut in_tool_block = false;
            let mut finished = false;

            while let Some(piece) = bytes.next().await {
                let piece = piece?;
                buffer.push_str(&String::from_utf8_lossy(&piece));

                while let Some(pos) = buffer.find("\n\n") {
                    let raw: String = buffer.drain(..pos.saturating_add(2)).collect();
                    let Some(data) = raw
                        .lines()
                        .find_map(|l| l.strip_prefix("data:"))
                        .map(str::trim)
                    else {
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }

                    let event: WireEvent = serde_json::from_str(data)
                        .map_err(|e| LlmError::MalformedEvent(e.to_string()))?;

                    match event.kind.as_str() {
                        "message_start" => {
                            let usage = event.message.as_ref().and_then(|m| m.get("usage"));
                            input_tokens = usage_field(usage, "input_tokens");
                        },
                        "content_block_start" => {
                            let block = event.content_block.as_ref();
                            if block.and_then(|b| b.get("type")).and_then(Value::as_str)
                                == Some("tool_use")
                            {
                                in_tool_block = true;
                                tool_id = block
                                    .and_then(|b| b.get("id"))
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string();
                                tool_name = block
                                    .and_then(|b| b.get("name"))
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string();
                                tool_args.clear();
                            }
                        },
                        "content_block_delta" => {
                            let delta = event.delta.as_ref();
                            match delta.and_then(|d| d.get("type")).and_then(Value::as_str) {
                                Some("text_delta") => {
                                    if let Some(text) =
                                        delta.and_then(|d| d.get("text")).and_then(Value::as_str)
                                    {
                                        yield CompletionChunk::TextDelta {
                                            text: text.to_string(),
                                        };
                                    }
                                },
                                Some("input_json_delta") => {
                                    if let Some(part) = delta
                                        .and_then(|d| d.get("partial_json"))
                                        .and_then(Value::as_str)
                                    {
                                        tool_args.push_str(part);
                                    }
                                },
                                _ => {},
                            }
                        },
                        "content_block_stop" => {
                            if in_tool_block {
                                let arguments = if tool_args.trim().is_empty() {
                                    Value::Object(serde_json::Map::new())
                                } else {
                                    serde_json::from_str(&tool_args).map_err(|e| {
                                        LlmError::MalformedEvent(format!("tool args: {e}"))
                                    })?
                                };
                                yield CompletionChunk::ToolUse {
                                    invocation: ToolInvocation {
                                        id: std::mem::take(&mut tool_id),
                                        name: std::mem::take(&mut tool_name),
                                        arguments,
                                    },
                                };
                                in_tool_block = false;
                            }
                        },
                        "message_delta" => {
                            output_tokens = usage_field(event.usage.as_ref(), "output_tokens");
                        },
                        "message_stop" => {
                            finished = true;
                            yield CompletionChunk::Done {
                                usage: TokenUsage {
                                    input_tokens,
                                    output_tokens,
                                },
                            };
                        },
                        // ping, error passthroughs handled by status above
                        _ => {},
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
    fn test_endpoint_respects_base_url() {
        let provider =
            AnthropicProvider::new(ProviderSettings::new("m").base_url("http://127.0.0.1:39231/"));
        assert_eq!(provider.endpoint(), "http://127.0.0.1:39231/v1/messages");
    }

    #[test]
    fn test_request_shape() {
        let provider = AnthropicProvider::new(ProviderSettings::new("m").max_tokens(64));
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::system("corrective instruction"),
        ];
        let body = provider.build_request(&messages, &[], "base prompt");

        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], 64);
        // System turns are folded into the system field, not the messages.
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        let system = body["system"].as_str().unwrap();
        assert!(system.contains("base prompt"));
        assert!(system.contains("corrective instruction"));
    }

    #[test]
    fn test_tool_result_converts_to_user_content() {
        let msg = ChatMessage::outcome(crate::types::ToolOutcome::err("c9", "denied"));
        let value = convert_message(&msg);
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["tool_use_id"], "c9");
        assert_eq!(value["content"][0]["is_error"], true);
    }
}
