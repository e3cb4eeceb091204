//! The provider trait.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::LlmResult;
use crate::types::{ChatMessage, CompletionChunk, ToolDef};

/// Boxed chunk stream returned by providers.
pub type ChunkStream = Pin<Box<dyn Stream<Item = LlmResult<CompletionChunk>> + Send>>;

/// An LLM endpoint.
///
/// Implementations are plain HTTP clients; authentication is someone else's
/// problem by design. On the host the credential proxy injects keys; in the
/// sandbox the base URL points at the bridge.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (config selector value).
    fn name(&self) -> &str;

    /// Model identifier requests are issued for.
    fn model(&self) -> &str;

    /// Stream a completion as an ordered chunk sequence ending in `Done`.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        system: &str,
    ) -> LlmResult<ChunkStream>;

    /// Collect a full completion (drains `stream`).
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        system: &str,
    ) -> LlmResult<Vec<CompletionChunk>> {
        use futures::StreamExt;
        let mut stream = self.stream(messages, tools, system).await?;
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }
}

#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        system: &str,
    ) -> LlmResult<ChunkStream> {
        (**self).stream(messages, tools, system).await
    }
}

/// Settings common to all HTTP providers.
#[derive(Clone)]
pub struct ProviderSettings {
    /// Model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Base URL override. `None` means the vendor default; inside the
    /// sandbox this is always the bridge address.
    pub base_url: Option<String>,
    /// Vendor API key. Set only host-side; the sandboxed agent leaves it
    /// `None` and relies on the credential proxy.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("has_base_url", &self.base_url.is_some())
            .field("has_api_key", &self.api_key.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            base_url: None,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl ProviderSettings {
    /// Create settings for a model.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set the base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the API key (host-side only).
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}
