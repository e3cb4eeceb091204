//! Provider fallback chain.
//!
//! Walks providers in order. Each provider gets retried with exponential
//! backoff on retryable errors before the chain moves on.

use async_trait::async_trait;
use ax_core::RetryConfig;
use tracing::warn;

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChunkStream, LlmProvider};
use crate::types::{ChatMessage, ToolDef};

/// An ordered chain of providers with per-provider retry.
pub struct FallbackChain {
    providers: Vec<Box<dyn LlmProvider>>,
    retry: RetryConfig,
}

impl FallbackChain {
    /// Build a chain. The first provider is the primary.
    ///
    /// An empty chain is allowed to construct but fails every call.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self {
            providers,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Number of providers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl LlmProvider for FallbackChain {
    fn name(&self) -> &str {
        self.providers.first().map_or("fallback", |p| p.name())
    }

    fn model(&self) -> &str {
        self.providers.first().map_or("", |p| p.model())
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        system: &str,
    ) -> LlmResult<ChunkStream> {
        let mut last_error = "no providers configured".to_string();

        for provider in &self.providers {
            let attempt = ax_core::retry(
                &self.retry,
                || provider.stream(messages, tools, system),
                LlmError::is_retryable,
            )
            .await;

            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider failed, trying next");
                    last_error = format!("{}: {e}", provider.name());
                },
            }
        }

        Err(LlmError::AllProvidersFailed(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompletionChunk;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDef],
            _system: &str,
        ) -> LlmResult<ChunkStream> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(LlmError::Api {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            let chunks = vec![
                Ok(CompletionChunk::TextDelta {
                    text: "ok".to_string(),
                }),
                Ok(CompletionChunk::Done {
                    usage: crate::types::TokenUsage::default(),
                }),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let chain = FallbackChain::new(vec![Box::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 2,
        })])
        .with_retry(fast_retry());

        let mut stream = chain.stream(&[], &[], "").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, CompletionChunk::TextDelta { .. }));
    }

    #[tokio::test]
    async fn test_falls_through_to_second_provider() {
        let chain = FallbackChain::new(vec![
            Box::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first: u32::MAX,
            }),
            Box::new(FlakyProvider {
                calls: AtomicU32::new(0),
                fail_first: 0,
            }),
        ])
        .with_retry(fast_retry());

        assert!(chain.stream(&[], &[], "").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let chain = FallbackChain::new(Vec::new());
        let err = match chain.stream(&[], &[], "").await {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, LlmError::AllProvidersFailed(_)));
    }
}
