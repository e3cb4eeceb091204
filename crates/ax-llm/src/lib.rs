//! LLM provider abstraction.
//!
//! Providers expose streaming completions over a configurable base URL. The
//! base URL override is load-bearing: inside the sandbox it points at the
//! TCP bridge, so the agent-side client never needs (or sees) an API key.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod anthropic;
pub mod error;
pub mod fallback;
pub mod openai_compat;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use error::{LlmError, LlmResult};
pub use fallback::FallbackChain;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ChunkStream, LlmProvider, ProviderSettings};
pub use types::{
    ChatMessage, ChatRole, CompletionChunk, MessageBody, ToolDef, ToolInvocation, ToolOutcome,
    TokenUsage,
};
