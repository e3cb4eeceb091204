//! Agent runner errors.

use thiserror::Error;

/// Errors from the agent runner.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The stdin payload was unusable.
    #[error("bad input payload: {0}")]
    BadInput(String),

    /// The model call failed after fallback.
    #[error("model error: {0}")]
    Model(#[from] ax_llm::LlmError),

    /// The IPC channel to the host failed.
    #[error("ipc error: {0}")]
    Ipc(#[from] ax_ipc::IpcError),

    /// A local tool escaped the workspace or failed.
    #[error("local tool error: {0}")]
    LocalTool(String),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
