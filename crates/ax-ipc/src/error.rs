//! IPC errors.

use thiserror::Error;

/// Errors from the IPC layer.
#[derive(Debug, Error)]
pub enum IpcError {
    /// A frame exceeded the size cap or carried a bad length prefix.
    ///
    /// Terminates the connection, not the process.
    #[error("bad frame: {0}")]
    BadFrame(String),

    /// The payload was not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The payload failed schema validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection closed mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
