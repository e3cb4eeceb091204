//! Audit subsystem errors.

use thiserror::Error;

/// Errors from audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to append an entry.
    #[error("audit write failed: {0}")]
    WriteFailed(String),

    /// Failed to read entries back.
    #[error("audit read failed: {0}")]
    ReadFailed(String),

    /// Chain integrity violation detected during verification.
    #[error("audit chain broken at entry {entry_id}")]
    ChainBroken {
        /// The first entry whose link does not verify.
        entry_id: String,
    },

    /// Underlying I/O failure.
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
