//! Append-only audit logging.
//!
//! Every side-effectful action crossing the trust boundary is recorded as an
//! [`AuditEntry`]. Entries are chain-linked per session (each carries the
//! blake3 hash of the previous one) so truncation and reordering are
//! detectable. The sink is host-only; the sandbox never holds a handle to it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod entry;
pub mod error;
pub mod sink;

pub use entry::{AuditEntry, AuditEntryId, AuditStatus, ChainHash, summarize_args};
pub use error::{AuditError, AuditResult};
pub use sink::{AuditFilter, AuditSink, JsonlAuditSink, MemoryAuditSink};
