//! AX Core - Foundation types for the trust-partitioned agent host.
//!
//! This crate provides:
//! - The shared error taxonomy (validation / policy / provider / fatal)
//! - Typed identifiers (`SessionId`, `AgentId`) and timestamps
//! - The central safe-path helper every caller-supplied path goes through
//! - `SessionAddress`, the hierarchical key for conversation locations
//! - Retry utilities with exponential backoff

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod address;
pub mod error;
pub mod paths;
pub mod prelude;
pub mod retry;
pub mod types;

pub use address::{AddressScope, SessionAddress};
pub use error::{AxError, AxResult, PolicyDenial};
pub use paths::{is_safe_id, safe_join};
pub use retry::{RetryConfig, retry};
pub use types::{AgentId, SessionId, Timestamp};
