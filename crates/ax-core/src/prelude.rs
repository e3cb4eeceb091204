//! Convenience re-exports for downstream crates.

pub use crate::address::{AddressScope, SessionAddress};
pub use crate::error::{AxError, AxResult, PolicyDenial};
pub use crate::paths::{is_safe_id, safe_join};
pub use crate::retry::{RetryConfig, retry};
pub use crate::types::{AgentId, SessionId, Timestamp};
