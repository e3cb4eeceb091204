//! Typed identifiers and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{AxError, AxResult};

/// Session identifier: a lowercase UUIDv4.
///
/// Sessions are identified solely by this ID; workspace directories are
/// derived from it, which is why parsing is strict (see [`SessionId::parse`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Mint a fresh session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from caller input.
    ///
    /// Accepts only the canonical lowercase hyphenated UUIDv4 form. Anything
    /// else (uppercase, braces, URNs, path fragments) is rejected, because
    /// the string is later used as a directory name under the workspace root.
    ///
    /// # Errors
    ///
    /// Returns [`AxError::InvalidSessionId`] if the input is not canonical.
    pub fn parse(input: &str) -> AxResult<Self> {
        let uuid =
            Uuid::parse_str(input).map_err(|_| AxError::InvalidSessionId(input.to_string()))?;
        if uuid.get_version_num() != 4 || uuid.hyphenated().to_string() != input {
            return Err(AxError::InvalidSessionId(input.to_string()));
        }
        Ok(Self(uuid))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Agent identifier: the name of an agent directory under `agents/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Create an agent ID.
    ///
    /// # Errors
    ///
    /// Returns [`AxError::InvalidField`] if the name contains characters
    /// outside `[A-Za-z0-9_-]` (it becomes a path segment).
    pub fn parse(name: &str) -> AxResult<Self> {
        if name.is_empty() || !crate::paths::is_safe_id(name) {
            return Err(AxError::InvalidField {
                field: "agent_id".to_string(),
                reason: "must match [A-Za-z0-9_-]+".to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    /// The agent name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC timestamp newtype used across entries and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Render as RFC 3339.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
