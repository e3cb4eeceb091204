//! Session addresses: where a conversation takes place.
//!
//! An address identifies a platform location (a Slack thread, a DM, a group)
//! hierarchically: a thread address owns its enclosing channel address as a
//! parent. Canonicalization produces a stable colon-joined key used for
//! lookups and hashing, so no back-references are needed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation scope within a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressScope {
    /// Direct message with one peer.
    Dm,
    /// A named channel.
    Channel,
    /// A thread inside a channel.
    Thread,
    /// A multi-party group conversation.
    Group,
}

impl fmt::Display for AddressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dm => write!(f, "dm"),
            Self::Channel => write!(f, "channel"),
            Self::Thread => write!(f, "thread"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// A typed, hierarchical key identifying a conversation location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAddress {
    /// Channel adapter ID (e.g. `"slack"`).
    pub provider: String,
    /// Conversation scope.
    pub scope: AddressScope,
    /// Platform workspace/team identifier, when the platform has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Channel identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Thread identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    /// Peer identifier (DMs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    /// Enclosing address (a thread's channel). Owned, never a back-reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<SessionAddress>>,
}

impl SessionAddress {
    /// Build a DM address.
    #[must_use]
    pub fn dm(provider: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            scope: AddressScope::Dm,
            workspace: None,
            channel: None,
            thread: None,
            peer: Some(peer.into()),
            parent: None,
        }
    }

    /// Build a channel address.
    #[must_use]
    pub fn channel(
        provider: impl Into<String>,
        workspace: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            scope: AddressScope::Channel,
            workspace: Some(workspace.into()),
            channel: Some(channel.into()),
            thread: None,
            peer: None,
            parent: None,
        }
    }

    /// Build a thread address under a channel.
    #[must_use]
    pub fn thread(channel_addr: &SessionAddress, thread: impl Into<String>) -> Self {
        Self {
            provider: channel_addr.provider.clone(),
            scope: AddressScope::Thread,
            workspace: channel_addr.workspace.clone(),
            channel: channel_addr.channel.clone(),
            thread: Some(thread.into()),
            peer: None,
            parent: Some(Box::new(channel_addr.clone())),
        }
    }

    /// Deterministic colon-joined canonical key.
    ///
    /// Two addresses that refer to the same location produce the same key
    /// regardless of how they were constructed. The parent does not
    /// participate: it is derivable from the identifiers.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.provider];
        let scope = self.scope.to_string();
        parts.push(&scope);
        for field in [&self.workspace, &self.channel, &self.thread, &self.peer] {
            if let Some(value) = field {
                parts.push(value);
            }
        }
        parts.join(":")
    }

    /// The enclosing address, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&SessionAddress> {
        self.parent.as_deref()
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key_is_stable() {
        let chan = SessionAddress::channel("slack", "T01", "C42");
        assert_eq!(chan.canonical_key(), "slack:channel:T01:C42");

        let thread = SessionAddress::thread(&chan, "1723.001");
        assert_eq!(thread.canonical_key(), "slack:thread:T01:C42:1723.001");
        assert_eq!(thread.parent().unwrap().canonical_key(), chan.canonical_key());
    }

    #[test]
    fn test_dm_key() {
        let dm = SessionAddress::dm("slack", "U99");
        assert_eq!(dm.canonical_key(), "slack:dm:U99");
        assert!(dm.parent().is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let chan = SessionAddress::channel("slack", "T01", "C42");
        let thread = SessionAddress::thread(&chan, "1723.001");
        let json = serde_json::to_string(&thread).unwrap();
        let back: SessionAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, thread);
    }
}
