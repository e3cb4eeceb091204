//! Channel adapters and the session store.
//!
//! Adapters are trait objects behind a static factory registry: config
//! names map to a fixed allowlist of constructors, never to code loaded
//! from config-supplied paths.

use async_trait::async_trait;
use ax_core::{AgentId, SessionAddress};
use ax_scheduler::DeliveryLookup;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{HostError, HostResult};

/// An outbound channel adapter.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Provider name (config selector and address `provider` value).
    fn name(&self) -> &str;

    /// Post a message to an address on this platform.
    async fn send(&self, address: &SessionAddress, text: &str) -> HostResult<()>;

    /// Whether the adapter wants the agent to respond in this context at
    /// all (e.g. unaddressed chatter in a busy channel).
    fn should_respond(&self, _address: &SessionAddress, _message: &str) -> bool {
        true
    }

    /// Prior messages in a thread as `(role, content)` pairs, newest last.
    /// Used to backfill context the first time the agent participates in a
    /// thread. Platforms without history return nothing.
    async fn thread_history(
        &self,
        _address: &SessionAddress,
        _limit: usize,
    ) -> HostResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

/// Factory signature for the static registry.
pub type AdapterFactory = fn() -> Arc<dyn ChannelAdapter>;

/// The static adapter registry.
///
/// Names come from config; factories live in this fixed allowlist.
pub struct ChannelRegistry {
    factories: HashMap<&'static str, AdapterFactory>,
    active: DashMap<String, Arc<dyn ChannelAdapter>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// The built-in allowlist. The console adapter is always available;
    /// platform adapters register here as they are implemented.
    #[must_use]
    pub fn new() -> Self {
        let mut factories: HashMap<&'static str, AdapterFactory> = HashMap::new();
        factories.insert("console", || Arc::new(ConsoleAdapter));
        Self {
            factories,
            active: DashMap::new(),
        }
    }

    /// Start the adapters named in config. Unknown names are errors: a
    /// typo must not silently drop a channel.
    ///
    /// # Errors
    ///
    /// Returns an error for a name outside the allowlist.
    pub fn start(&self, names: &[String]) -> HostResult<()> {
        for name in names {
            let factory = self.factories.get(name.as_str()).ok_or_else(|| {
                HostError::InvalidRequest(format!("unknown channel adapter: {name}"))
            })?;
            let adapter = factory();
            info!(adapter = %adapter.name(), "Channel adapter started");
            self.active.insert(name.clone(), adapter);
        }
        Ok(())
    }

    /// A running adapter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.active.get(name).map(|a| Arc::clone(&a))
    }

    /// Whether a provider name has a running adapter.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }
}

/// Adapter that prints to the host console; the default for local use.
struct ConsoleAdapter;

#[async_trait]
impl ChannelAdapter for ConsoleAdapter {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, address: &SessionAddress, text: &str) -> HostResult<()> {
        println!("[{}] {text}", address.canonical_key());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionStoreState {
    last_addresses: HashMap<String, SessionAddress>,
}

/// Maps agents to their most recent channel interaction.
///
/// Backs `"last"` delivery resolution. Persisted as a small JSON file so
/// scheduled deliveries survive restarts.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    state: DashMap<String, SessionAddress>,
}

impl SessionStore {
    /// An in-memory store (tests, ephemeral hosts).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: DashMap::new(),
        }
    }

    /// A file-backed store, loading existing state if present.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = DashMap::new();
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match serde_json::from_str::<SessionStoreState>(&contents) {
                Ok(loaded) => {
                    for (agent, address) in loaded.last_addresses {
                        state.insert(agent, address);
                    }
                },
                Err(e) => warn!(error = %e, "Corrupted session store, starting fresh"),
            }
        }
        Self {
            path: Some(path),
            state,
        }
    }

    /// Record an agent's latest channel interaction.
    pub fn record_interaction(&self, agent_id: &AgentId, address: SessionAddress) {
        self.state.insert(agent_id.as_str().to_string(), address);
        self.persist();
    }

    fn persist(&self) {
        let Some(ref path) = self.path else { return };
        let snapshot = SessionStoreState {
            last_addresses: self
                .state
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        if let Ok(json) = serde_json::to_string_pretty(&snapshot) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(path, json) {
                warn!(error = %e, "Failed to persist session store");
            }
        }
    }
}

impl DeliveryLookup for SessionStore {
    fn last_address(&self, agent_id: &AgentId) -> Option<SessionAddress> {
        self.state.get(agent_id.as_str()).map(|a| a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_registry_allowlist() {
        let registry = ChannelRegistry::new();
        assert!(registry.start(&["console".to_string()]).is_ok());
        assert!(registry.is_registered("console"));
        assert!(!registry.is_registered("slack"));

        let err = registry.start(&["carrier-pigeon".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn test_session_store_last_address() {
        let store = SessionStore::in_memory();
        let agent = AgentId::parse("friday").unwrap();
        assert!(store.last_address(&agent).is_none());

        let slack = SessionAddress::channel("slack", "T01", "C42");
        store.record_interaction(&agent, slack.clone());
        assert_eq!(store.last_address(&agent), Some(slack.clone()));

        // Latest interaction wins.
        let dm = SessionAddress::dm("slack", "U7");
        store.record_interaction(&agent, dm.clone());
        assert_eq!(store.last_address(&agent), Some(dm));
    }

    #[test]
    fn test_session_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions/last.json");
        let agent = AgentId::parse("friday").unwrap();

        {
            let store = SessionStore::open(&path);
            store.record_interaction(&agent, SessionAddress::dm("slack", "U7"));
        }

        let store = SessionStore::open(&path);
        assert_eq!(
            store.last_address(&agent),
            Some(SessionAddress::dm("slack", "U7"))
        );
    }
}
