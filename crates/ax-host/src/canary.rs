//! Session canaries.
//!
//! A canary is a short random string minted per session and known only to
//! the router. It is never placed in any prompt, payload, or tool result.
//! If the model ever emits it, the prompt pipeline leaked somewhere
//! catastrophic and the response must not reach the user.

use ax_core::SessionId;
use dashmap::DashMap;
use rand::Rng;

const CANARY_LEN: usize = 16;

/// Mint and remember canaries per session.
#[derive(Debug, Default)]
pub struct CanaryRegistry {
    canaries: DashMap<SessionId, String>,
    compromised: DashMap<SessionId, ()>,
}

impl CanaryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The canary for a session, minting on first use.
    #[must_use]
    pub fn canary(&self, session_id: &SessionId) -> String {
        self.canaries
            .entry(session_id.clone())
            .or_insert_with(mint)
            .clone()
    }

    /// Mark a session compromised after a canary leak.
    pub fn mark_compromised(&self, session_id: &SessionId) {
        self.compromised.insert(session_id.clone(), ());
    }

    /// Whether a session has leaked its canary.
    #[must_use]
    pub fn is_compromised(&self, session_id: &SessionId) -> bool {
        self.compromised.contains_key(session_id)
    }

    /// Drop a session's canary state.
    pub fn end_session(&self, session_id: &SessionId) {
        self.canaries.remove(session_id);
        self.compromised.remove(session_id);
    }
}

fn mint() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..CANARY_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            char::from(ALPHABET[idx])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canary_stable_per_session() {
        let registry = CanaryRegistry::new();
        let session = SessionId::new();
        let first = registry.canary(&session);
        assert_eq!(first.len(), CANARY_LEN);
        assert_eq!(registry.canary(&session), first);

        let other = registry.canary(&SessionId::new());
        assert_ne!(other, first);
    }

    #[test]
    fn test_compromise_flag() {
        let registry = CanaryRegistry::new();
        let session = SessionId::new();
        assert!(!registry.is_compromised(&session));
        registry.mark_compromised(&session);
        assert!(registry.is_compromised(&session));
        registry.end_session(&session);
        assert!(!registry.is_compromised(&session));
    }
}
