//! Delivery resolution.
//!
//! Resolution happens at fire time against the session store. The result is
//! never derived from agent output, and any failure to resolve degrades to
//! "no delivery" rather than guessing a destination.

use ax_core::{AgentId, SessionAddress};
use tracing::debug;

use crate::job::{Delivery, DeliveryMode, DeliveryTarget};

/// Looks up an agent's most recent channel interaction.
pub trait DeliveryLookup: Send + Sync {
    /// The address of the agent's last channel interaction, if any.
    fn last_address(&self, agent_id: &AgentId) -> Option<SessionAddress>;
}

/// A resolved delivery destination.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedDelivery {
    /// Discard the output.
    None,
    /// Post to this address.
    Channel(SessionAddress),
}

/// Resolve a delivery spec for an agent.
///
/// `is_registered` reports whether a provider name has a running channel
/// adapter; targets pointing at unregistered providers resolve to
/// [`ResolvedDelivery::None`].
pub fn resolve_delivery<F>(
    delivery: Option<&Delivery>,
    agent_id: &AgentId,
    lookup: &dyn DeliveryLookup,
    is_registered: F,
) -> ResolvedDelivery
where
    F: Fn(&str) -> bool,
{
    let Some(delivery) = delivery else {
        return ResolvedDelivery::None;
    };
    if delivery.mode == DeliveryMode::None {
        return ResolvedDelivery::None;
    }

    let address = match delivery.target {
        Some(DeliveryTarget::Address(ref address)) => Some(address.clone()),
        Some(DeliveryTarget::Last(_)) | None => lookup.last_address(agent_id),
    };

    match address {
        Some(address) if is_registered(&address.provider) => ResolvedDelivery::Channel(address),
        Some(address) => {
            debug!(provider = %address.provider, "Delivery target provider not registered");
            ResolvedDelivery::None
        },
        None => {
            debug!(agent = %agent_id, "No channel history for \"last\" delivery");
            ResolvedDelivery::None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLookup(HashMap<String, SessionAddress>);

    impl DeliveryLookup for MapLookup {
        fn last_address(&self, agent_id: &AgentId) -> Option<SessionAddress> {
            self.0.get(agent_id.as_str()).cloned()
        }
    }

    fn agent() -> AgentId {
        AgentId::parse("friday").unwrap()
    }

    fn channel_delivery(target: Option<DeliveryTarget>) -> Delivery {
        Delivery {
            mode: DeliveryMode::Channel,
            target,
        }
    }

    #[test]
    fn test_last_resolves_to_session_store_entry() {
        let slack = SessionAddress::channel("slack", "T01", "C42");
        let lookup = MapLookup(HashMap::from([("friday".to_string(), slack.clone())]));

        let resolved = resolve_delivery(
            Some(&channel_delivery(Some(DeliveryTarget::last()))),
            &agent(),
            &lookup,
            |p| p == "slack",
        );
        assert_eq!(resolved, ResolvedDelivery::Channel(slack));
    }

    #[test]
    fn test_no_history_resolves_to_none() {
        let lookup = MapLookup(HashMap::new());
        let resolved = resolve_delivery(
            Some(&channel_delivery(Some(DeliveryTarget::last()))),
            &agent(),
            &lookup,
            |_| true,
        );
        assert_eq!(resolved, ResolvedDelivery::None);
    }

    #[test]
    fn test_unregistered_provider_resolves_to_none() {
        let resolved = resolve_delivery(
            Some(&channel_delivery(Some(DeliveryTarget::Address(
                SessionAddress::dm("telegram", "U9"),
            )))),
            &agent(),
            &MapLookup(HashMap::new()),
            |p| p == "slack",
        );
        assert_eq!(resolved, ResolvedDelivery::None);
    }

    #[test]
    fn test_mode_none_never_resolves() {
        let delivery = Delivery {
            mode: DeliveryMode::None,
            target: Some(DeliveryTarget::last()),
        };
        let resolved = resolve_delivery(Some(&delivery), &agent(), &MapLookup(HashMap::new()), |_| {
            true
        });
        assert_eq!(resolved, ResolvedDelivery::None);
    }
}
