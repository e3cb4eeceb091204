//! Channel event deduplication.
//!
//! Adapters can deliver the same platform event more than once (retries,
//! reconnects). A short-TTL set of `(provider, message_id)` pairs makes
//! repeat deliveries no-ops.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Short-TTL duplicate suppression window.
#[derive(Debug)]
pub struct DedupWindow {
    ttl: Duration,
    seen: DashMap<(String, String), Instant>,
}

impl DedupWindow {
    /// Create a window with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: DashMap::new(),
        }
    }

    /// Record a delivery. Returns `true` when this `(provider, message_id)`
    /// was already seen inside the TTL, i.e. the delivery is a duplicate.
    ///
    /// Exactly one of N concurrent calls for the same key returns `false`.
    #[must_use]
    pub fn is_duplicate(&self, provider: &str, message_id: &str) -> bool {
        let key = (provider.to_string(), message_id.to_string());
        let now = Instant::now();

        // Entry-level locking makes the insert-or-check atomic per key.
        let mut duplicate = true;
        self.seen
            .entry(key)
            .and_modify(|first_seen| {
                if now.duration_since(*first_seen) > self.ttl {
                    *first_seen = now;
                    duplicate = false;
                }
            })
            .or_insert_with(|| {
                duplicate = false;
                now
            });

        // Opportunistic prune to keep the map bounded.
        if self.seen.len() > 4096 {
            self.seen
                .retain(|_, first_seen| now.duration_since(*first_seen) <= self.ttl);
        }

        duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_inside_ttl() {
        let window = DedupWindow::new(Duration::from_secs(60));
        assert!(!window.is_duplicate("slack", "m1"));
        assert!(window.is_duplicate("slack", "m1"));
        assert!(window.is_duplicate("slack", "m1"));
        // Different message or provider is fresh.
        assert!(!window.is_duplicate("slack", "m2"));
        assert!(!window.is_duplicate("telegram", "m1"));
    }

    #[test]
    fn test_expiry_allows_redelivery() {
        let window = DedupWindow::new(Duration::from_millis(20));
        assert!(!window.is_duplicate("slack", "m1"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!window.is_duplicate("slack", "m1"));
    }

    #[test]
    fn test_concurrent_deliveries_one_winner() {
        let window = std::sync::Arc::new(DedupWindow::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let window = std::sync::Arc::clone(&window);
            handles.push(std::thread::spawn(move || {
                usize::from(!window.is_duplicate("slack", "event-9"))
            }));
        }
        let fresh: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
        assert_eq!(fresh, 1);
    }
}
