//! Cancellation registry: one live token per conversation key.
//!
//! A newly arrived message always represents the freshest user intent, so
//! acquiring a token cancels and replaces whatever was current for the key
//! ("last write wins", no queuing). The orchestrator polls the token at its
//! suspension points; the registry itself never inspects session state.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

struct Slot {
    token: CancellationToken,
    seq: u64,
}

/// Proof of which registration a pipeline run holds. `release` only clears
/// the slot when the stored sequence still matches, so a run that has been
/// superseded can never clear a newer run's token.
pub struct GenerationTicket {
    key: String,
    seq: u64,
    token: CancellationToken,
}

impl GenerationTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

pub struct CancellationRegistry {
    slots: DashMap<String, Slot>,
    next_seq: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        CancellationRegistry {
            slots: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Cancel any token currently registered for `key` and install a fresh,
    /// unsignaled one. Atomic per key: the DashMap entry holds the shard lock
    /// for the whole cancel-and-swap, so two concurrent callers can never
    /// both believe they hold the current token.
    pub fn cancel_and_create(&self, key: &str) -> GenerationTicket {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().token.cancel();
                log::info!("[CANCEL] Superseding live generation for {}", key);
                occupied.insert(Slot { token: token.clone(), seq });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { token: token.clone(), seq });
            }
        }

        GenerationTicket {
            key: key.to_string(),
            seq,
            token,
        }
    }

    /// Remove the registration the ticket created, if it is still current.
    /// Idempotent: a no-op when the slot is gone or a newer ticket replaced it.
    pub fn release(&self, ticket: &GenerationTicket) {
        self.slots
            .remove_if(&ticket.key, |_, slot| slot.seq == ticket.seq);
    }

    /// Read-only lookup of the current token for a key.
    pub fn current(&self, key: &str) -> Option<CancellationToken> {
        self.slots.get(key).map(|slot| slot.token.clone())
    }

    /// Signal the current token without replacing it. Used by explicit stop
    /// controls; the owning run observes the signal and releases as usual.
    pub fn cancel(&self, key: &str) {
        if let Some(slot) = self.slots.get(key) {
            log::info!("[CANCEL] Stop requested for {}", key);
            slot.token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lifecycle() {
        let registry = CancellationRegistry::new();
        assert!(registry.current("chat-1").is_none());

        let ticket = registry.cancel_and_create("chat-1");
        assert!(!ticket.token().is_cancelled());
        assert!(registry.current("chat-1").is_some());

        registry.release(&ticket);
        assert!(registry.current("chat-1").is_none());
    }

    #[test]
    fn test_cancel_and_create_signals_previous() {
        let registry = CancellationRegistry::new();

        let first = registry.cancel_and_create("chat-1");
        let second = registry.cancel_and_create("chat-1");

        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());

        // The registered token is the second one
        let current = registry.current("chat-1").unwrap();
        assert!(!current.is_cancelled());
    }

    #[test]
    fn test_release_is_guarded() {
        let registry = CancellationRegistry::new();

        let first = registry.cancel_and_create("chat-1");
        let second = registry.cancel_and_create("chat-1");

        // The superseded run's cleanup must not clear the newer registration
        registry.release(&first);
        assert!(registry.current("chat-1").is_some());

        registry.release(&second);
        assert!(registry.current("chat-1").is_none());
    }

    #[test]
    fn test_release_idempotent() {
        let registry = CancellationRegistry::new();
        let ticket = registry.cancel_and_create("chat-1");
        registry.release(&ticket);
        registry.release(&ticket);
        assert!(registry.current("chat-1").is_none());
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = CancellationRegistry::new();

        let one = registry.cancel_and_create("chat-1");
        let _two = registry.cancel_and_create("chat-2");

        assert!(!one.token().is_cancelled());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cancel_and_create_single_survivor() {
        let registry = Arc::new(CancellationRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.cancel_and_create("chat-1")
            }));
        }

        let mut tickets = Vec::new();
        for handle in handles {
            tickets.push(handle.await.expect("join"));
        }

        // Exactly one ticket may still hold an unsignaled token
        let live: Vec<_> = tickets.iter().filter(|t| !t.token().is_cancelled()).collect();
        assert_eq!(live.len(), 1);

        // And it is the one the registry considers current
        let current = registry.current("chat-1").unwrap();
        assert!(!current.is_cancelled());
        live[0].token().cancel();
        assert!(current.is_cancelled());
    }
}
