//! Reservation ledger.
//!
//! Tracks memory provisionally committed to a node between Reserve and Bind.
//! Entries are keyed by pod, so reserving the same pod twice replaces the
//! earlier entry instead of double-counting it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use podgate_framework::{NodeName, PodKey};

/// Memory reserved for one pod on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub node: NodeName,
    pub memory_bytes: u64,
}

/// Thread-safe pod → reservation table.
#[derive(Debug, Default)]
pub struct ReservationLedger {
    entries: Mutex<HashMap<PodKey, Reservation>>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reservation, returning the one it replaced.
    pub fn reserve(&self, pod: PodKey, node: &str, memory_bytes: u64) -> Option<Reservation> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            pod,
            Reservation {
                node: node.to_string(),
                memory_bytes,
            },
        )
    }

    /// Drop a reservation, returning it if one existed.
    pub fn release(&self, pod: &PodKey) -> Option<Reservation> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(pod)
    }

    pub fn get(&self, pod: &PodKey) -> Option<Reservation> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(pod).cloned()
    }

    /// Total memory currently reserved on `node`.
    pub fn reserved_memory(&self, node: &str) -> u64 {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|r| r.node == node)
            .fold(0u64, |acc, r| acc.saturating_add(r.memory_bytes))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_release() {
        let ledger = ReservationLedger::new();
        let key = PodKey::new("default", "web");

        assert!(ledger.reserve(key.clone(), "n1", 256).is_none());
        assert_eq!(ledger.reserved_memory("n1"), 256);

        let released = ledger.release(&key).unwrap();
        assert_eq!(released.node, "n1");
        assert_eq!(ledger.reserved_memory("n1"), 0);
        assert!(ledger.release(&key).is_none());
    }

    #[test]
    fn re_reserving_replaces_entry() {
        let ledger = ReservationLedger::new();
        let key = PodKey::new("default", "web");

        ledger.reserve(key.clone(), "n1", 256);
        let previous = ledger.reserve(key.clone(), "n2", 128).unwrap();

        assert_eq!(previous.node, "n1");
        assert_eq!(ledger.reserved_memory("n1"), 0);
        assert_eq!(ledger.reserved_memory("n2"), 128);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn sums_per_node() {
        let ledger = ReservationLedger::new();
        ledger.reserve(PodKey::new("a", "1"), "n1", 100);
        ledger.reserve(PodKey::new("a", "2"), "n1", 50);
        ledger.reserve(PodKey::new("a", "3"), "n2", 7);

        assert_eq!(ledger.reserved_memory("n1"), 150);
        assert_eq!(ledger.reserved_memory("n2"), 7);
        assert_eq!(ledger.reserved_memory("n3"), 0);
    }
}
