//! Pods suspended at Permit.
//!
//! Each suspended binding cycle registers here and awaits a one-shot signal
//! alongside its timer. Signals sent to a pod that is not waiting are
//! dropped and reported as `false`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use podgate_framework::PodKey;

/// External decision for a waiting pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitSignal {
    Allow,
    Reject(String),
    /// The pod was deleted or cancelled.
    Withdraw,
}

/// Identifies one registration, so a cycle only ever removes its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTicket(u64);

#[derive(Debug)]
struct Waiter {
    ticket: WaitTicket,
    tx: oneshot::Sender<WaitSignal>,
}

#[derive(Debug, Default)]
pub struct WaitingPods {
    pods: Mutex<HashMap<PodKey, Waiter>>,
    next_ticket: AtomicU64,
}

impl WaitingPods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` as waiting. Re-registering replaces the earlier
    /// receiver, which then observes a closed channel.
    pub fn register(&self, key: PodKey) -> (WaitTicket, oneshot::Receiver<WaitSignal>) {
        let ticket = WaitTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.lock().insert(key, Waiter { ticket, tx });
        (ticket, rx)
    }

    /// Deliver `signal` to a waiting pod. Returns whether one was waiting.
    pub fn signal(&self, key: &PodKey, signal: WaitSignal) -> bool {
        // Send under the lock so a failed `unregister` always finds the signal.
        let mut pods = self.lock();
        let Some(waiter) = pods.remove(key) else {
            return false;
        };
        debug!(pod = %key, ?signal, "signalling waiting pod");
        waiter.tx.send(signal).is_ok()
    }

    pub fn allow(&self, key: &PodKey) -> bool {
        self.signal(key, WaitSignal::Allow)
    }

    pub fn reject(&self, key: &PodKey, reason: impl Into<String>) -> bool {
        self.signal(key, WaitSignal::Reject(reason.into()))
    }

    pub fn withdraw(&self, key: &PodKey) -> bool {
        self.signal(key, WaitSignal::Withdraw)
    }

    /// Stop tracking `key` without signalling it, if `ticket` is still the
    /// current registration. Returns false when a signal already took it.
    pub fn unregister(&self, key: &PodKey, ticket: WaitTicket) -> bool {
        let mut pods = self.lock();
        match pods.get(key) {
            Some(waiter) if waiter.ticket == ticket => pods.remove(key).is_some(),
            _ => false,
        }
    }

    pub fn contains(&self, key: &PodKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<PodKey> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PodKey, Waiter>> {
        self.pods.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PodKey {
        PodKey::new("default", name)
    }

    #[tokio::test]
    async fn signal_reaches_waiter_once() {
        let waiting = WaitingPods::new();
        let (_, rx) = waiting.register(key("web"));
        assert!(waiting.contains(&key("web")));

        assert!(waiting.reject(&key("web"), "quota"));
        assert_eq!(rx.await.unwrap(), WaitSignal::Reject("quota".to_string()));

        assert!(!waiting.contains(&key("web")));
        assert!(!waiting.allow(&key("web")));
    }

    #[tokio::test]
    async fn unknown_pod_is_not_signalled() {
        let waiting = WaitingPods::new();
        assert!(!waiting.withdraw(&key("ghost")));
        assert!(waiting.is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_reports_false() {
        let waiting = WaitingPods::new();
        drop(waiting.register(key("web")).1);
        assert!(!waiting.allow(&key("web")));
    }

    #[tokio::test]
    async fn reregister_closes_previous_receiver() {
        let waiting = WaitingPods::new();
        let (first_ticket, first) = waiting.register(key("web"));
        let (_, second) = waiting.register(key("web"));
        assert_eq!(waiting.len(), 1);
        assert!(first.await.is_err());

        // the stale registration cannot remove its replacement
        assert!(!waiting.unregister(&key("web"), first_ticket));
        assert!(waiting.allow(&key("web")));
        assert_eq!(second.await.unwrap(), WaitSignal::Allow);
    }

    #[test]
    fn unregister_after_signal_reports_false() {
        let waiting = WaitingPods::new();
        let (ticket, mut rx) = waiting.register(key("web"));
        assert!(waiting.withdraw(&key("web")));

        assert!(!waiting.unregister(&key("web"), ticket));
        assert_eq!(rx.try_recv().unwrap(), WaitSignal::Withdraw);
    }

    #[test]
    fn keys_are_sorted() {
        let waiting = WaitingPods::new();
        let _b = waiting.register(key("b"));
        let (a, _rx) = waiting.register(key("a"));
        assert_eq!(waiting.keys(), vec![key("a"), key("b")]);
        assert!(waiting.unregister(&key("a"), a));
        assert!(!waiting.unregister(&key("a"), a));
    }
}
