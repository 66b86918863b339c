//! Ordering hooks for pending pods.
//!
//! The host runtime keeps pending pods in a queue and asks a [`QueueSort`]
//! which one to schedule next. Both orderings here fall back to arrival
//! sequence, so pods that compare equal keep FIFO order.

use crate::types::Pod;

/// A pod waiting in the scheduling queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPod {
    pub pod: Pod,
    /// Monotonic arrival sequence assigned by the queue.
    pub seq: u64,
    /// Scheduling attempts made so far.
    pub attempts: u32,
}

/// Strict-weak ordering over pending pods.
pub trait QueueSort: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `a` should be scheduled before `b`.
    fn less(&self, a: &QueuedPod, b: &QueuedPod) -> bool;
}

/// First in, first out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrivalOrder;

impl QueueSort for ArrivalOrder {
    fn name(&self) -> &str {
        "arrival"
    }

    fn less(&self, a: &QueuedPod, b: &QueuedPod) -> bool {
        a.seq < b.seq
    }
}

/// Earlier creation time first; arrival order breaks ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreationTimeOrder;

impl QueueSort for CreationTimeOrder {
    fn name(&self) -> &str {
        "creation-time"
    }

    fn less(&self, a: &QueuedPod, b: &QueuedPod) -> bool {
        (a.pod.created_at_ms, a.seq) < (b.pod.created_at_ms, b.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(name: &str, created_at_ms: u64, seq: u64) -> QueuedPod {
        QueuedPod {
            pod: Pod {
                namespace: "default".to_string(),
                name: name.to_string(),
                scheduler_name: "memory-aware".to_string(),
                created_at_ms,
                containers: Vec::new(),
                volume_claims: Vec::new(),
                node_name: None,
            },
            seq,
            attempts: 0,
        }
    }

    #[test]
    fn arrival_order_ignores_creation_time() {
        let old = queued("old", 10, 2);
        let young = queued("young", 99, 1);
        assert!(ArrivalOrder.less(&young, &old));
        assert!(!ArrivalOrder.less(&old, &young));
    }

    #[test]
    fn creation_time_prefers_older() {
        let old = queued("old", 10, 2);
        let young = queued("young", 99, 1);
        assert!(CreationTimeOrder.less(&old, &young));
        assert!(!CreationTimeOrder.less(&young, &old));
    }

    #[test]
    fn creation_time_ties_fall_back_to_arrival() {
        let first = queued("first", 50, 1);
        let second = queued("second", 50, 2);
        assert!(CreationTimeOrder.less(&first, &second));
        assert!(!CreationTimeOrder.less(&second, &first));
        assert!(!CreationTimeOrder.less(&first, &first));
    }
}
