//! Pending-pod queue.
//!
//! Pops the pod the configured [`QueueSort`] ranks first. Every push assigns
//! a fresh arrival sequence, so requeued pods go behind pods that arrived
//! while they were being scheduled.

use podgate_framework::{Pod, PodKey, QueueSort, QueuedPod};

use crate::error::{RuntimeError, RuntimeResult};

pub struct SchedulingQueue {
    order: Box<dyn QueueSort>,
    pending: Vec<QueuedPod>,
    next_seq: u64,
}

impl SchedulingQueue {
    pub fn new(order: Box<dyn QueueSort>) -> Self {
        Self {
            order,
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn order_name(&self) -> &str {
        self.order.name()
    }

    /// Enqueue a new pod. A pod already waiting in the queue is rejected.
    pub fn push(&mut self, pod: Pod) -> RuntimeResult<()> {
        let key = pod.key();
        if self.contains(&key) {
            return Err(RuntimeError::DuplicatePod(key.to_string()));
        }
        self.enqueue(pod, 0);
        Ok(())
    }

    /// Put a pod back after a failed attempt.
    pub fn requeue(&mut self, pod: Pod, attempts: u32) {
        self.enqueue(pod, attempts);
    }

    fn enqueue(&mut self, pod: Pod, attempts: u32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(QueuedPod { pod, seq, attempts });
    }

    /// Remove and return the highest-priority pod.
    pub fn pop(&mut self) -> Option<QueuedPod> {
        let mut best = 0;
        for i in 1..self.pending.len() {
            if self.order.less(&self.pending[i], &self.pending[best]) {
                best = i;
            }
        }
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.swap_remove(best))
        }
    }

    pub fn remove(&mut self, key: &PodKey) -> Option<QueuedPod> {
        let index = self.pending.iter().position(|q| q.pod.key() == *key)?;
        Some(self.pending.swap_remove(index))
    }

    pub fn contains(&self, key: &PodKey) -> bool {
        self.pending.iter().any(|q| q.pod.key() == *key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podgate_framework::{ArrivalOrder, CreationTimeOrder};

    fn pod(name: &str, created_at_ms: u64) -> Pod {
        Pod {
            namespace: "default".to_string(),
            name: name.to_string(),
            scheduler_name: "memory-aware".to_string(),
            created_at_ms,
            containers: Vec::new(),
            volume_claims: Vec::new(),
            node_name: None,
        }
    }

    fn drain(queue: &mut SchedulingQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.pop().map(|q| q.pod.name)).collect()
    }

    #[test]
    fn creation_time_order_with_stable_ties() {
        let mut queue = SchedulingQueue::new(Box::new(CreationTimeOrder));
        queue.push(pod("young", 300)).unwrap();
        queue.push(pod("tie-a", 100)).unwrap();
        queue.push(pod("tie-b", 100)).unwrap();
        queue.push(pod("old", 50)).unwrap();
        queue.push(pod("tie-c", 100)).unwrap();

        assert_eq!(drain(&mut queue), ["old", "tie-a", "tie-b", "tie-c", "young"]);
    }

    #[test]
    fn arrival_order_is_fifo() {
        let mut queue = SchedulingQueue::new(Box::new(ArrivalOrder));
        queue.push(pod("b", 1)).unwrap();
        queue.push(pod("a", 0)).unwrap();
        queue.push(pod("c", 2)).unwrap();

        assert_eq!(drain(&mut queue), ["b", "a", "c"]);
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut queue = SchedulingQueue::new(Box::new(ArrivalOrder));
        queue.push(pod("a", 0)).unwrap();
        assert!(matches!(
            queue.push(pod("a", 0)),
            Err(RuntimeError::DuplicatePod(_))
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn requeue_goes_behind_later_arrivals() {
        let mut queue = SchedulingQueue::new(Box::new(ArrivalOrder));
        queue.push(pod("a", 0)).unwrap();
        queue.push(pod("b", 0)).unwrap();

        let first = queue.pop().unwrap();
        assert_eq!(first.pod.name, "a");
        queue.requeue(first.pod, 1);

        let next = queue.pop().unwrap();
        assert_eq!(next.pod.name, "b");
        let again = queue.pop().unwrap();
        assert_eq!(again.pod.name, "a");
        assert_eq!(again.attempts, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_by_key() {
        let mut queue = SchedulingQueue::new(Box::new(ArrivalOrder));
        queue.push(pod("a", 0)).unwrap();
        queue.push(pod("b", 0)).unwrap();

        let key = PodKey::new("default", "a");
        assert!(queue.contains(&key));
        assert!(queue.remove(&key).is_some());
        assert!(!queue.contains(&key));
        assert!(queue.remove(&key).is_none());
        assert_eq!(drain(&mut queue), ["b"]);
    }
}
