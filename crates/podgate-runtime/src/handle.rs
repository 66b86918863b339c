//! The [`Handle`] implementation the runtime gives to plugins.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use podgate_framework::{Clock, ClusterClient, Handle, ScoreRange, Snapshot};

use crate::cluster::ClusterStore;

pub struct RuntimeHandle {
    snapshot: RwLock<Arc<Snapshot>>,
    cluster: ClusterStore,
    score_range: ScoreRange,
    clock: Arc<dyn Clock>,
}

impl RuntimeHandle {
    pub fn new(cluster: ClusterStore, score_range: ScoreRange, clock: Arc<dyn Clock>) -> Self {
        let snapshot = Arc::new(cluster.snapshot());
        Self {
            snapshot: RwLock::new(snapshot),
            cluster,
            score_range,
            clock,
        }
    }

    /// Rebuild the snapshot if the cluster changed since the last one.
    /// Returns the snapshot the next cycle should use.
    pub fn refresh(&self) -> Arc<Snapshot> {
        let generation = self.cluster.generation();
        {
            let current = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            if current.generation() == generation {
                return Arc::clone(&current);
            }
        }

        let fresh = Arc::new(self.cluster.snapshot());
        trace!(generation = fresh.generation(), nodes = fresh.len(), "snapshot rebuilt");
        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::clone(&fresh);
        fresh
    }
}

impl Handle for RuntimeHandle {
    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn client(&self) -> Option<Arc<dyn ClusterClient>> {
        Some(Arc::new(self.cluster.clone()))
    }

    fn score_range(&self) -> ScoreRange {
        self.score_range
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podgate_framework::{Node, Resources, SystemClock};

    #[test]
    fn refresh_reuses_unchanged_snapshot() {
        let cluster = ClusterStore::new();
        cluster.add_node(Node::new("n1", Resources::new(1024, 1000)));
        let handle = RuntimeHandle::new(cluster.clone(), ScoreRange::default(), Arc::new(SystemClock));

        let first = handle.refresh();
        let second = handle.refresh();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);

        cluster.add_node(Node::new("n2", Resources::new(1024, 1000)));
        let third = handle.refresh();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(third.len(), 2);
        assert!(Arc::ptr_eq(&handle.snapshot(), &third));
    }

    #[test]
    fn client_writes_through_to_cluster() {
        let cluster = ClusterStore::new();
        let handle = RuntimeHandle::new(cluster.clone(), ScoreRange::default(), Arc::new(SystemClock));
        cluster.set_claim_ready("data", true);
        let client = handle.client().unwrap();
        assert_eq!(client.claim_ready("data"), Ok(true));
    }
}
