//! Immutable per-cycle view of the cluster.
//!
//! The host runtime builds a [`Snapshot`] between cycles and shares it as an
//! `Arc<Snapshot>`. Nothing in this module offers mutation once the snapshot
//! is built, so every stage of one cycle observes the same cluster view.

use std::collections::HashMap;

use crate::types::{Node, Pod, PodKey, Resources};

/// A node plus the pods currently bound (or assumed) on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    node: Node,
    pods: Vec<Pod>,
    requested: Resources,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            pods: Vec::new(),
            requested: Resources::default(),
        }
    }

    /// Builder-style helper used while assembling a snapshot.
    pub fn with_pods(mut self, pods: impl IntoIterator<Item = Pod>) -> Self {
        for pod in pods {
            self.add_pod(pod);
        }
        self
    }

    pub fn add_pod(&mut self, pod: Pod) {
        self.requested.memory_bytes = self
            .requested
            .memory_bytes
            .saturating_add(pod.total_memory_bytes());
        self.requested.cpu_millis = self
            .requested
            .cpu_millis
            .saturating_add(pod.total_cpu_millis());
        self.pods.push(pod);
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    pub fn has_pod(&self, key: &PodKey) -> bool {
        self.pods.iter().any(|p| p.key() == *key)
    }

    /// Sum of requests of all pods on this node.
    pub fn requested(&self) -> Resources {
        self.requested
    }

    pub fn allocatable(&self) -> Resources {
        self.node.allocatable
    }
}

/// A consistent, cycle-scoped collection of nodes.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    nodes: Vec<NodeInfo>,
    index: HashMap<String, usize>,
    generation: u64,
}

impl Snapshot {
    /// Build a snapshot. Nodes are kept sorted by name so per-node stages
    /// see them in a stable order.
    pub fn new(mut nodes: Vec<NodeInfo>, generation: u64) -> Self {
        nodes.sort_by(|a, b| a.name().cmp(b.name()));
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name().to_string(), i))
            .collect();
        Self {
            nodes,
            index,
            generation,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn list(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Cluster generation this snapshot was taken at.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContainerRequest;

    fn pod(name: &str, memory: u64) -> Pod {
        Pod {
            namespace: "default".to_string(),
            name: name.to_string(),
            scheduler_name: "memory-aware".to_string(),
            created_at_ms: 0,
            containers: vec![ContainerRequest {
                name: "main".to_string(),
                memory_bytes: memory,
                cpu_millis: 250,
            }],
            volume_claims: Vec::new(),
            node_name: None,
        }
    }

    #[test]
    fn node_info_tracks_requested_resources() {
        let info = NodeInfo::new(Node::new("n1", Resources::new(1024, 4000)))
            .with_pods([pod("a", 128), pod("b", 256)]);

        assert_eq!(info.pod_count(), 2);
        assert_eq!(info.requested(), Resources::new(384, 500));
        assert!(info.has_pod(&PodKey::new("default", "a")));
        assert!(!info.has_pod(&PodKey::new("default", "c")));
    }

    #[test]
    fn snapshot_sorts_and_indexes_nodes() {
        let snapshot = Snapshot::new(
            vec![
                NodeInfo::new(Node::new("n3", Resources::default())),
                NodeInfo::new(Node::new("n1", Resources::default())),
                NodeInfo::new(Node::new("n2", Resources::default())),
            ],
            7,
        );

        let names: Vec<_> = snapshot.list().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["n1", "n2", "n3"]);
        assert_eq!(snapshot.get("n2").map(|n| n.name()), Some("n2"));
        assert!(snapshot.get("missing").is_none());
        assert_eq!(snapshot.generation(), 7);
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = Snapshot::empty();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }
}
