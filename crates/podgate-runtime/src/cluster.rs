//! In-memory cluster store.
//!
//! Holds the nodes, the pods placed on them, and which volume claims are
//! ready. Pods are placed in two phases: `assume` right after Reserve (so the
//! next snapshot already accounts for them) and `bind` once the binding
//! cycle commits. `forget` drops an assumption when the binding cycle fails.
//!
//! Every mutation bumps a generation counter; the runtime rebuilds its
//! snapshot only when the generation changes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use podgate_framework::{
    ClientError, ClusterClient, Node, NodeInfo, NodeName, Pod, PodKey, Snapshot,
};

use crate::error::RuntimeResult;

/// Nodes, placed pods, pending pods, and ready claims loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterManifest {
    pub nodes: Vec<Node>,
    /// Pods with `node_name` set are already bound; the rest are pending.
    pub pods: Vec<Pod>,
    pub ready_claims: Vec<String>,
}

impl ClusterManifest {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Assumed,
    Bound,
}

#[derive(Debug, Clone)]
struct Placement {
    pod: Pod,
    node: NodeName,
    phase: Phase,
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: BTreeMap<NodeName, Node>,
    placements: HashMap<PodKey, Placement>,
    ready_claims: HashSet<String>,
    generation: u64,
}

/// Shared handle to the cluster. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ClusterStore {
    inner: Arc<RwLock<ClusterState>>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a manifest, returning the pods still pending.
    pub fn from_manifest(manifest: &ClusterManifest) -> RuntimeResult<(Self, Vec<Pod>)> {
        let store = Self::new();
        for node in &manifest.nodes {
            store.add_node(node.clone());
        }
        for claim in &manifest.ready_claims {
            store.set_claim_ready(claim, true);
        }

        let mut pending = Vec::new();
        for pod in &manifest.pods {
            if pod.node_name.is_some() {
                store.add_bound_pod(pod.clone())?;
            } else {
                pending.push(pod.clone());
            }
        }
        Ok((store, pending))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ClusterState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ClusterState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a node.
    pub fn add_node(&self, node: Node) {
        let mut state = self.write();
        debug!(node = %node.name, memory = node.allocatable.memory_bytes, "node added");
        state.nodes.insert(node.name.clone(), node);
        state.generation += 1;
    }

    /// Remove a node together with every pod placed on it.
    pub fn remove_node(&self, name: &str) -> Option<Node> {
        let mut state = self.write();
        let node = state.nodes.remove(name)?;
        state.placements.retain(|_, p| p.node != name);
        state.generation += 1;
        Some(node)
    }

    /// Record a pod that is already running on `pod.node_name`.
    pub fn add_bound_pod(&self, pod: Pod) -> RuntimeResult<()> {
        let node = pod
            .node_name
            .clone()
            .ok_or_else(|| ClientError::NodeNotFound(format!("{} has no node", pod.key())))?;
        let mut state = self.write();
        if !state.nodes.contains_key(&node) {
            return Err(ClientError::NodeNotFound(node).into());
        }
        state.placements.insert(
            pod.key(),
            Placement {
                pod,
                node,
                phase: Phase::Bound,
            },
        );
        state.generation += 1;
        Ok(())
    }

    /// Tentatively place `pod` on `node` ahead of binding.
    pub fn assume(&self, pod: Pod, node: &str) -> RuntimeResult<()> {
        let mut state = self.write();
        if !state.nodes.contains_key(node) {
            return Err(ClientError::NodeNotFound(node.to_string()).into());
        }
        let key = pod.key();
        if let Some(existing) = state.placements.get(&key) {
            if existing.phase == Phase::Bound {
                return Err(ClientError::AlreadyBound {
                    pod: key.to_string(),
                    node: existing.node.clone(),
                }
                .into());
            }
        }
        state.placements.insert(
            key,
            Placement {
                pod,
                node: node.to_string(),
                phase: Phase::Assumed,
            },
        );
        state.generation += 1;
        Ok(())
    }

    /// Drop an assumed placement. Bound pods are left alone.
    pub fn forget(&self, key: &PodKey) -> bool {
        let mut state = self.write();
        let assumed = matches!(
            state.placements.get(key),
            Some(p) if p.phase == Phase::Assumed
        );
        if assumed {
            state.placements.remove(key);
            state.generation += 1;
        }
        assumed
    }

    pub fn set_claim_ready(&self, claim: &str, ready: bool) {
        let mut state = self.write();
        if ready {
            state.ready_claims.insert(claim.to_string());
        } else {
            state.ready_claims.remove(claim);
        }
    }

    /// Node the pod is bound to. Assumed pods are not reported.
    pub fn bound_node(&self, key: &PodKey) -> Option<NodeName> {
        self.read()
            .placements
            .get(key)
            .filter(|p| p.phase == Phase::Bound)
            .map(|p| p.node.clone())
    }

    pub fn is_assumed(&self, key: &PodKey) -> bool {
        matches!(self.read().placements.get(key), Some(p) if p.phase == Phase::Assumed)
    }

    /// All bound pods as (pod, node), sorted by pod.
    pub fn bindings(&self) -> Vec<(PodKey, NodeName)> {
        let mut bindings: Vec<_> = self
            .read()
            .placements
            .iter()
            .filter(|(_, p)| p.phase == Phase::Bound)
            .map(|(k, p)| (k.clone(), p.node.clone()))
            .collect();
        bindings.sort();
        bindings
    }

    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Build an immutable view of every node and the pods placed on it,
    /// assumed pods included.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.read();
        let mut infos: BTreeMap<&str, NodeInfo> = state
            .nodes
            .values()
            .map(|n| (n.name.as_str(), NodeInfo::new(n.clone())))
            .collect();

        let mut placed: Vec<&Placement> = state.placements.values().collect();
        placed.sort_by(|a, b| a.pod.key().cmp(&b.pod.key()));
        for placement in placed {
            if let Some(info) = infos.get_mut(placement.node.as_str()) {
                let mut pod = placement.pod.clone();
                pod.node_name = Some(placement.node.clone());
                info.add_pod(pod);
            }
        }

        Snapshot::new(infos.into_values().collect(), state.generation)
    }
}

impl ClusterClient for ClusterStore {
    fn bind(&self, pod: &PodKey, node: &str) -> Result<(), ClientError> {
        let mut state = self.write();
        if !state.nodes.contains_key(node) {
            return Err(ClientError::NodeNotFound(node.to_string()));
        }
        let placement = state
            .placements
            .get_mut(pod)
            .ok_or_else(|| ClientError::PodNotFound(pod.to_string()))?;
        if placement.phase == Phase::Bound {
            return Err(ClientError::AlreadyBound {
                pod: pod.to_string(),
                node: placement.node.clone(),
            });
        }
        placement.node = node.to_string();
        placement.phase = Phase::Bound;
        placement.pod.node_name = Some(node.to_string());
        state.generation += 1;
        debug!(%pod, node, "binding recorded");
        Ok(())
    }

    fn claim_ready(&self, claim: &str) -> Result<bool, ClientError> {
        Ok(self.read().ready_claims.contains(claim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podgate_framework::{ContainerRequest, Resources};

    fn node(name: &str) -> Node {
        Node::new(name, Resources::new(1024, 4000))
    }

    fn pod(name: &str) -> Pod {
        Pod {
            namespace: "default".to_string(),
            name: name.to_string(),
            scheduler_name: "memory-aware".to_string(),
            created_at_ms: 0,
            containers: vec![ContainerRequest {
                name: "main".to_string(),
                memory_bytes: 128,
                cpu_millis: 100,
            }],
            volume_claims: Vec::new(),
            node_name: None,
        }
    }

    #[test]
    fn assume_then_bind() {
        let store = ClusterStore::new();
        store.add_node(node("n1"));
        let key = PodKey::new("default", "web");

        store.assume(pod("web"), "n1").unwrap();
        assert!(store.is_assumed(&key));
        assert_eq!(store.bound_node(&key), None);
        assert_eq!(store.snapshot().get("n1").unwrap().pod_count(), 1);

        store.bind(&key, "n1").unwrap();
        assert!(!store.is_assumed(&key));
        assert_eq!(store.bound_node(&key), Some("n1".to_string()));
        assert_eq!(store.bindings(), vec![(key, "n1".to_string())]);
    }

    #[test]
    fn forget_drops_only_assumed() {
        let store = ClusterStore::new();
        store.add_node(node("n1"));
        let key = PodKey::new("default", "web");

        store.assume(pod("web"), "n1").unwrap();
        assert!(store.forget(&key));
        assert!(!store.forget(&key));
        assert_eq!(store.snapshot().get("n1").unwrap().pod_count(), 0);

        store.assume(pod("web"), "n1").unwrap();
        store.bind(&key, "n1").unwrap();
        assert!(!store.forget(&key));
        assert_eq!(store.bound_node(&key), Some("n1".to_string()));
    }

    #[test]
    fn bind_errors() {
        let store = ClusterStore::new();
        store.add_node(node("n1"));
        let key = PodKey::new("default", "web");

        assert_eq!(
            store.bind(&key, "ghost"),
            Err(ClientError::NodeNotFound("ghost".to_string()))
        );
        assert!(matches!(store.bind(&key, "n1"), Err(ClientError::PodNotFound(_))));

        store.assume(pod("web"), "n1").unwrap();
        store.bind(&key, "n1").unwrap();
        assert!(matches!(
            store.bind(&key, "n1"),
            Err(ClientError::AlreadyBound { .. })
        ));
        assert!(store.assume(pod("web"), "n1").is_err());
    }

    #[test]
    fn assume_requires_known_node() {
        let store = ClusterStore::new();
        assert!(store.assume(pod("web"), "ghost").is_err());
    }

    #[test]
    fn generation_tracks_mutations() {
        let store = ClusterStore::new();
        assert_eq!(store.generation(), 0);
        store.add_node(node("n1"));
        let after_node = store.generation();
        assert!(after_node > 0);

        store.set_claim_ready("data", true);
        assert_eq!(store.generation(), after_node);

        store.assume(pod("web"), "n1").unwrap();
        assert!(store.generation() > after_node);
        assert_eq!(store.snapshot().generation(), store.generation());
    }

    #[test]
    fn remove_node_drops_its_pods() {
        let store = ClusterStore::new();
        store.add_node(node("n1"));
        store.add_node(node("n2"));
        store.assume(pod("web"), "n1").unwrap();

        assert!(store.remove_node("n1").is_some());
        assert!(store.remove_node("n1").is_none());
        assert_eq!(store.node_count(), 1);
        assert!(!store.is_assumed(&PodKey::new("default", "web")));
    }

    #[test]
    fn claims() {
        let store = ClusterStore::new();
        store.set_claim_ready("data", true);
        assert_eq!(store.claim_ready("data"), Ok(true));
        store.set_claim_ready("data", false);
        assert_eq!(store.claim_ready("data"), Ok(false));
    }

    #[test]
    fn manifest_splits_bound_and_pending() {
        let manifest: ClusterManifest = toml::from_str(
            r#"
ready_claims = ["data"]

[[nodes]]
name = "n1"
allocatable = { memory_bytes = 4096, cpu_millis = 2000 }

[[pods]]
namespace = "default"
name = "running"
scheduler_name = "memory-aware"
created_at_ms = 0
node_name = "n1"

[[pods]]
namespace = "default"
name = "pending"
scheduler_name = "memory-aware"
created_at_ms = 0
containers = [{ name = "main", memory_bytes = 512 }]
"#,
        )
        .unwrap();

        let (store, pending) = ClusterStore::from_manifest(&manifest).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "pending");
        assert_eq!(
            store.bound_node(&PodKey::new("default", "running")),
            Some("n1".to_string())
        );
        assert_eq!(store.claim_ready("data"), Ok(true));
    }

    #[test]
    fn manifest_with_unknown_node_fails() {
        let mut bound = pod("orphan");
        bound.node_name = Some("ghost".to_string());
        let manifest = ClusterManifest {
            nodes: vec![node("n1")],
            pods: vec![bound],
            ready_claims: Vec::new(),
        };
        assert!(ClusterStore::from_manifest(&manifest).is_err());
    }
}
