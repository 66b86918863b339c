//! Domain types for the placement pipeline.
//!
//! These types describe the workload units being placed (pods) and the
//! execution hosts they are placed on (nodes). All types are serializable
//! so the host runtime can load them from manifests and report on them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the cluster.
pub type NodeName = String;

// ── Pod ───────────────────────────────────────────────────────────

/// Namespace-scoped identity of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Resource request of a single sub-component (container) of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub name: String,
    /// Requested memory in bytes.
    #[serde(default)]
    pub memory_bytes: u64,
    /// Requested CPU in millicores.
    #[serde(default)]
    pub cpu_millis: u32,
}

/// A schedulable workload unit.
///
/// Immutable for the duration of one scheduling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    /// Name of the scheduler (plugin) this pod opted into.
    pub scheduler_name: String,
    /// Unix timestamp (milliseconds) when this pod was created.
    pub created_at_ms: u64,
    /// Ordered per-container resource requests.
    #[serde(default)]
    pub containers: Vec<ContainerRequest>,
    /// Claims that must be ready before the pod can be bound.
    #[serde(default)]
    pub volume_claims: Vec<String>,
    /// Node this pod is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<NodeName>,
}

impl Pod {
    pub fn key(&self) -> PodKey {
        PodKey::new(&self.namespace, &self.name)
    }

    /// Sum of memory requests across all containers.
    pub fn total_memory_bytes(&self) -> u64 {
        self.containers
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.memory_bytes))
    }

    /// Largest single-container memory request, 0 if the pod has none.
    pub fn max_container_memory_bytes(&self) -> u64 {
        self.containers
            .iter()
            .map(|c| c.memory_bytes)
            .max()
            .unwrap_or(0)
    }

    /// Sum of CPU requests across all containers.
    pub fn total_cpu_millis(&self) -> u32 {
        self.containers
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.cpu_millis))
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A pair of resource quantities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub cpu_millis: u32,
}

impl Resources {
    pub fn new(memory_bytes: u64, cpu_millis: u32) -> Self {
        Self {
            memory_bytes,
            cpu_millis,
        }
    }
}

/// An execution host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,
    /// Capacity available to pods on this node.
    pub allocatable: Resources,
}

impl Node {
    pub fn new(name: impl Into<String>, allocatable: Resources) -> Self {
        Self {
            name: name.into(),
            allocatable,
        }
    }
}
