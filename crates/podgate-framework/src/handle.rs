//! Host-runtime services handed to plugins at construction.

use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::normalize::ScoreRange;
use crate::snapshot::Snapshot;
use crate::types::PodKey;

/// Errors returned by cluster client operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("pod not found: {0}")]
    PodNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("pod {pod} already bound to {node}")]
    AlreadyBound { pod: String, node: String },

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

/// Write-side cluster operations a plugin may perform.
pub trait ClusterClient: Send + Sync {
    /// Record that `pod` runs on `node`.
    fn bind(&self, pod: &PodKey, node: &str) -> Result<(), ClientError>;

    /// Whether the named claim is ready for use by a pod.
    fn claim_ready(&self, claim: &str) -> Result<bool, ClientError>;
}

/// Services the host runtime exposes to plugins.
pub trait Handle: Send + Sync {
    /// Snapshot of the cycle currently being scheduled.
    fn snapshot(&self) -> Arc<Snapshot>;

    /// Cluster client, if the runtime provides one.
    fn client(&self) -> Option<Arc<dyn ClusterClient>>;

    /// Target range for normalized scores.
    fn score_range(&self) -> ScoreRange;

    fn clock(&self) -> Arc<dyn Clock>;
}
