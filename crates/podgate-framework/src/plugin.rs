//! The extension-point trait.
//!
//! A plugin is one strategy implementing the full set of extension points.
//! Every method has a default so a plugin only overrides the stages it takes
//! part in; defaults either succeed or return [`Status::skip`] for stages
//! where "not implemented" must be distinguishable (Score, PostFilter, Bind).
//!
//! Plugins are shared across cycles (`Send + Sync`) and per-node stages run
//! concurrently, so implementations must not keep cross-node mutable state
//! outside the [`CycleState`].

use std::collections::HashMap;
use std::time::Duration;

use crate::cycle_state::CycleState;
use crate::normalize::NodeScore;
use crate::snapshot::NodeInfo;
use crate::status::{Code, Status};
use crate::types::{NodeName, Pod};

/// Filter outcome per node, handed to PostFilter.
pub type NodeToStatus = HashMap<NodeName, Status>;

/// Outcome of the Permit stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitDecision {
    pub status: Status,
    /// How long the cycle should be suspended. Zero unless `status` is Wait.
    pub wait: Duration,
}

impl PermitDecision {
    pub fn allow() -> Self {
        Self {
            status: Status::success(),
            wait: Duration::ZERO,
        }
    }

    pub fn wait(duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            status: Status::wait(reason),
            wait: duration,
        }
    }

    pub fn reject(status: Status) -> Self {
        Self {
            status,
            wait: Duration::ZERO,
        }
    }

    pub fn code(&self) -> Code {
        self.status.code()
    }
}

/// A placement strategy plugged into the pipeline.
pub trait Plugin: Send + Sync {
    /// Name used for registration and in status reports.
    fn name(&self) -> &str;

    /// Runs once per cycle before any node is considered.
    fn pre_filter(&self, _state: &CycleState, _pod: &Pod) -> Status {
        Status::success()
    }

    /// Runs once per candidate node, possibly concurrently.
    fn filter(&self, _state: &CycleState, _pod: &Pod, _node: &NodeInfo) -> Status {
        Status::success()
    }

    /// Runs only when no node survived Filter.
    fn post_filter(&self, _state: &CycleState, _pod: &Pod, _filtered: &NodeToStatus) -> Status {
        Status::skip()
    }

    /// Runs once over all feasible nodes before scoring.
    fn pre_score(&self, _state: &CycleState, _pod: &Pod, _nodes: &[&NodeInfo]) -> Status {
        Status::success()
    }

    /// Raw score for one feasible node, taken from the cycle's snapshot.
    /// `Err(Status::skip())` means the plugin does not score.
    fn score(&self, _state: &CycleState, _pod: &Pod, _node: &NodeInfo) -> Result<i64, Status> {
        Err(Status::skip())
    }

    /// Rescale this plugin's raw scores in place. Must not reorder or
    /// rename entries.
    fn normalize_score(&self, _state: &CycleState, _pod: &Pod, _scores: &mut [NodeScore]) -> Status {
        Status::success()
    }

    /// Provisionally commit resources on the selected node. Must be undoable
    /// by [`Plugin::unreserve`].
    fn reserve(&self, _state: &CycleState, _pod: &Pod, _node_name: &str) -> Status {
        Status::success()
    }

    /// Undo [`Plugin::reserve`]. Best effort: never fails.
    fn unreserve(&self, _state: &CycleState, _pod: &Pod, _node_name: &str) {}

    /// Approve, delay, or deny the binding.
    fn permit(&self, _state: &CycleState, _pod: &Pod, _node_name: &str) -> PermitDecision {
        PermitDecision::allow()
    }

    fn pre_bind(&self, _state: &CycleState, _pod: &Pod, _node_name: &str) -> Status {
        Status::success()
    }

    /// Record the assignment. Return [`Status::skip`] to let another plugin bind.
    fn bind(&self, _state: &CycleState, _pod: &Pod, _node_name: &str) -> Status {
        Status::skip()
    }

    /// Notification after a successful bind.
    fn post_bind(&self, _state: &CycleState, _pod: &Pod, _node_name: &str) {}
}
