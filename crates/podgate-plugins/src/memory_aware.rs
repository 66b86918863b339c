//! Memory-aware placement plugin.
//!
//! Implements every extension point:
//!
//! - **PreFilter** — fast-reject pods whose scheduler name is not this
//!   plugin's name; otherwise aggregate memory requests into cycle state.
//! - **Filter** — reject nodes whose allocatable memory is below the pod's
//!   largest single container request (equal passes; no requests always pass).
//! - **PostFilter** — release the PreFilter state and give up on the cycle.
//! - **Score** — number of pods already on the node, normalized onto the
//!   configured score range.
//! - **Reserve / Unreserve** — record / drop the pod's memory in a ledger.
//! - **Permit** — hold pods younger than the threshold for the remaining time.
//! - **PreBind** — every volume claim the pod lists must be ready.
//! - **Bind** — write the assignment through the cluster client.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use podgate_framework::{
    Clock, ClusterClient, CycleState, FrameworkError, FrameworkResult, Handle, NodeInfo,
    NodeScore, NodeToStatus, PermitDecision, Plugin, PluginArgs, Pod, ScoreNormalizer, StateKey,
    Status,
};

use crate::reservation::ReservationLedger;

/// Default registration name, also the scheduler name pods opt into.
pub const NAME: &str = "memory-aware";

/// Pods younger than this are held at Permit.
pub const DEFAULT_PERMIT_THRESHOLD_SECS: u64 = 360;

/// Cycle state written by PreFilter.
pub const PRE_FILTER_STATE: StateKey<PreFilterState> = StateKey::new("PreFilter/memory-aware");

/// Per-cycle memory aggregates for the pod being scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreFilterState {
    pub total_memory_bytes: u64,
    pub max_container_memory_bytes: u64,
}

impl PreFilterState {
    fn for_pod(pod: &Pod) -> Self {
        Self {
            total_memory_bytes: pod.total_memory_bytes(),
            max_container_memory_bytes: pod.max_container_memory_bytes(),
        }
    }
}

/// Plugin arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryAwareArgs {
    pub permit_threshold_secs: u64,
}

impl Default for MemoryAwareArgs {
    fn default() -> Self {
        Self {
            permit_threshold_secs: DEFAULT_PERMIT_THRESHOLD_SECS,
        }
    }
}

impl MemoryAwareArgs {
    /// Decode from opaque plugin args. `null` yields the defaults.
    pub fn from_plugin_args(plugin: &str, args: &PluginArgs) -> FrameworkResult<Self> {
        if args.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(args.clone()).map_err(|e| FrameworkError::InvalidArgs {
            plugin: plugin.to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct MemoryAware {
    name: String,
    client: Arc<dyn ClusterClient>,
    clock: Arc<dyn Clock>,
    normalizer: ScoreNormalizer,
    permit_threshold: Duration,
    reservations: ReservationLedger,
}

impl MemoryAware {
    /// Build the plugin. Fails if the runtime provides no cluster client.
    pub fn new(name: &str, args: MemoryAwareArgs, handle: Arc<dyn Handle>) -> FrameworkResult<Self> {
        let client = handle
            .client()
            .ok_or(FrameworkError::MissingService("cluster client"))?;
        let range = handle.score_range();
        range.validate()?;

        Ok(Self {
            name: name.to_string(),
            clock: handle.clock(),
            normalizer: ScoreNormalizer::new(range),
            permit_threshold: Duration::from_secs(args.permit_threshold_secs),
            reservations: ReservationLedger::new(),
            client,
        })
    }

    pub fn permit_threshold(&self) -> Duration {
        self.permit_threshold
    }

    pub fn reservations(&self) -> &ReservationLedger {
        &self.reservations
    }

    fn status(&self, status: Status) -> Status {
        status.with_plugin(&self.name)
    }
}

/// Registry factory for [`MemoryAware`].
pub fn factory(
    name: &str,
    args: &PluginArgs,
    handle: Arc<dyn Handle>,
) -> FrameworkResult<Arc<dyn Plugin>> {
    let args = MemoryAwareArgs::from_plugin_args(name, args)?;
    Ok(Arc::new(MemoryAware::new(name, args, handle)?))
}

impl Plugin for MemoryAware {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status {
        if pod.scheduler_name != self.name {
            debug!(
                pod = %pod.key(),
                scheduler = %pod.scheduler_name,
                "pod did not opt into this scheduler"
            );
            return self.status(Status::unschedulable(format!(
                "pod requests scheduler {:?}",
                pod.scheduler_name
            )));
        }

        let aggregate = PreFilterState::for_pod(pod);
        debug!(
            pod = %pod.key(),
            total_memory = aggregate.total_memory_bytes,
            max_container_memory = aggregate.max_container_memory_bytes,
            "pre-filter state computed"
        );
        state.write(PRE_FILTER_STATE, aggregate);
        Status::success()
    }

    fn filter(&self, state: &CycleState, pod: &Pod, node: &NodeInfo) -> Status {
        let aggregate = match state.read(PRE_FILTER_STATE) {
            Ok(a) => a,
            Err(e) => return self.status(Status::error(format!("reading pre-filter state: {e}"))),
        };

        let allocatable = node.allocatable().memory_bytes;
        if allocatable < aggregate.max_container_memory_bytes {
            debug!(
                pod = %pod.key(),
                node = node.name(),
                allocatable,
                required = aggregate.max_container_memory_bytes,
                "node rejected"
            );
            return self.status(Status::unschedulable(format!(
                "insufficient memory: allocatable {allocatable} < container request {}",
                aggregate.max_container_memory_bytes
            )));
        }
        Status::success()
    }

    fn post_filter(&self, state: &CycleState, pod: &Pod, filtered: &NodeToStatus) -> Status {
        if state.delete(PRE_FILTER_STATE) {
            info!(
                pod = %pod.key(),
                rejected_nodes = filtered.len(),
                "no node fits, pre-filter state released"
            );
            return self.status(Status::unschedulable("no node can host the pod"));
        }
        Status::success()
    }

    fn pre_score(&self, _state: &CycleState, pod: &Pod, nodes: &[&NodeInfo]) -> Status {
        debug!(pod = %pod.key(), candidates = nodes.len(), "scoring candidates");
        Status::success()
    }

    fn score(&self, _state: &CycleState, _pod: &Pod, node: &NodeInfo) -> Result<i64, Status> {
        Ok(node.pod_count() as i64)
    }

    fn normalize_score(&self, _state: &CycleState, _pod: &Pod, scores: &mut [NodeScore]) -> Status {
        self.normalizer.normalize(scores);
        Status::success()
    }

    fn reserve(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Status {
        let memory = state
            .read(PRE_FILTER_STATE)
            .map(|a| a.total_memory_bytes)
            .unwrap_or_else(|_| pod.total_memory_bytes());

        if let Some(previous) = self.reservations.reserve(pod.key(), node_name, memory) {
            warn!(pod = %pod.key(), previous = %previous.node, "replaced stale reservation");
        }
        debug!(pod = %pod.key(), node = node_name, memory, "memory reserved");
        Status::success()
    }

    fn unreserve(&self, _state: &CycleState, pod: &Pod, node_name: &str) {
        match self.reservations.release(&pod.key()) {
            Some(r) => info!(
                pod = %pod.key(),
                node = %r.node,
                memory = r.memory_bytes,
                "reservation released"
            ),
            None => debug!(pod = %pod.key(), node = node_name, "nothing reserved to release"),
        }
    }

    fn permit(&self, _state: &CycleState, pod: &Pod, node_name: &str) -> PermitDecision {
        let elapsed = Duration::from_millis(self.clock.now_ms().saturating_sub(pod.created_at_ms));
        if elapsed < self.permit_threshold {
            let remaining = self.permit_threshold - elapsed;
            debug!(
                pod = %pod.key(),
                node = node_name,
                elapsed_ms = elapsed.as_millis() as u64,
                wait_ms = remaining.as_millis() as u64,
                "pod too young, holding"
            );
            return PermitDecision {
                status: self.status(Status::wait("pod younger than admission threshold")),
                wait: remaining,
            };
        }
        PermitDecision::allow()
    }

    fn pre_bind(&self, _state: &CycleState, pod: &Pod, node_name: &str) -> Status {
        for claim in &pod.volume_claims {
            match self.client.claim_ready(claim) {
                Ok(true) => {}
                Ok(false) => {
                    return self.status(Status::error(format!("claim {claim} is not ready")));
                }
                Err(e) => {
                    return self.status(Status::error(format!("checking claim {claim}: {e}")));
                }
            }
        }
        debug!(pod = %pod.key(), node = node_name, claims = pod.volume_claims.len(), "pre-bind checks passed");
        Status::success()
    }

    fn bind(&self, _state: &CycleState, pod: &Pod, node_name: &str) -> Status {
        let key = pod.key();
        if let Err(e) = self.client.bind(&key, node_name) {
            return self.status(Status::error(format!("binding to {node_name}: {e}")));
        }
        // The binding now carries the memory; the provisional entry is done.
        self.reservations.release(&key);
        Status::success()
    }

    fn post_bind(&self, _state: &CycleState, pod: &Pod, node_name: &str) {
        info!(pod = %pod.key(), node = node_name, "pod bound");
    }
}
