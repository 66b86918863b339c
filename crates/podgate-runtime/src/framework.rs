//! Stage orchestration.
//!
//! A [`Framework`] holds the configured plugins and runs one extension point
//! at a time across all of them. [`Framework::schedule`] drives the
//! scheduling cycle (PreFilter through Permit); the binding-cycle stages are
//! exposed individually so the scheduler can suspend between them.
//!
//! Merging rules when several plugins are enabled:
//!
//! - PreFilter, Filter, PreBind: the first status that is neither Success
//!   nor Skip decides.
//! - Score: each plugin's scores are normalized on their own, multiplied by
//!   the plugin weight, and summed per node. A plugin that skips every node
//!   takes no part. The highest total wins; ties go to the smaller node name.
//! - Permit: any rejection rejects; otherwise the longest Wait wins.
//! - Bind: plugins are asked in order until one does not Skip.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use podgate_framework::{
    Code, CycleState, Handle, NodeInfo, NodeName, NodeScore, NodeToStatus, Plugin, Pod, Registry,
    Snapshot, Status,
};

use crate::config::SchedulerConfig;
use crate::error::RuntimeResult;
use crate::parallel::parallelize;

struct WeightedPlugin {
    plugin: Arc<dyn Plugin>,
    weight: i64,
}

/// What Permit asked the runtime to do with the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermitVerdict {
    Allow,
    /// Suspend, then evaluate Permit again (or sooner on an external signal).
    ResumeAfter(Duration),
    Reject(Status),
}

/// Result of the scheduling cycle for one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingDecision {
    /// No node can host the pod right now.
    Unschedulable(Status),
    /// A stage errored; the cycle was aborted.
    Failed(Status),
    /// `node` was chosen and reserved; `permit` says how to continue.
    Selected { node: NodeName, permit: PermitVerdict },
}

pub struct Framework {
    plugins: Vec<WeightedPlugin>,
    parallelism: usize,
}

impl Framework {
    /// Build every configured plugin from the registry.
    pub fn new(
        config: &SchedulerConfig,
        registry: &Registry,
        handle: Arc<dyn Handle>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let mut plugins = Vec::with_capacity(config.plugins.len());
        for entry in &config.plugins {
            let plugin = registry.build(&entry.name, &entry.args, Arc::clone(&handle))?;
            info!(plugin = %entry.name, weight = entry.weight, "plugin enabled");
            plugins.push(WeightedPlugin {
                plugin,
                weight: entry.weight,
            });
        }
        Ok(Self {
            plugins,
            parallelism: config.parallelism,
        })
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.plugin.name()).collect()
    }

    /// Run PreFilter through Permit for `pod` against `snapshot`.
    ///
    /// When a node is selected it has already been reserved; the caller owns
    /// the reservation from then on and must either bind or unreserve.
    pub fn schedule(&self, state: &CycleState, pod: &Pod, snapshot: &Snapshot) -> SchedulingDecision {
        let key = pod.key();

        let status = self.run_pre_filter(state, pod);
        if !status.is_success() {
            debug!(pod = %key, %status, "rejected at pre-filter");
            return if status.is_error() {
                SchedulingDecision::Failed(status)
            } else {
                SchedulingDecision::Unschedulable(status)
            };
        }

        let (feasible, filtered) = match self.find_feasible(state, pod, snapshot) {
            Ok(found) => found,
            Err(status) => return SchedulingDecision::Failed(status),
        };

        if feasible.is_empty() {
            let post = self.run_post_filter(state, pod, &filtered);
            if post.is_error() {
                return SchedulingDecision::Failed(post);
            }
            let mut reasons: Vec<String> = filtered
                .values()
                .map(Status::message)
                .collect();
            reasons.sort();
            reasons.dedup();
            if reasons.is_empty() {
                return SchedulingDecision::Unschedulable(Status::unschedulable("no nodes available"));
            }
            return SchedulingDecision::Unschedulable(Status::unschedulable(format!(
                "0/{} nodes are available: {}",
                snapshot.len(),
                reasons.join("; ")
            )));
        }

        let status = self.run_pre_score(state, pod, &feasible);
        if !status.is_success() {
            return SchedulingDecision::Failed(status);
        }

        let totals = match self.prioritize(state, pod, &feasible) {
            Ok(totals) => totals,
            Err(status) => return SchedulingDecision::Failed(status),
        };
        let Some(node) = select_host(&totals) else {
            return SchedulingDecision::Unschedulable(Status::unschedulable("no node scored"));
        };
        debug!(pod = %key, node = %node, candidates = feasible.len(), "node selected");

        let status = self.run_reserve(state, pod, &node);
        if !status.is_success() {
            warn!(pod = %key, node = %node, %status, "reserve failed");
            return if status.is_error() {
                SchedulingDecision::Failed(status)
            } else {
                SchedulingDecision::Unschedulable(status)
            };
        }

        let permit = self.run_permit(state, pod, &node);
        SchedulingDecision::Selected { node, permit }
    }

    // ── Filtering ─────────────────────────────────────────────────

    pub fn run_pre_filter(&self, state: &CycleState, pod: &Pod) -> Status {
        for p in &self.plugins {
            let status = p.plugin.pre_filter(state, pod);
            if !passes(&status) {
                return attribute(status, p.plugin.name());
            }
        }
        Status::success()
    }

    /// Filter every node in parallel. Returns the feasible nodes in snapshot
    /// order plus the rejection per filtered node, or the first Error.
    fn find_feasible<'s>(
        &self,
        state: &CycleState,
        pod: &Pod,
        snapshot: &'s Snapshot,
    ) -> Result<(Vec<&'s NodeInfo>, NodeToStatus), Status> {
        let statuses = parallelize(snapshot.list(), self.parallelism, |info| {
            self.run_filter(state, pod, info)
        });

        let mut feasible = Vec::new();
        let mut filtered = NodeToStatus::new();
        for (info, status) in snapshot.list().iter().zip(statuses) {
            match status.code() {
                Code::Success | Code::Skip => feasible.push(info),
                Code::Error => return Err(status),
                _ => {
                    filtered.insert(info.name().to_string(), status);
                }
            }
        }
        Ok((feasible, filtered))
    }

    fn run_filter(&self, state: &CycleState, pod: &Pod, info: &NodeInfo) -> Status {
        for p in &self.plugins {
            let status = p.plugin.filter(state, pod, info);
            if !passes(&status) {
                return attribute(status, p.plugin.name());
            }
        }
        Status::success()
    }

    fn run_post_filter(&self, state: &CycleState, pod: &Pod, filtered: &NodeToStatus) -> Status {
        let mut result = Status::skip();
        for p in &self.plugins {
            let status = p.plugin.post_filter(state, pod, filtered);
            debug!(pod = %pod.key(), plugin = p.plugin.name(), %status, "post-filter");
            match status.code() {
                Code::Skip => {}
                Code::Error => return attribute(status, p.plugin.name()),
                _ => result = status,
            }
        }
        result
    }

    // ── Scoring ───────────────────────────────────────────────────

    fn run_pre_score(&self, state: &CycleState, pod: &Pod, nodes: &[&NodeInfo]) -> Status {
        for p in &self.plugins {
            let status = p.plugin.pre_score(state, pod, nodes);
            if !passes(&status) {
                return attribute(status, p.plugin.name());
            }
        }
        Status::success()
    }

    /// Weighted, normalized score per feasible node, in the order given.
    pub fn prioritize(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[&NodeInfo],
    ) -> Result<Vec<NodeScore>, Status> {
        let mut totals: Vec<NodeScore> = nodes
            .iter()
            .map(|info| NodeScore::new(info.name(), 0))
            .collect();

        for p in &self.plugins {
            let name = p.plugin.name();
            let raw = parallelize(nodes, self.parallelism, |info| {
                p.plugin.score(state, pod, info)
            });

            let mut scores = Vec::with_capacity(nodes.len());
            let mut skipped = 0;
            for (info, result) in nodes.iter().zip(raw) {
                match result {
                    Ok(score) => scores.push(NodeScore::new(info.name(), score)),
                    Err(status) if status.is_skip() => skipped += 1,
                    Err(status) => return Err(attribute(status, name)),
                }
            }
            if skipped == nodes.len() {
                continue;
            }
            if skipped > 0 {
                return Err(Status::error("plugin skipped scoring for some nodes").with_plugin(name));
            }

            let status = p.plugin.normalize_score(state, pod, &mut scores);
            if !passes(&status) {
                return Err(attribute(status, name));
            }
            if scores.len() != totals.len() || scores.iter().zip(&totals).any(|(s, t)| s.name != t.name) {
                return Err(Status::error("normalize changed the node list").with_plugin(name));
            }

            for (total, score) in totals.iter_mut().zip(&scores) {
                total.score = total.score.saturating_add(score.score.saturating_mul(p.weight));
            }
        }
        Ok(totals)
    }

    // ── Reservation and admission ─────────────────────────────────

    /// Reserve on every plugin. On failure the plugins already reserved are
    /// unreserved before returning.
    pub fn run_reserve(&self, state: &CycleState, pod: &Pod, node: &str) -> Status {
        for (i, p) in self.plugins.iter().enumerate() {
            let status = p.plugin.reserve(state, pod, node);
            if !passes(&status) {
                for done in self.plugins[..=i].iter().rev() {
                    done.plugin.unreserve(state, pod, node);
                }
                return attribute(status, p.plugin.name());
            }
        }
        Status::success()
    }

    /// Undo Reserve, last plugin first. Never fails.
    pub fn run_unreserve(&self, state: &CycleState, pod: &Pod, node: &str) {
        for p in self.plugins.iter().rev() {
            p.plugin.unreserve(state, pod, node);
        }
    }

    pub fn run_permit(&self, state: &CycleState, pod: &Pod, node: &str) -> PermitVerdict {
        let mut wait = None::<Duration>;
        for p in &self.plugins {
            let decision = p.plugin.permit(state, pod, node);
            match decision.code() {
                Code::Success | Code::Skip => {}
                Code::Wait => {
                    wait = Some(wait.map_or(decision.wait, |w| w.max(decision.wait)));
                }
                _ => return PermitVerdict::Reject(attribute(decision.status, p.plugin.name())),
            }
        }
        match wait {
            Some(duration) => PermitVerdict::ResumeAfter(duration),
            None => PermitVerdict::Allow,
        }
    }

    // ── Binding ───────────────────────────────────────────────────

    pub fn run_pre_bind(&self, state: &CycleState, pod: &Pod, node: &str) -> Status {
        for p in &self.plugins {
            let status = p.plugin.pre_bind(state, pod, node);
            if !passes(&status) {
                return attribute(status, p.plugin.name());
            }
        }
        Status::success()
    }

    pub fn run_bind(&self, state: &CycleState, pod: &Pod, node: &str) -> Status {
        for p in &self.plugins {
            let status = p.plugin.bind(state, pod, node);
            if !status.is_skip() {
                return attribute(status, p.plugin.name());
            }
        }
        Status::error("no plugin bound the pod")
    }

    pub fn run_post_bind(&self, state: &CycleState, pod: &Pod, node: &str) {
        for p in &self.plugins {
            p.plugin.post_bind(state, pod, node);
        }
    }
}

fn passes(status: &Status) -> bool {
    matches!(status.code(), Code::Success | Code::Skip)
}

/// Tag a status with the plugin that produced it, unless it already names one.
fn attribute(status: Status, plugin: &str) -> Status {
    if status.plugin().is_some() || status.is_success() {
        status
    } else {
        status.with_plugin(plugin)
    }
}

/// Highest total wins; ties go to the smaller node name.
fn select_host(totals: &[NodeScore]) -> Option<NodeName> {
    totals
        .iter()
        .max_by(|a, b| a.score.cmp(&b.score).then_with(|| b.name.cmp(&a.name)))
        .map(|s| s.name.clone())
}
