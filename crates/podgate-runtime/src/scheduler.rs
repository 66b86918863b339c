//! The scheduling executor.
//!
//! Pods are taken from the queue one at a time. The scheduling cycle
//! (PreFilter through Permit) runs on the blocking pool against the current
//! snapshot. A selected pod is assumed onto its node and handed to a
//! binding task; binding tasks run concurrently, so a pod suspended at
//! Permit holds a timer and a one-shot receiver, never a thread.
//!
//! Every binding task ends in exactly one of two ways: the pod is bound, or
//! its reservation is released (Unreserve, then the assumption is
//! forgotten). Release happens in one place, once.
//!
//! A pod key is in flight from `submit` until its final report. Submitting
//! it again meanwhile, or after it was bound, is refused.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use podgate_framework::{
    ClientError, Clock, CycleState, Handle, Pod, PodKey, QueuedPod, Registry, Status,
};

use crate::cluster::ClusterStore;
use crate::config::SchedulerConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::framework::{Framework, PermitVerdict, SchedulingDecision};
use crate::handle::RuntimeHandle;
use crate::queue::SchedulingQueue;
use crate::waiting::{WaitSignal, WaitTicket, WaitingPods};

// ── Outcomes ──────────────────────────────────────────────────────

/// How one attempt at placing a pod ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Bound { node: String },
    Unschedulable { reason: String },
    Failed { reason: String },
    /// Denied at Permit, by a plugin or an external signal.
    Rejected { reason: String },
    Withdrawn,
}

impl CycleOutcome {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Unschedulable { .. } | CycleOutcome::Failed { .. }
        )
    }

    fn unschedulable(status: &Status) -> Self {
        CycleOutcome::Unschedulable {
            reason: status.to_string(),
        }
    }

    fn failed(status: &Status) -> Self {
        CycleOutcome::Failed {
            reason: status.to_string(),
        }
    }
}

/// Final outcome for a pod, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub pod: PodKey,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    pub attempts: u32,
}

/// One finished attempt, before the retry policy is applied.
struct Attempt {
    pod: Pod,
    claim: Claim,
    previous_attempts: u32,
    outcome: CycleOutcome,
}

enum Step {
    Done(Attempt),
    Binding(BindingCycle),
}

// ── In-flight keys ────────────────────────────────────────────────

#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<PodKey>>>);

impl InFlight {
    fn insert(&self, key: PodKey) -> bool {
        self.lock().insert(key)
    }

    fn remove(&self, key: &PodKey) -> bool {
        self.lock().remove(key)
    }

    fn claim(&self, key: PodKey) -> Claim {
        Claim {
            key,
            in_flight: self.clone(),
            requeued: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PodKey>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a popped pod's key in flight. Dropping it frees the key, so a
/// binding task that dies still lets the pod be submitted again.
struct Claim {
    key: PodKey,
    in_flight: InFlight,
    requeued: bool,
}

impl Claim {
    /// The pod goes back to the queue and keeps its key.
    fn requeue(mut self) {
        self.requeued = true;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.requeued {
            self.in_flight.remove(&self.key);
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────────

pub struct Scheduler {
    framework: Arc<Framework>,
    cluster: ClusterStore,
    handle: Arc<RuntimeHandle>,
    queue: Mutex<SchedulingQueue>,
    in_flight: InFlight,
    waiting: Arc<WaitingPods>,
    wakeup: Notify,
    max_attempts: u32,
    permit_max_rounds: u32,
}

impl Scheduler {
    pub fn new(
        config: &SchedulerConfig,
        registry: &Registry,
        cluster: ClusterStore,
        clock: Arc<dyn Clock>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let handle = Arc::new(RuntimeHandle::new(cluster.clone(), config.score_range, clock));
        let plugin_handle: Arc<dyn Handle> = handle.clone();
        let framework = Framework::new(config, registry, plugin_handle)?;
        let queue = SchedulingQueue::new(config.queue_order.build());

        info!(
            plugins = ?framework.plugin_names(),
            queue_order = queue.order_name(),
            parallelism = config.parallelism,
            "scheduler ready"
        );

        Ok(Self {
            framework: Arc::new(framework),
            cluster,
            handle,
            queue: Mutex::new(queue),
            in_flight: InFlight::default(),
            waiting: Arc::new(WaitingPods::new()),
            wakeup: Notify::new(),
            max_attempts: config.max_attempts,
            permit_max_rounds: config.permit_max_rounds,
        })
    }

    pub fn cluster(&self) -> &ClusterStore {
        &self.cluster
    }

    /// Queue a pod for scheduling. Fails if the pod is already bound or
    /// still queued, scheduling, waiting or binding.
    pub fn submit(&self, pod: Pod) -> RuntimeResult<()> {
        let key = pod.key();
        if let Some(node) = self.cluster.bound_node(&key) {
            return Err(ClientError::AlreadyBound {
                pod: key.to_string(),
                node,
            }
            .into());
        }
        if !self.in_flight.insert(key.clone()) {
            return Err(RuntimeError::DuplicatePod(key.to_string()));
        }
        if let Err(e) = self.queue().push(pod) {
            self.in_flight.remove(&key);
            return Err(e);
        }
        debug!(pod = %key, "pod submitted");
        self.wakeup.notify_one();
        Ok(())
    }

    /// Cancel a pod. A queued pod is dropped; a pod waiting at Permit is
    /// released and reported as withdrawn. Returns whether either applied.
    pub fn withdraw(&self, key: &PodKey) -> bool {
        let queued = self.queue().remove(key);
        if queued.is_some() {
            self.in_flight.remove(key);
            info!(pod = %key, "queued pod withdrawn");
            return true;
        }
        self.waiting.withdraw(key)
    }

    /// Let a pod waiting at Permit proceed to binding now.
    pub fn allow(&self, key: &PodKey) -> bool {
        self.waiting.allow(key)
    }

    /// Deny a pod waiting at Permit.
    pub fn reject(&self, key: &PodKey, reason: impl Into<String>) -> bool {
        self.waiting.reject(key, reason)
    }

    pub fn is_waiting(&self, key: &PodKey) -> bool {
        self.waiting.contains(key)
    }

    pub fn waiting_pods(&self) -> Vec<PodKey> {
        self.waiting.keys()
    }

    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    fn queue(&self) -> MutexGuard<'_, SchedulingQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule until the queue is empty and every binding task finished.
    /// Returns the final report for every pod, in completion order.
    pub async fn run_until_idle(&self) -> Vec<CycleReport> {
        let mut tasks = JoinSet::new();
        let mut reports = Vec::new();

        loop {
            loop {
                let next = self.queue().pop();
                let Some(queued) = next else { break };
                if let Some(report) = self.dispatch(queued, &mut tasks).await {
                    reports.push(report);
                }
                while let Some(joined) = tasks.try_join_next() {
                    reports.extend(self.finish(joined));
                }
            }

            match tasks.join_next().await {
                Some(joined) => reports.extend(self.finish(joined)),
                None => break,
            }
        }
        reports
    }

    /// Schedule until `shutdown` fires, sending each final report.
    ///
    /// On shutdown every pod waiting at Permit is withdrawn and the binding
    /// tasks are drained before returning. Pods still queued stay queued.
    pub async fn run(
        &self,
        reports: mpsc::UnboundedSender<CycleReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("scheduler started");
        let mut tasks = JoinSet::new();

        loop {
            loop {
                let next = self.queue().pop();
                let Some(queued) = next else { break };
                if let Some(report) = self.dispatch(queued, &mut tasks).await {
                    let _ = reports.send(report);
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.wakeup.notified() => {}
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Some(report) = self.finish(joined) {
                        let _ = reports.send(report);
                    }
                }
            }
        }

        info!(waiting = self.waiting.len(), running = tasks.len(), "scheduler shutting down");
        for key in self.waiting.keys() {
            self.waiting.withdraw(&key);
        }
        while let Some(joined) = tasks.join_next().await {
            if let Some(report) = self.finish(joined) {
                let _ = reports.send(report);
            }
        }
    }

    async fn dispatch(
        &self,
        queued: QueuedPod,
        tasks: &mut JoinSet<Attempt>,
    ) -> Option<CycleReport> {
        match self.schedule_one(queued).await {
            Step::Done(attempt) => self.settle(attempt),
            Step::Binding(cycle) => {
                tasks.spawn(cycle.run());
                None
            }
        }
    }

    /// Run the scheduling cycle for one pod.
    async fn schedule_one(&self, queued: QueuedPod) -> Step {
        let QueuedPod { pod, attempts, .. } = queued;
        let key = pod.key();
        let snapshot = self.handle.refresh();
        debug!(pod = %key, attempt = attempts + 1, generation = snapshot.generation(), "scheduling cycle started");

        let framework = Arc::clone(&self.framework);
        let cycle_pod = pod.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let state = CycleState::new();
            let decision = framework.schedule(&state, &cycle_pod, &snapshot);
            (state, decision)
        })
        .await;

        let done = |outcome| {
            Step::Done(Attempt {
                pod: pod.clone(),
                claim: self.in_flight.claim(key.clone()),
                previous_attempts: attempts,
                outcome,
            })
        };

        let (state, decision) = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(pod = %key, error = %e, "scheduling cycle panicked");
                return done(CycleOutcome::Failed {
                    reason: format!("scheduling cycle aborted: {e}"),
                });
            }
        };

        match decision {
            SchedulingDecision::Unschedulable(status) => {
                info!(pod = %key, %status, "pod unschedulable");
                done(CycleOutcome::unschedulable(&status))
            }
            SchedulingDecision::Failed(status) => {
                warn!(pod = %key, %status, "scheduling cycle failed");
                done(CycleOutcome::failed(&status))
            }
            SchedulingDecision::Selected { node, permit } => {
                if let Err(e) = self.cluster.assume(pod.clone(), &node) {
                    warn!(pod = %key, node = %node, error = %e, "assume failed");
                    self.framework.run_unreserve(&state, &pod, &node);
                    return done(CycleOutcome::Failed {
                        reason: format!("assuming pod on {node}: {e}"),
                    });
                }

                // Register before the task starts so early signals are kept.
                let registration = matches!(permit, PermitVerdict::ResumeAfter(_))
                    .then(|| self.waiting.register(key.clone()));

                Step::Binding(BindingCycle {
                    framework: Arc::clone(&self.framework),
                    cluster: self.cluster.clone(),
                    waiting: Arc::clone(&self.waiting),
                    claim: self.in_flight.claim(key),
                    state,
                    pod,
                    node,
                    permit,
                    registration,
                    previous_attempts: attempts,
                    permit_max_rounds: self.permit_max_rounds,
                })
            }
        }
    }

    fn finish(&self, joined: Result<Attempt, JoinError>) -> Option<CycleReport> {
        match joined {
            Ok(attempt) => self.settle(attempt),
            Err(e) => {
                error!(error = %e, "binding task failed");
                None
            }
        }
    }

    /// Apply the retry policy. Returns the report once the outcome is final.
    fn settle(&self, attempt: Attempt) -> Option<CycleReport> {
        let Attempt {
            pod,
            claim,
            previous_attempts,
            outcome,
        } = attempt;
        let attempts = previous_attempts + 1;
        let key = pod.key();

        if outcome.is_retryable() && attempts < self.max_attempts {
            debug!(pod = %key, attempts, "requeueing pod");
            self.queue().requeue(pod, attempts);
            claim.requeue();
            return None;
        }

        drop(claim);
        Some(CycleReport {
            pod: key,
            outcome,
            attempts,
        })
    }
}

// ── Binding cycle ─────────────────────────────────────────────────

struct BindingCycle {
    framework: Arc<Framework>,
    cluster: ClusterStore,
    waiting: Arc<WaitingPods>,
    claim: Claim,
    state: CycleState,
    pod: Pod,
    node: String,
    permit: PermitVerdict,
    registration: Option<(WaitTicket, oneshot::Receiver<WaitSignal>)>,
    previous_attempts: u32,
    permit_max_rounds: u32,
}

impl BindingCycle {
    async fn run(mut self) -> Attempt {
        let outcome = match self.await_permit().await {
            Ok(()) => self.bind(),
            Err(outcome) => outcome,
        };

        if !matches!(outcome, CycleOutcome::Bound { .. }) {
            self.release(&outcome);
        }

        Attempt {
            pod: self.pod,
            claim: self.claim,
            previous_attempts: self.previous_attempts,
            outcome,
        }
    }

    /// Resolve Permit, suspending on timers and external signals. The pod
    /// stops being signalable before this returns.
    async fn await_permit(&mut self) -> Result<(), CycleOutcome> {
        let key = self.pod.key();
        let mut verdict = self.permit.clone();
        let mut rounds = 0;

        let resolved = loop {
            let wait = match verdict {
                PermitVerdict::Allow => break Ok(()),
                PermitVerdict::Reject(status) => {
                    break Err(CycleOutcome::Rejected {
                        reason: status.to_string(),
                    });
                }
                PermitVerdict::ResumeAfter(wait) => wait,
            };

            rounds += 1;
            if rounds > self.permit_max_rounds {
                break Err(CycleOutcome::Rejected {
                    reason: format!("still waiting at permit after {} rounds", self.permit_max_rounds),
                });
            }

            let (_, signal) = self
                .registration
                .get_or_insert_with(|| self.waiting.register(key.clone()));
            debug!(pod = %key, node = %self.node, wait_ms = wait.as_millis() as u64, round = rounds, "waiting at permit");

            let received = tokio::select! {
                _ = tokio::time::sleep(wait) => None,
                received = signal => Some(received.ok()),
            };
            match received {
                None => verdict = self.framework.run_permit(&self.state, &self.pod, &self.node),
                Some(signal) => {
                    // The sender is gone, nothing left to unregister.
                    self.registration = None;
                    return resume(&key, signal);
                }
            }
        };

        let Some((ticket, mut signal)) = self.registration.take() else {
            return resolved;
        };
        if self.waiting.unregister(&key, ticket) {
            return resolved;
        }
        // A signal raced the last timer; it was accepted, so it decides.
        resume(&key, signal.try_recv().ok())
    }

    fn bind(&self) -> CycleOutcome {
        let status = self.framework.run_pre_bind(&self.state, &self.pod, &self.node);
        if !status.is_success() {
            return CycleOutcome::failed(&status);
        }

        let status = self.framework.run_bind(&self.state, &self.pod, &self.node);
        if !status.is_success() {
            return CycleOutcome::failed(&status);
        }

        self.framework.run_post_bind(&self.state, &self.pod, &self.node);
        info!(pod = %self.pod.key(), node = %self.node, "binding committed");
        CycleOutcome::Bound {
            node: self.node.clone(),
        }
    }

    fn release(&self, outcome: &CycleOutcome) {
        let key = self.pod.key();
        warn!(pod = %key, node = %self.node, ?outcome, "binding cycle aborted, releasing reservation");
        self.framework.run_unreserve(&self.state, &self.pod, &self.node);
        self.cluster.forget(&key);
    }
}

/// Map an external signal to the permit result. `None` means the sender
/// was dropped without a signal.
fn resume(key: &PodKey, signal: Option<WaitSignal>) -> Result<(), CycleOutcome> {
    match signal {
        Some(WaitSignal::Allow) => {
            debug!(pod = %key, "permit allowed externally");
            Ok(())
        }
        Some(WaitSignal::Reject(reason)) => Err(CycleOutcome::Rejected { reason }),
        Some(WaitSignal::Withdraw) | None => Err(CycleOutcome::Withdrawn),
    }
}
