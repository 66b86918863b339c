//! podgate-runtime — the host runtime that drives the placement pipeline.
//!
//! # Components
//!
//! - **`config`** — Scheduler configuration (TOML)
//! - **`cluster`** — In-memory cluster store and the manifest it loads from
//! - **`handle`** — The services handle given to plugins (snapshot, client, clock)
//! - **`queue`** — Pending pods, ordered by the configured queue sort
//! - **`parallel`** — Bounded fan-out for per-node Filter and Score
//! - **`framework`** — Runs each extension point across all enabled plugins
//! - **`waiting`** — Pods suspended at Permit and the signals that resume them
//! - **`scheduler`** — The async executor: scheduling cycles, binding tasks, retries
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use podgate_framework::{Registry, SystemClock};
//! use podgate_runtime::{ClusterManifest, ClusterStore, Scheduler, SchedulerConfig};
//!
//! # async fn demo(registry: Registry, manifest: ClusterManifest) -> anyhow::Result<()> {
//! let (cluster, pending) = ClusterStore::from_manifest(&manifest)?;
//! let scheduler = Scheduler::new(&SchedulerConfig::default(), &registry, cluster, Arc::new(SystemClock))?;
//! for pod in pending {
//!     scheduler.submit(pod)?;
//! }
//! let reports = scheduler.run_until_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod framework;
pub mod handle;
pub mod parallel;
pub mod queue;
pub mod scheduler;
pub mod waiting;

pub use cluster::{ClusterManifest, ClusterStore};
pub use config::{PluginConfig, QueueOrderKind, SchedulerConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use framework::{Framework, PermitVerdict, SchedulingDecision};
pub use handle::RuntimeHandle;
pub use queue::SchedulingQueue;
pub use scheduler::{CycleOutcome, CycleReport, Scheduler};
pub use waiting::{WaitSignal, WaitTicket, WaitingPods};
