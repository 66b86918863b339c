//! podgate-framework — the pluggable pod placement pipeline.
//!
//! This crate defines the contracts shared by the host runtime and the
//! plugins it drives. It does NOT run a scheduling loop (that's
//! `podgate-runtime`). Instead, it provides the data model, the per-cycle
//! state store, the immutable node snapshot, and the extension-point trait
//! every plugin implements.
//!
//! # Components
//!
//! - **`types`** — Pods, nodes, and resource quantities
//! - **`status`** — Result codes returned by every stage
//! - **`cycle_state`** — Typed per-cycle key/value store
//! - **`snapshot`** — Immutable per-cycle view of all candidate nodes
//! - **`normalize`** — Linear rescaling of raw scores onto a target range
//! - **`plugin`** — The extension-point trait (PreFilter … PostBind)
//! - **`handle`** — Host-runtime services handed to plugins
//! - **`registry`** — Name → plugin factory table
//! - **`queue_sort`** — Ordering hooks for pending pods
//! - **`clock`** — Wall-clock abstraction used by time-gated stages
//!
//! # Pipeline
//!
//! ```text
//! PreFilter ─► Filter (per node, concurrent) ─► [PostFilter if none fit]
//!           ─► PreScore ─► Score (per node) ─► NormalizeScore
//!           ─► Reserve ─► Permit (may suspend) ─► PreBind ─► Bind ─► PostBind
//!                  └──────────── Unreserve on any failure ◄───────┘
//! ```

pub mod clock;
pub mod cycle_state;
pub mod error;
pub mod handle;
pub mod normalize;
pub mod plugin;
pub mod queue_sort;
pub mod registry;
pub mod snapshot;
pub mod status;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cycle_state::{CycleState, StateKey};
pub use error::{FrameworkError, FrameworkResult};
pub use handle::{ClientError, ClusterClient, Handle};
pub use normalize::{NodeScore, ScoreNormalizer, ScoreRange};
pub use plugin::{NodeToStatus, PermitDecision, Plugin};
pub use queue_sort::{ArrivalOrder, CreationTimeOrder, QueueSort, QueuedPod};
pub use registry::{PluginArgs, PluginFactory, Registry};
pub use snapshot::{NodeInfo, Snapshot};
pub use status::{Code, Status};
pub use types::*;
