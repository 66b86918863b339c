//! podgated — the podgate daemon.
//!
//! Loads a scheduler config and a cluster manifest, then drives every
//! pending pod through the placement pipeline with the built-in plugins.
//!
//! # Usage
//!
//! ```text
//! podgated schedule --config scheduler.toml --cluster cluster.toml
//! podgated run --cluster cluster.toml --log-format json
//! podgated config --config scheduler.toml
//! ```
//!
//! `schedule` runs until every pod has a final outcome and prints a JSON
//! report on stdout. `run` keeps going until Ctrl-C, printing one JSON line
//! per finished pod. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::{mpsc, watch};
use tracing::info;

use podgate_framework::{Registry, SystemClock};
use podgate_runtime::{ClusterManifest, ClusterStore, CycleReport, Scheduler, SchedulerConfig};

const DEFAULT_LOG_FILTER: &str = "info,podgated=debug,podgate=debug";

#[derive(Parser)]
#[command(name = "podgated", about = "podgate placement daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule every pending pod once and print the outcome.
    Schedule {
        /// Scheduler config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cluster manifest (TOML) with nodes, pods and ready claims.
        #[arg(long)]
        cluster: PathBuf,
    },
    /// Keep scheduling until interrupted.
    Run {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        cluster: PathBuf,
    },
    /// Print the effective scheduler config.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Schedule { config, cluster } => schedule(config.as_deref(), &cluster).await,
        Command::Run { config, cluster } => run(config.as_deref(), &cluster).await,
        Command::Config { config } => {
            print!("{}", load_config(config.as_deref())?.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    match path {
        Some(path) => {
            let config = SchedulerConfig::from_file(path)?;
            info!(path = %path.display(), "scheduler config loaded");
            Ok(config)
        }
        None => Ok(SchedulerConfig::default()),
    }
}

/// Build the scheduler and queue every pending pod from the manifest.
fn start(config: Option<&Path>, cluster: &Path) -> anyhow::Result<Scheduler> {
    let config = load_config(config)?;
    let manifest = ClusterManifest::from_file(cluster)?;
    let (store, pending) = ClusterStore::from_manifest(&manifest)?;
    info!(
        nodes = store.node_count(),
        pending = pending.len(),
        path = %cluster.display(),
        "cluster manifest loaded"
    );

    let mut registry = Registry::new();
    podgate_plugins::register_builtin(&mut registry)?;

    let scheduler = Scheduler::new(&config, &registry, store, Arc::new(SystemClock))?;
    for pod in pending {
        scheduler.submit(pod)?;
    }
    Ok(scheduler)
}

async fn schedule(config: Option<&Path>, cluster: &Path) -> anyhow::Result<()> {
    let scheduler = start(config, cluster)?;
    let reports = scheduler.run_until_idle().await;

    let bindings: Vec<_> = scheduler
        .cluster()
        .bindings()
        .into_iter()
        .map(|(pod, node)| serde_json::json!({ "pod": pod.to_string(), "node": node }))
        .collect();
    let summary = serde_json::json!({
        "reports": reports.iter().map(report_json).collect::<Vec<_>>(),
        "bindings": bindings,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let bound = reports
        .iter()
        .filter(|r| matches!(r.outcome, podgate_runtime::CycleOutcome::Bound { .. }))
        .count();
    info!(pods = reports.len(), bound, "scheduling finished");
    Ok(())
}

async fn run(config: Option<&Path>, cluster: &Path) -> anyhow::Result<()> {
    let scheduler = Arc::new(start(config, cluster)?);
    info!("podgated running, Ctrl-C to stop");

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(report_tx, shutdown_rx).await })
    };

    let printer = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            println!("{}", report_json(&report));
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    runner.await?;
    printer.await?;
    info!(pending = scheduler.pending(), "podgated stopped");
    Ok(())
}

/// Report with the pod rendered as `namespace/name`.
fn report_json(report: &CycleReport) -> serde_json::Value {
    let mut value = serde_json::to_value(report).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.insert("pod".to_string(), report.pod.to_string().into());
    }
    value
}
