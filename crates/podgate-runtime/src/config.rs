//! Scheduler configuration (TOML).
//!
//! ```toml
//! parallelism = 16
//! max_attempts = 3
//! permit_max_rounds = 3
//! queue_order = "creation-time"
//!
//! [score_range]
//! min = 0
//! max = 100
//!
//! [[plugins]]
//! name = "memory-aware"
//! weight = 1
//! args = { permit_threshold_secs = 360 }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use podgate_framework::{ArrivalOrder, CreationTimeOrder, PluginArgs, QueueSort, ScoreRange};

use crate::error::{RuntimeError, RuntimeResult};

const DEFAULT_PLUGIN: &str = "memory-aware";

/// Which ordering the scheduling queue uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueOrderKind {
    Arrival,
    #[default]
    CreationTime,
}

impl QueueOrderKind {
    pub fn build(self) -> Box<dyn QueueSort> {
        match self {
            QueueOrderKind::Arrival => Box::new(ArrivalOrder),
            QueueOrderKind::CreationTime => Box::new(CreationTimeOrder),
        }
    }
}

/// One enabled plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    pub name: String,
    /// Multiplier applied to this plugin's normalized scores.
    #[serde(default = "default_weight")]
    pub weight: i64,
    /// Opaque plugin args, handed to the plugin factory as JSON.
    #[serde(default, skip_serializing_if = "PluginArgs::is_null")]
    pub args: PluginArgs,
}

impl PluginConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: default_weight(),
            args: PluginArgs::Null,
        }
    }

    pub fn with_args(mut self, args: PluginArgs) -> Self {
        self.args = args;
        self
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }
}

fn default_weight() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Workers used for per-node Filter and Score.
    pub parallelism: usize,
    /// Scheduling attempts before a pod's outcome is final.
    pub max_attempts: u32,
    /// Wait rounds a pod may spend at Permit before it is rejected.
    pub permit_max_rounds: u32,
    pub queue_order: QueueOrderKind,
    pub score_range: ScoreRange,
    pub plugins: Vec<PluginConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallelism: 16,
            max_attempts: 3,
            permit_max_rounds: 3,
            queue_order: QueueOrderKind::default(),
            score_range: ScoreRange::default(),
            plugins: vec![PluginConfig::new(DEFAULT_PLUGIN)],
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.parallelism == 0 {
            return Err(RuntimeError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(RuntimeError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.permit_max_rounds == 0 {
            return Err(RuntimeError::InvalidConfig(
                "permit_max_rounds must be at least 1".to_string(),
            ));
        }
        self.score_range
            .validate()
            .map_err(|e| RuntimeError::InvalidConfig(e.to_string()))?;

        if self.plugins.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "at least one plugin must be enabled".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if !seen.insert(plugin.name.as_str()) {
                return Err(RuntimeError::InvalidConfig(format!(
                    "plugin {} enabled twice",
                    plugin.name
                )));
            }
            if plugin.weight <= 0 {
                return Err(RuntimeError::InvalidConfig(format!(
                    "plugin {} weight must be positive",
                    plugin.name
                )));
            }
        }
        Ok(())
    }
}
