//! Stage result codes.
//!
//! Every extension point returns exactly one [`Status`]. A status is not a
//! Rust error: `Unschedulable` and `Wait` are ordinary outcomes the host
//! runtime acts on, and only `Error` aborts the cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result code of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// Proceed to the next stage.
    Success,
    /// The node (or, from PreFilter/PostFilter, the whole cycle) is rejected.
    /// Recoverable: the pod may fit later.
    Unschedulable,
    /// Suspend the cycle for a bounded duration (Permit only).
    Wait,
    /// The plugin does not take part in this stage.
    Skip,
    /// The stage could not complete; the cycle is aborted.
    Error,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Unschedulable => "Unschedulable",
            Code::Wait => "Wait",
            Code::Skip => "Skip",
            Code::Error => "Error",
        };
        f.write_str(s)
    }
}

/// A result code plus human-readable reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
    plugin: Option<String>,
}

impl Status {
    pub fn new(code: Code, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
            plugin: None,
        }
    }

    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
            plugin: None,
        }
    }

    pub fn skip() -> Self {
        Self {
            code: Code::Skip,
            reasons: Vec::new(),
            plugin: None,
        }
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, reason)
    }

    pub fn wait(reason: impl Into<String>) -> Self {
        Self::new(Code::Wait, reason)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Code::Error, reason)
    }

    /// Record which plugin produced this status.
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Reasons joined into a single line.
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn is_unschedulable(&self) -> bool {
        self.code == Code::Unschedulable
    }

    pub fn is_wait(&self) -> bool {
        self.code == Code::Wait
    }

    pub fn is_skip(&self) -> bool {
        self.code == Code::Skip
    }

    pub fn is_error(&self) -> bool {
        self.code == Code::Error
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.plugin, self.reasons.is_empty()) {
            (Some(p), false) => write!(f, "{} [{}]: {}", self.code, p, self.message()),
            (Some(p), true) => write!(f, "{} [{}]", self.code, p),
            (None, false) => write!(f, "{}: {}", self.code, self.message()),
            (None, true) => write!(f, "{}", self.code),
        }
    }
}
