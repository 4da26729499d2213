//! Error types for the detection engine

use thiserror::Error;

/// Failure reported by a collector while observing a target
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("target {target} unavailable: {reason}")]
    Unavailable { target: String, reason: String },

    #[error("failed to read snapshot for target {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode snapshot for target {target}: {source}")]
    Decode {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot belongs to target {found}, expected {expected}")]
    TargetMismatch { expected: String, found: String },
}

/// Invalid or missing target registration, raised at startup only
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("target at position {0} has an empty id")]
    EmptyTargetId(usize),

    #[error("target id {0} is registered more than once")]
    DuplicateTarget(String),

    #[error("no enabled targets configured")]
    NoEnabledTargets,

    #[error("{metric} alpha must be in (0, 1], got {value}")]
    InvalidAlpha { metric: String, value: f64 },

    #[error("{metric} threshold must be non-negative, got {value}")]
    InvalidThreshold { metric: String, value: f64 },

    #[error("max history size must be at least 1")]
    InvalidHistorySize,

    #[error("minimum standard deviation must be finite and positive, got {0}")]
    InvalidMinStdDev(f64),

    #[error("observation interval must be non-zero")]
    InvalidInterval,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("target {0} not found")]
    NotFound(String),
}

/// One target that failed during a detection cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target_id: String,
    pub message: String,
}

impl std::fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target_id, self.message)
    }
}

/// Non-fatal aggregate error of one detection cycle
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("{} target(s) failed: {}", .failures.len(), join_failures(.failures))]
    PartialFailure { failures: Vec<TargetFailure> },
}

fn join_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
