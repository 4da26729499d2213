//! Detection and target configuration

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::history::EvictionPolicy;
use crate::models::MetricKind;

/// Resource kinds polled when a target does not list any
pub const DEFAULT_RESOURCES: &[&str] = &["nodes", "events"];

/// Thresholds and smoothing parameters for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricParams {
    pub threshold: f64,
    pub alpha: f64,
    pub min_std_dev: f64,
}

/// Anomaly detection configuration shared by all targets
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionConfig {
    /// CPU usage percentage considered anomalous
    #[serde(default = "default_usage_threshold")]
    pub cpu_threshold: f64,

    /// Memory usage percentage considered anomalous
    #[serde(default = "default_usage_threshold")]
    pub memory_threshold: f64,

    /// Restart count considered anomalous
    #[serde(default = "default_pod_restart_threshold")]
    pub pod_restart_threshold: u32,

    /// Maximum samples held by the history store
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    #[serde(default = "default_alpha")]
    pub cpu_alpha: f64,

    #[serde(default = "default_alpha")]
    pub memory_alpha: f64,

    #[serde(default = "default_alpha")]
    pub restart_alpha: f64,

    /// Below this standard deviation only the hard threshold applies
    #[serde(default = "default_min_std_dev")]
    pub min_std_dev: f64,

    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

fn default_usage_threshold() -> f64 {
    80.0
}

fn default_pod_restart_threshold() -> u32 {
    3
}

fn default_max_history_size() -> usize {
    1000
}

fn default_alpha() -> f64 {
    0.3
}

fn default_min_std_dev() -> f64 {
    1.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: default_usage_threshold(),
            memory_threshold: default_usage_threshold(),
            pod_restart_threshold: default_pod_restart_threshold(),
            max_history_size: default_max_history_size(),
            cpu_alpha: default_alpha(),
            memory_alpha: default_alpha(),
            restart_alpha: default_alpha(),
            min_std_dev: default_min_std_dev(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl DetectionConfig {
    /// Resolve the parameters used to classify a metric
    pub fn params(&self, metric: MetricKind) -> MetricParams {
        let (threshold, alpha) = match metric {
            MetricKind::Cpu => (self.cpu_threshold, self.cpu_alpha),
            MetricKind::Memory => (self.memory_threshold, self.memory_alpha),
            MetricKind::Restarts => (self.pod_restart_threshold as f64, self.restart_alpha),
        };

        MetricParams {
            threshold,
            alpha,
            min_std_dev: self.min_std_dev,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::InvalidHistorySize);
        }

        if !(self.min_std_dev.is_finite() && self.min_std_dev > 0.0) {
            return Err(ConfigError::InvalidMinStdDev(self.min_std_dev));
        }

        for metric in [MetricKind::Cpu, MetricKind::Memory, MetricKind::Restarts] {
            let params = self.params(metric);
            if !(params.alpha > 0.0 && params.alpha <= 1.0) {
                return Err(ConfigError::InvalidAlpha {
                    metric: metric.to_string(),
                    value: params.alpha,
                });
            }
            if !(params.threshold >= 0.0) {
                return Err(ConfigError::InvalidThreshold {
                    metric: metric.to_string(),
                    value: params.threshold,
                });
            }
        }

        Ok(())
    }
}

/// Configuration for one monitored target
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Resource kinds inspected for this target ("nodes", "pods", "events")
    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Collector-specific locator (kubeconfig path, snapshot file, ...)
    #[serde(default)]
    pub source: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl TargetConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            labels: HashMap::new(),
            resources: DEFAULT_RESOURCES.iter().map(|r| r.to_string()).collect(),
            enabled: true,
            source: None,
        }
    }

    pub fn with_resources(mut self, resources: &[&str]) -> Self {
        self.resources = resources.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Whether the given resource kind is polled for this target
    pub fn monitors(&self, resource: &str) -> bool {
        let singular = resource.trim_end_matches('s');
        self.resources
            .iter()
            .any(|r| r.trim_end_matches('s').eq_ignore_ascii_case(singular))
    }
}

/// Fill in defaults for targets loaded from configuration
pub fn apply_target_defaults(targets: &mut [TargetConfig]) {
    for (index, target) in targets.iter_mut().enumerate() {
        if target.name.is_empty() {
            target.name = format!("cluster-{}", index);
        }
        if target.id.is_empty() {
            target.id = target.name.clone();
        }
        if target.resources.is_empty() {
            target.resources = DEFAULT_RESOURCES.iter().map(|r| r.to_string()).collect();
        }
    }
}

/// Check target registrations before the registry is built
pub fn validate_targets(targets: &[TargetConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for (index, target) in targets.iter().enumerate() {
        if target.id.trim().is_empty() {
            return Err(ConfigError::EmptyTargetId(index));
        }
        if !seen.insert(target.id.as_str()) {
            return Err(ConfigError::DuplicateTarget(target.id.clone()));
        }
    }

    if !targets.iter().any(|t| t.enabled) {
        return Err(ConfigError::NoEnabledTargets);
    }

    Ok(())
}
