//! Core data models for the detection engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::quantity;

/// Pod status reported for a healthy pod
pub const POD_RUNNING: &str = "Running";

/// Node status reported for a healthy node
pub const NODE_READY: &str = "Ready";

/// Kind of resource a time series belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Node,
    Pod,
    Event,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Node => write!(f, "node"),
            ResourceKind::Pod => write!(f, "pod"),
            ResourceKind::Event => write!(f, "event"),
        }
    }
}

/// Kind of metric recorded in the history store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Restarts,
}

impl MetricKind {
    /// Samples required before the statistical gates are consulted
    pub fn min_history(&self) -> usize {
        match self {
            MetricKind::Cpu | MetricKind::Memory => 5,
            MetricKind::Restarts => 3,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Cpu => write!(f, "cpu"),
            MetricKind::Memory => write!(f, "memory"),
            MetricKind::Restarts => write!(f, "restarts"),
        }
    }
}

/// Identifies one time series in the history store
///
/// Series are scoped to a target, so equally named resources in different
/// targets never share history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub target_id: String,
    pub resource_kind: ResourceKind,
    pub resource_id: String,
    pub metric_kind: MetricKind,
}

impl MetricKey {
    pub fn new(
        target_id: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        metric_kind: MetricKind,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            resource_kind,
            resource_id: resource_id.into(),
            metric_kind,
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}/{} {}",
            self.target_id, self.resource_kind, self.resource_id, self.metric_kind
        )
    }
}

/// A single recorded metric value
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub key: MetricKey,
    pub value: f64,
}

/// Classification of a detected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyType {
    HighCpuUsage,
    HighMemoryUsage,
    HighPodRestarts,
    PodNotRunning,
    ClusterEvent,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyType::HighCpuUsage => write!(f, "HighCPUUsage"),
            AnomalyType::HighMemoryUsage => write!(f, "HighMemoryUsage"),
            AnomalyType::HighPodRestarts => write!(f, "HighPodRestarts"),
            AnomalyType::PodNotRunning => write!(f, "PodNotRunning"),
            AnomalyType::ClusterEvent => write!(f, "ClusterEvent"),
        }
    }
}

/// Anomaly severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// An anomaly produced by one detection pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub anomaly_type: AnomalyType,
    pub resource_kind: ResourceKind,
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    /// Raised by the hard ceiling alone because the series was too short
    #[serde(default)]
    pub insufficient_history: bool,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Anomaly {
    /// Stamp the anomaly with the identity of the target it came from
    pub fn tag_target(
        &mut self,
        target_id: &str,
        target_name: &str,
        labels: &HashMap<String, String>,
    ) {
        self.target_id = target_id.to_string();
        self.target_name = target_name.to_string();
        for (k, v) in labels {
            self.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// Node as reported by a collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeState {
    pub name: String,
    /// Raw CPU usage quantity (e.g. "250m")
    pub cpu_usage: String,
    /// Raw memory usage quantity (e.g. "512Mi")
    pub memory_usage: String,
    pub cpu_capacity: String,
    pub memory_capacity: String,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub condition: String,
    pub condition_status: String,
    pub status: String,
    /// Namespaces with pods scheduled on this node
    pub namespaces: Vec<String>,
}

impl NodeState {
    /// Fill usage percentages from the raw quantity strings
    pub fn with_raw_usage(mut self) -> Self {
        self.cpu_usage_percent = quantity::usage_percent(
            quantity::parse_cpu(&self.cpu_usage),
            quantity::parse_cpu(&self.cpu_capacity),
        );
        self.memory_usage_percent = quantity::usage_percent(
            quantity::parse_memory(&self.memory_usage),
            quantity::parse_memory(&self.memory_capacity),
        );
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodState {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub status: String,
    pub restart_count: u32,
}

/// Resources found in one namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceList {
    pub pods: Vec<PodState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    #[default]
    Normal,
    Warning,
    Error,
}

/// Cluster-level event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvent {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub severity: EventSeverity,
    #[serde(default)]
    pub count: u32,
}

/// Snapshot of one target produced by a collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetState {
    pub target_id: String,
    pub target_name: String,
    pub namespaces: Vec<String>,
    pub nodes: Vec<NodeState>,
    /// Namespace -> resources; ordered so detection output is deterministic
    pub resources: BTreeMap<String, ResourceList>,
    pub events: Vec<ClusterEvent>,
}

impl TargetState {
    /// Empty state for a freshly registered target
    pub fn empty(target_id: &str, target_name: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            target_name: target_name.to_string(),
            ..Default::default()
        }
    }
}

/// Summary of target health across the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total_targets: usize,
    pub healthy_targets: usize,
    pub unhealthy_targets: usize,
    pub total_monitored_nodes: usize,
    /// Anomalies found by the cycle that produced this summary
    pub total_anomalies: usize,
    pub last_updated: DateTime<Utc>,
}
