//! Detection pass over a target snapshot
//!
//! A `Detector` owns the metric history and turns one `TargetState` into a
//! list of anomalies. It is not synchronized: `DetectionEngine` wraps it in
//! a mutex so that concurrent targets take turns.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::classifier::{classify, Verdict};
use crate::config::{DetectionConfig, TargetConfig};
use crate::history::MetricHistoryStore;
use crate::models::{
    Anomaly, AnomalyType, ClusterEvent, EventSeverity, MetricKey, MetricKind, NodeState,
    PodState, ResourceKind, Severity, TargetState, POD_RUNNING,
};

/// Event reasons that always indicate a problem
pub const PROBLEMATIC_REASONS: &[&str] = &[
    "FailedScheduling",
    "FailedMount",
    "FailedAttachVolume",
    "FailedCreate",
    "FailedDelete",
    "BackOff",
    "CrashLoopBackOff",
    "ImagePullBackOff",
];

/// Warning events repeated more often than this are anomalous
pub const RECURRING_WARNING_COUNT: u32 = 5;

/// Sections of a snapshot inspected by a detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionScope {
    pub nodes: bool,
    pub pods: bool,
    pub events: bool,
}

impl DetectionScope {
    pub fn all() -> Self {
        Self {
            nodes: true,
            pods: true,
            events: true,
        }
    }

    /// Scope matching the resource kinds a target polls
    pub fn for_target(target: &TargetConfig) -> Self {
        Self {
            nodes: target.monitors("nodes"),
            pods: target.monitors("pods"),
            events: target.monitors("events"),
        }
    }
}

impl Default for DetectionScope {
    fn default() -> Self {
        Self::all()
    }
}

/// Runs detection passes and keeps the shared metric history
pub struct Detector {
    config: DetectionConfig,
    history: MetricHistoryStore,
}

impl Detector {
    pub fn new(config: DetectionConfig) -> Self {
        let history = MetricHistoryStore::new(config.max_history_size, config.eviction_policy);
        Self { config, history }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn history(&self) -> &MetricHistoryStore {
        &self.history
    }

    /// Inspect every section of the snapshot
    pub fn detect(&mut self, state: &TargetState) -> Vec<Anomaly> {
        self.detect_scoped(state, DetectionScope::all())
    }

    /// Inspect the sections selected by `scope`
    ///
    /// Output order follows nodes, then namespaces in key order, then
    /// events.
    pub fn detect_scoped(&mut self, state: &TargetState, scope: DetectionScope) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        if scope.nodes {
            for node in &state.nodes {
                self.check_node(&state.target_id, node, &mut anomalies);
            }
        }

        if scope.pods {
            for (namespace, resources) in &state.resources {
                for pod in &resources.pods {
                    self.check_pod(&state.target_id, namespace, pod, &mut anomalies);
                }
            }
        }

        if scope.events {
            for event in &state.events {
                check_event(event, &mut anomalies);
            }
        }

        anomalies
    }

    fn check_node(&mut self, target_id: &str, node: &NodeState, anomalies: &mut Vec<Anomaly>) {
        let cpu = sanitize(node.cpu_usage_percent);
        let memory = sanitize(node.memory_usage_percent);

        let cpu_key = MetricKey::new(target_id, ResourceKind::Node, &node.name, MetricKind::Cpu);
        let memory_key =
            MetricKey::new(target_id, ResourceKind::Node, &node.name, MetricKind::Memory);
        self.history.record(cpu_key.clone(), cpu);
        self.history.record(memory_key.clone(), memory);

        let namespaces = if node.namespaces.is_empty() {
            String::new()
        } else {
            format!(" (namespaces: {})", node.namespaces.join(", "))
        };

        for (key, value, anomaly_type, label) in [
            (cpu_key, cpu, AnomalyType::HighCpuUsage, "CPU"),
            (memory_key, memory, AnomalyType::HighMemoryUsage, "Memory"),
        ] {
            let verdict = self.classify(&key, value);
            if !verdict.is_anomaly() {
                continue;
            }

            let detail = match verdict.stats {
                Some(stats) => format!("mean: {:.2}%, stddev: {:.2}%", stats.mean, stats.std_dev),
                None => "insufficient history for statistical analysis".to_string(),
            };

            anomalies.push(Anomaly {
                anomaly_type,
                resource_kind: ResourceKind::Node,
                resource: node.name.clone(),
                namespace: String::new(),
                severity: Severity::High,
                description: format!("{} usage is {:.2}% ({}){}", label, value, detail, namespaces),
                value,
                threshold: self.config.params(key.metric_kind).threshold,
                timestamp: Utc::now(),
                insufficient_history: verdict.insufficient_history(),
                target_id: String::new(),
                target_name: String::new(),
                labels: Default::default(),
            });
        }
    }

    fn check_pod(
        &mut self,
        target_id: &str,
        namespace: &str,
        pod: &PodState,
        anomalies: &mut Vec<Anomaly>,
    ) {
        let restarts = pod.restart_count as f64;
        let key = MetricKey::new(target_id, ResourceKind::Pod, &pod.name, MetricKind::Restarts);
        self.history.record(key.clone(), restarts);

        let verdict = self.classify(&key, restarts);
        if verdict.is_anomaly() {
            let detail = match verdict.stats {
                Some(stats) => format!("mean: {:.2}, stddev: {:.2}", stats.mean, stats.std_dev),
                None => "insufficient history for statistical analysis".to_string(),
            };

            anomalies.push(pod_anomaly(
                AnomalyType::HighPodRestarts,
                namespace,
                &pod.name,
                Severity::Medium,
                format!("Pod has restarted {} times ({})", pod.restart_count, detail),
                restarts,
                self.config.params(MetricKind::Restarts).threshold,
                verdict.insufficient_history(),
            ));
        }

        // Status check never consults history
        if pod.status != POD_RUNNING {
            anomalies.push(pod_anomaly(
                AnomalyType::PodNotRunning,
                namespace,
                &pod.name,
                Severity::High,
                format!("Pod is in {} state", pod.status),
                0.0,
                0.0,
                false,
            ));
        }
    }

    fn classify(&self, key: &MetricKey, value: f64) -> Verdict {
        let history = self.history.query(key);
        let params = self.config.params(key.metric_kind);
        classify(value, &history, &params, key.metric_kind.min_history())
    }
}

/// Non-finite readings are treated like unparsable ones
fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[allow(clippy::too_many_arguments)]
fn pod_anomaly(
    anomaly_type: AnomalyType,
    namespace: &str,
    pod: &str,
    severity: Severity,
    description: String,
    value: f64,
    threshold: f64,
    insufficient_history: bool,
) -> Anomaly {
    Anomaly {
        anomaly_type,
        resource_kind: ResourceKind::Pod,
        resource: pod.to_string(),
        namespace: namespace.to_string(),
        severity,
        description,
        value,
        threshold,
        timestamp: Utc::now(),
        insufficient_history,
        target_id: String::new(),
        target_name: String::new(),
        labels: Default::default(),
    }
}

/// Apply the three event rules; they are independent, so one event can
/// produce up to three anomalies
fn check_event(event: &ClusterEvent, anomalies: &mut Vec<Anomaly>) {
    let event_anomaly = |severity: Severity, prefix: &str| Anomaly {
        anomaly_type: AnomalyType::ClusterEvent,
        resource_kind: ResourceKind::Event,
        resource: event.resource.clone(),
        namespace: event.namespace.clone(),
        severity,
        description: format!(
            "{}: {} - {} (count: {})",
            prefix, event.reason, event.message, event.count
        ),
        value: event.count as f64,
        threshold: 0.0,
        timestamp: event.timestamp,
        insufficient_history: false,
        target_id: String::new(),
        target_name: String::new(),
        labels: Default::default(),
    };

    if event.severity == EventSeverity::Error {
        anomalies.push(event_anomaly(Severity::High, "Error event"));
    }

    if event.severity == EventSeverity::Warning && event.count > RECURRING_WARNING_COUNT {
        anomalies.push(event_anomaly(Severity::Medium, "Recurring warning"));
    }

    if PROBLEMATIC_REASONS.contains(&event.reason.as_str()) {
        anomalies.push(event_anomaly(Severity::High, "Problematic event"));
    }
}

/// Serializes detection passes against one shared `Detector`
#[derive(Clone)]
pub struct DetectionEngine {
    inner: Arc<Mutex<Detector>>,
}

impl DetectionEngine {
    pub fn new(detector: Detector) -> Self {
        Self {
            inner: Arc::new(Mutex::new(detector)),
        }
    }

    /// Run one detection pass; concurrent callers wait their turn
    pub async fn detect(&self, state: &TargetState, scope: DetectionScope) -> Vec<Anomaly> {
        let mut detector = self.inner.lock().await;
        detector.detect_scoped(state, scope)
    }

    /// Number of samples currently held in the shared history
    pub async fn history_len(&self) -> usize {
        self.inner.lock().await.history().len()
    }

    pub async fn query_history(&self, key: &MetricKey) -> Vec<f64> {
        self.inner.lock().await.history().query(key)
    }
}
