//! Observability infrastructure for the detection agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, detect latency, anomaly counts,
//!   target health, history size)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{AggregateSummary, Anomaly, Severity};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct DetectorMetricsInner {
    cycle_latency_seconds: Histogram,
    detect_latency_seconds: Histogram,
    anomalies_detected: IntCounterVec,
    collection_errors: IntCounter,
    sink_errors: IntCounter,
    targets_total: IntGauge,
    targets_healthy: IntGauge,
    targets_unhealthy: IntGauge,
    history_samples: IntGauge,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "fleetwatch_cycle_latency_seconds",
                "Time spent on one observe/learn/detect cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            detect_latency_seconds: register_histogram!(
                "fleetwatch_detect_latency_seconds",
                "Time spent running detection for one target",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detect_latency_seconds"),

            anomalies_detected: register_int_counter_vec!(
                "fleetwatch_anomalies_detected_total",
                "Total number of anomalies detected",
                &["type", "severity"]
            )
            .expect("Failed to register anomalies_detected"),

            collection_errors: register_int_counter!(
                "fleetwatch_collection_errors_total",
                "Total number of failed target observations"
            )
            .expect("Failed to register collection_errors"),

            sink_errors: register_int_counter!(
                "fleetwatch_sink_errors_total",
                "Total number of failed anomaly deliveries"
            )
            .expect("Failed to register sink_errors"),

            targets_total: register_int_gauge!(
                "fleetwatch_targets_total",
                "Number of registered targets"
            )
            .expect("Failed to register targets_total"),

            targets_healthy: register_int_gauge!(
                "fleetwatch_targets_healthy",
                "Number of targets whose last observation succeeded"
            )
            .expect("Failed to register targets_healthy"),

            targets_unhealthy: register_int_gauge!(
                "fleetwatch_targets_unhealthy",
                "Number of targets whose last observation failed"
            )
            .expect("Failed to register targets_unhealthy"),

            history_samples: register_int_gauge!(
                "fleetwatch_history_samples",
                "Samples currently held in the metric history"
            )
            .expect("Failed to register history_samples"),
        }
    }
}

/// Detector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn observe_detect_latency(&self, duration_secs: f64) {
        self.inner().detect_latency_seconds.observe(duration_secs);
    }

    pub fn record_anomaly(&self, anomaly: &Anomaly) {
        let anomaly_type = anomaly.anomaly_type.to_string();
        let severity = anomaly.severity.to_string();
        self.inner()
            .anomalies_detected
            .with_label_values(&[anomaly_type.as_str(), severity.as_str()])
            .inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_sink_errors(&self) {
        self.inner().sink_errors.inc();
    }

    /// Update target gauges from a registry summary
    pub fn set_targets(&self, summary: &AggregateSummary) {
        self.inner().targets_total.set(summary.total_targets as i64);
        self.inner().targets_healthy.set(summary.healthy_targets as i64);
        self.inner()
            .targets_unhealthy
            .set(summary.unhealthy_targets as i64);
    }

    pub fn set_history_samples(&self, samples: usize) {
        self.inner().history_samples.set(samples as i64);
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for anomalies, cycles and
/// other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    agent_name: String,
}

impl StructuredLogger {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
        }
    }

    /// Log a detected anomaly
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        match anomaly.severity {
            Severity::High => {
                warn!(
                    event = "anomaly_detected",
                    agent = %self.agent_name,
                    target_id = %anomaly.target_id,
                    target_name = %anomaly.target_name,
                    anomaly_type = %anomaly.anomaly_type,
                    resource_kind = %anomaly.resource_kind,
                    resource = %anomaly.resource,
                    namespace = %anomaly.namespace,
                    severity = %anomaly.severity,
                    value = anomaly.value,
                    threshold = anomaly.threshold,
                    details = %anomaly.description,
                    "High severity anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    agent = %self.agent_name,
                    target_id = %anomaly.target_id,
                    target_name = %anomaly.target_name,
                    anomaly_type = %anomaly.anomaly_type,
                    resource_kind = %anomaly.resource_kind,
                    resource = %anomaly.resource,
                    namespace = %anomaly.namespace,
                    severity = %anomaly.severity,
                    value = anomaly.value,
                    threshold = anomaly.threshold,
                    details = %anomaly.description,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log a target whose observation failed
    pub fn log_target_unhealthy(&self, target_id: &str, error: &str) {
        warn!(
            event = "target_unhealthy",
            agent = %self.agent_name,
            target_id = %target_id,
            error = %error,
            "Target observation failed"
        );
    }

    /// Log the outcome of a detection cycle
    pub fn log_cycle(&self, summary: &AggregateSummary, failed_targets: usize, elapsed_ms: u128) {
        info!(
            event = "cycle_complete",
            agent = %self.agent_name,
            total_targets = summary.total_targets,
            healthy_targets = summary.healthy_targets,
            unhealthy_targets = summary.unhealthy_targets,
            monitored_nodes = summary.total_monitored_nodes,
            anomalies = summary.total_anomalies,
            failed_targets = failed_targets,
            elapsed_ms = elapsed_ms as u64,
            "Detection cycle complete"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, targets: usize) {
        info!(
            event = "agent_started",
            agent = %self.agent_name,
            agent_version = %version,
            targets = targets,
            "Detection agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            agent = %self.agent_name,
            reason = %reason,
            "Detection agent shutting down"
        );
    }
}
