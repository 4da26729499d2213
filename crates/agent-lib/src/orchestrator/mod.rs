//! Multi-target detection cycle
//!
//! One cycle runs three phases in order:
//! 1. Observe: one task per target calls the collector. A failure marks the
//!    target unhealthy and drops it from the rest of the cycle.
//! 2. Learn: serial, best-effort bookkeeping for every observed target.
//! 3. Detect: one task per observed target runs detection on its latest
//!    state and tags the anomalies with the target's identity.
//!
//! The results are then aggregated and handed to the anomaly sinks.
//! Cancellation is checked between phases only; a running phase always
//! completes.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::anomaly::{DetectionEngine, DetectionScope, Detector};
use crate::collector::StateCollector;
use crate::config::{validate_targets, DetectionConfig, TargetConfig};
use crate::error::{ConfigError, CycleError, TargetFailure};
use crate::learn::LearningLog;
use crate::models::{AggregateSummary, Anomaly};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::registry::TargetRegistry;
use crate::sink::AnomalySink;

#[cfg(test)]
mod tests;

/// Default interval between detection cycles
const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Phases of a detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Observe,
    Learn,
    Detect,
    Aggregate,
}

/// Result of one detection cycle
#[derive(Debug)]
pub struct CycleReport {
    /// Anomalies from every target that completed detection
    pub anomalies: Vec<Anomaly>,
    pub summary: AggregateSummary,
    /// Targets that failed, ordered by id
    pub failures: Vec<TargetFailure>,
    /// First phase skipped because cancellation was requested
    pub skipped_from: Option<Phase>,
}

impl CycleReport {
    /// Non-fatal aggregate error, if any target failed
    pub fn error(&self) -> Option<CycleError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(CycleError::PartialFailure {
                failures: self.failures.clone(),
            })
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.skipped_from.is_some()
    }
}

/// Drives observe/learn/detect cycles across all registered targets
pub struct Orchestrator {
    registry: TargetRegistry,
    collector: Arc<dyn StateCollector>,
    engine: DetectionEngine,
    learning: LearningLog,
    sinks: Vec<Arc<dyn AnomalySink>>,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
    interval: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn learning(&self) -> &LearningLog {
        &self.learning
    }

    /// Run cycles on the configured interval until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting detection loop"
        );

        let cancel = shutdown.clone();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle(&cancel).await;
                    if let Some(err) = report.error() {
                        warn!(error = %err, "Detection cycle finished with failures");
                    }
                    if report.is_cancelled() {
                        info!(skipped_from = ?report.skipped_from, "Detection cycle cancelled");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutting down detection loop");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single cycle across all registered targets
    pub async fn run_cycle(&self, cancel: &watch::Receiver<bool>) -> CycleReport {
        self.run_phases(|_| is_cancelled(cancel)).await
    }

    /// Run one cycle, asking `stop_before` at every phase boundary whether
    /// the next phase should be skipped
    async fn run_phases(&self, mut stop_before: impl FnMut(Phase) -> bool) -> CycleReport {
        let start = Instant::now();
        let targets = self.registry.configs().await;
        let mut failures = Vec::new();
        let mut anomalies = Vec::new();

        let skipped_from = 'phases: {
            let observed = self.observe_all(targets, &mut failures).await;
            if stop_before(Phase::Learn) {
                break 'phases Some(Phase::Learn);
            }

            self.learn_all(&observed).await;
            if stop_before(Phase::Detect) {
                break 'phases Some(Phase::Detect);
            }

            anomalies = self.detect_all(observed, &mut failures).await;
            if stop_before(Phase::Aggregate) {
                break 'phases Some(Phase::Aggregate);
            }

            self.deliver(&anomalies).await;
            None
        };

        failures.sort_by(|a, b| a.target_id.cmp(&b.target_id));

        let (_, mut summary) = self.registry.snapshot().await;
        summary.total_anomalies = anomalies.len();

        self.metrics.set_targets(&summary);
        self.metrics
            .set_history_samples(self.engine.history_len().await);
        self.metrics.observe_cycle_latency(start.elapsed().as_secs_f64());
        self.logger
            .log_cycle(&summary, failures.len(), start.elapsed().as_millis());

        CycleReport {
            anomalies,
            summary,
            failures,
            skipped_from,
        }
    }

    /// Observe every target concurrently; returns the targets that succeeded
    async fn observe_all(
        &self,
        targets: Vec<TargetConfig>,
        failures: &mut Vec<TargetFailure>,
    ) -> Vec<TargetConfig> {
        let mut pending: HashSet<String> = targets.iter().map(|t| t.id.clone()).collect();
        let mut tasks = JoinSet::new();

        for target in targets {
            let collector = Arc::clone(&self.collector);
            tasks.spawn(async move {
                let result = collector.observe(&target).await;
                (target, result)
            });
        }

        let mut observed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (target, result) = match joined {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "Observe task did not complete");
                    continue;
                }
            };
            pending.remove(&target.id);

            match result {
                Ok(mut state) => {
                    state.target_id = target.id.clone();
                    state.target_name = target.name.clone();

                    match self.registry.update_state(&target.id, state).await {
                        Ok(()) => observed.push(target),
                        Err(e) => {
                            warn!(target_id = %target.id, error = %e, "Failed to store target state");
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    self.metrics.inc_collection_errors();
                    self.logger.log_target_unhealthy(&target.id, &message);
                    self.mark_failed(&target.id, message, failures).await;
                }
            }
        }

        // Tasks that panicked or were aborted never reported back
        for id in pending {
            self.mark_failed(&id, "observation task aborted".to_string(), failures)
                .await;
        }

        observed.sort_by(|a, b| a.id.cmp(&b.id));
        observed
    }

    async fn mark_failed(&self, id: &str, message: String, failures: &mut Vec<TargetFailure>) {
        if let Err(e) = self.registry.set_health(id, false, Some(message.clone())).await {
            warn!(target_id = %id, error = %e, "Failed to record target health");
        }
        failures.push(TargetFailure {
            target_id: id.to_string(),
            message,
        });
    }

    /// Record an observation per target; errors are logged and dropped
    async fn learn_all(&self, observed: &[TargetConfig]) {
        for target in observed {
            match self.registry.get(&target.id).await {
                Some(record) => {
                    self.learning.learn(&target.id, &record.state);
                }
                None => {
                    warn!(target_id = %target.id, "No state to learn from");
                }
            }
        }
    }

    /// Detect anomalies for every observed target concurrently
    async fn detect_all(
        &self,
        observed: Vec<TargetConfig>,
        failures: &mut Vec<TargetFailure>,
    ) -> Vec<Anomaly> {
        let mut pending = HashSet::new();
        let mut tasks = JoinSet::new();

        for target in observed {
            let Some(record) = self.registry.get(&target.id).await else {
                warn!(target_id = %target.id, "Target disappeared before detection");
                continue;
            };

            pending.insert(target.id.clone());
            let engine = self.engine.clone();
            let metrics = self.metrics.clone();
            tasks.spawn(async move {
                let start = Instant::now();
                let scope = DetectionScope::for_target(&target);
                let mut anomalies = engine.detect(&record.state, scope).await;
                metrics.observe_detect_latency(start.elapsed().as_secs_f64());

                for anomaly in &mut anomalies {
                    anomaly.tag_target(&target.id, &target.name, &target.labels);
                }

                debug!(
                    target_id = %target.id,
                    anomalies = anomalies.len(),
                    "Detection complete"
                );
                (target.id, anomalies)
            });
        }

        let (anomalies, aborted) = join_detections(tasks, pending).await;
        for id in aborted {
            self.mark_failed(&id, "detection task aborted".to_string(), failures)
                .await;
        }
        anomalies
    }

    /// Hand the cycle's anomalies to every sink
    async fn deliver(&self, anomalies: &[Anomaly]) {
        for anomaly in anomalies {
            self.metrics.record_anomaly(anomaly);
        }

        if anomalies.is_empty() {
            return;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(anomalies).await {
                self.metrics.inc_sink_errors();
                warn!(sink = %sink.name(), error = %e, "Failed to deliver anomalies");
            }
        }
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

/// Drain detect tasks; returns their anomalies and the ids of targets whose
/// task never reported back
async fn join_detections(
    mut tasks: JoinSet<(String, Vec<Anomaly>)>,
    mut pending: HashSet<String>,
) -> (Vec<Anomaly>, Vec<String>) {
    let mut all = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, anomalies)) => {
                pending.remove(&id);
                all.extend(anomalies);
            }
            Err(e) => warn!(error = %e, "Detect task did not complete"),
        }
    }

    let mut aborted: Vec<String> = pending.into_iter().collect();
    aborted.sort();
    (all, aborted)
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    collector: Option<Arc<dyn StateCollector>>,
    targets: Vec<TargetConfig>,
    detection: DetectionConfig,
    sinks: Vec<Arc<dyn AnomalySink>>,
    interval: Duration,
    agent_name: String,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            collector: None,
            targets: Vec::new(),
            detection: DetectionConfig::default(),
            sinks: Vec::new(),
            interval: DEFAULT_INTERVAL,
            agent_name: "fleetwatch".to_string(),
        }
    }

    /// Set the state collector
    pub fn collector(mut self, collector: Arc<dyn StateCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn targets(mut self, targets: Vec<TargetConfig>) -> Self {
        self.targets = targets;
        self
    }

    pub fn detection(mut self, detection: DetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn AnomalySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Set the interval between cycles
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    /// Validate the configuration and register the enabled targets
    pub async fn build(self) -> Result<Orchestrator> {
        let collector = self
            .collector
            .ok_or_else(|| anyhow::anyhow!("Collector is required"))?;

        if self.interval.is_zero() {
            return Err(ConfigError::InvalidInterval.into());
        }
        validate_targets(&self.targets)?;
        self.detection.validate()?;

        let registry = TargetRegistry::new();
        registry.initialize(&self.targets).await;

        let learning = LearningLog::new(self.detection.max_history_size);
        let engine = DetectionEngine::new(Detector::new(self.detection));

        Ok(Orchestrator {
            registry,
            collector,
            engine,
            learning,
            sinks: self.sinks,
            metrics: DetectorMetrics::new(),
            logger: StructuredLogger::new(self.agent_name),
            interval: self.interval,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
