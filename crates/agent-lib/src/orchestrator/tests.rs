//! Orchestrator tests with in-memory collectors and sinks

use super::*;
use crate::collector::async_trait;
use crate::error::{CollectionError, ConfigError};
use crate::models::{
    AnomalyType, ClusterEvent, EventSeverity, PodState, ResourceList, Severity, TargetState,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Serves canned snapshots; targets listed in `failing` are unreachable
#[derive(Default)]
struct MockCollector {
    states: HashMap<String, TargetState>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl MockCollector {
    fn with_state(mut self, id: &str, state: TargetState) -> Self {
        self.states.insert(id.to_string(), state);
        self
    }

    fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl StateCollector for MockCollector {
    async fn observe(&self, target: &TargetConfig) -> Result<TargetState, CollectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&target.id) {
            return Err(CollectionError::Unavailable {
                target: target.id.clone(),
                reason: "connection refused".to_string(),
            });
        }
        self.states
            .get(&target.id)
            .cloned()
            .ok_or_else(|| CollectionError::Unavailable {
                target: target.id.clone(),
                reason: "no snapshot".to_string(),
            })
    }
}

#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<Anomaly>>,
}

#[async_trait]
impl AnomalySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, anomalies: &[Anomaly]) -> Result<()> {
        self.received.lock().unwrap().extend_from_slice(anomalies);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl AnomalySink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _anomalies: &[Anomaly]) -> Result<()> {
        anyhow::bail!("sink offline")
    }
}

fn target(id: &str) -> TargetConfig {
    TargetConfig::new(id, format!("cluster {}", id)).with_resources(&["nodes", "pods", "events"])
}

/// One pending pod and one error event, both anomalous on first sight
fn unhealthy_state(pod: &str) -> TargetState {
    let mut resources = std::collections::BTreeMap::new();
    resources.insert(
        "default".to_string(),
        ResourceList {
            pods: vec![PodState {
                name: pod.to_string(),
                namespace: "default".to_string(),
                node_name: "node-1".to_string(),
                status: "Pending".to_string(),
                restart_count: 0,
            }],
        },
    );

    TargetState {
        namespaces: vec!["default".to_string()],
        resources,
        events: vec![ClusterEvent {
            reason: "VolumeDetached".to_string(),
            message: format!("volume for {} detached", pod),
            timestamp: Utc::now(),
            namespace: "default".to_string(),
            resource: pod.to_string(),
            severity: EventSeverity::Error,
            count: 1,
        }],
        ..Default::default()
    }
}

async fn orchestrator(collector: MockCollector, targets: Vec<TargetConfig>) -> Orchestrator {
    Orchestrator::builder()
        .collector(Arc::new(collector))
        .targets(targets)
        .build()
        .await
        .unwrap()
}

fn idle() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[tokio::test]
async fn test_failed_target_is_isolated() {
    let collector = MockCollector::default()
        .failing("a")
        .with_state("b", unhealthy_state("api-0"));
    let recording = Arc::new(RecordingSink::default());
    let orch = Orchestrator::builder()
        .collector(Arc::new(collector))
        .targets(vec![target("a"), target("b")])
        .sink(recording.clone())
        .build()
        .await
        .unwrap();
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    assert!(!report.anomalies.is_empty());
    assert!(report.anomalies.iter().all(|a| a.target_id == "b"));

    // The healthy target's anomalies still reach the sinks
    let received = recording.received.lock().unwrap().clone();
    assert_eq!(received, report.anomalies);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target_id, "a");
    match report.error() {
        Some(CycleError::PartialFailure { failures }) => assert_eq!(failures.len(), 1),
        None => panic!("expected a partial failure"),
    }

    let record = orch.registry().get("a").await.unwrap();
    assert!(!record.healthy);
    assert!(record.last_error.unwrap().contains("connection refused"));
    assert!(orch.registry().get("b").await.unwrap().healthy);

    assert_eq!(report.summary.total_targets, 2);
    assert_eq!(report.summary.healthy_targets, 1);
    assert_eq!(report.summary.unhealthy_targets, 1);
    assert_eq!(report.summary.total_anomalies, report.anomalies.len());
}

#[tokio::test]
async fn test_clean_cycle_has_no_error() {
    let collector = MockCollector::default().with_state("a", TargetState::default());
    let orch = orchestrator(collector, vec![target("a")]).await;
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    assert!(report.anomalies.is_empty());
    assert!(report.failures.is_empty());
    assert!(report.error().is_none());
    assert!(!report.is_cancelled());
}

#[tokio::test]
async fn test_anomalies_tagged_with_target() {
    let collector = MockCollector::default().with_state("prod", unhealthy_state("web-0"));
    let orch = orchestrator(
        collector,
        vec![target("prod").with_label("env", "production")],
    )
    .await;
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    let pending = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::PodNotRunning)
        .expect("pending pod should be flagged");
    assert_eq!(pending.target_id, "prod");
    assert_eq!(pending.target_name, "cluster prod");
    assert_eq!(pending.labels.get("env").map(String::as_str), Some("production"));
    assert_eq!(pending.severity, Severity::High);
    assert_eq!(pending.resource, "web-0");
}

#[tokio::test]
async fn test_union_of_disjoint_targets() {
    let state_a = unhealthy_state("api-0");
    let state_b = unhealthy_state("worker-0");

    let collector = MockCollector::default()
        .with_state("a", state_a.clone())
        .with_state("b", state_b.clone());
    let orch = orchestrator(collector, vec![target("a"), target("b")]).await;
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    let mut expected = 0;
    for (id, state) in [("a", &state_a), ("b", &state_b)] {
        let mut alone = Detector::new(DetectionConfig::default());
        let found = alone.detect_scoped(state, DetectionScope::for_target(&target(id)));
        let reported = report.anomalies.iter().filter(|a| a.target_id == id).count();
        assert_eq!(reported, found.len());
        expected += found.len();
    }
    assert_eq!(report.anomalies.len(), expected);
}

#[tokio::test]
async fn test_shared_node_names_keep_per_target_history() {
    let node = |cpu: f64| TargetState {
        nodes: vec![crate::models::NodeState {
            name: "node-1".to_string(),
            cpu_usage_percent: cpu,
            memory_usage_percent: 20.0,
            status: "Ready".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let collector = MockCollector::default()
        .with_state("a", node(10.0))
        .with_state("b", node(70.0));
    let orch = orchestrator(collector, vec![target("a"), target("b")]).await;
    let (_tx, cancel) = idle();

    for _ in 0..3 {
        orch.run_cycle(&cancel).await;
    }

    let cpu = |id: &str| {
        crate::models::MetricKey::new(
            id,
            crate::models::ResourceKind::Node,
            "node-1",
            crate::models::MetricKind::Cpu,
        )
    };
    assert_eq!(orch.engine().query_history(&cpu("a")).await, vec![10.0; 3]);
    assert_eq!(orch.engine().query_history(&cpu("b")).await, vec![70.0; 3]);
}

#[tokio::test]
async fn test_pods_ignored_unless_monitored() {
    let collector = MockCollector::default().with_state("a", unhealthy_state("api-0"));
    let orch = orchestrator(collector, vec![TargetConfig::new("a", "A")]).await;
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    assert!(report
        .anomalies
        .iter()
        .all(|a| a.anomaly_type == AnomalyType::ClusterEvent));
    assert!(!report.anomalies.is_empty());
}

#[tokio::test]
async fn test_cancel_skips_learn_and_detect() {
    let collector = MockCollector::default().with_state("a", unhealthy_state("api-0"));
    let orch = orchestrator(collector, vec![target("a")]).await;
    let (tx, cancel) = idle();
    tx.send(true).unwrap();

    let report = orch.run_cycle(&cancel).await;

    assert_eq!(report.skipped_from, Some(Phase::Learn));
    assert!(report.is_cancelled());
    assert!(report.anomalies.is_empty());
    assert!(orch.learning().observations("a").is_empty());
    assert_eq!(orch.engine().history_len().await, 0);

    // Observe still ran to completion
    let record = orch.registry().get("a").await.unwrap();
    assert_eq!(record.state.events.len(), 1);
}

#[tokio::test]
async fn test_cancel_after_detect_skips_delivery() {
    let recording = Arc::new(RecordingSink::default());
    let orch = Orchestrator::builder()
        .collector(Arc::new(
            MockCollector::default().with_state("a", unhealthy_state("api-0")),
        ))
        .targets(vec![target("a")])
        .sink(recording.clone())
        .build()
        .await
        .unwrap();

    let mut boundaries = Vec::new();
    let report = orch
        .run_phases(|next| {
            boundaries.push(next);
            next == Phase::Aggregate
        })
        .await;

    assert_eq!(boundaries, vec![Phase::Learn, Phase::Detect, Phase::Aggregate]);
    assert_eq!(report.skipped_from, Some(Phase::Aggregate));
    assert!(!report.anomalies.is_empty());
    assert_eq!(report.summary.total_anomalies, report.anomalies.len());
    assert!(recording.received.lock().unwrap().is_empty());
    assert_eq!(orch.learning().observations("a").len(), 1);
}

#[tokio::test]
async fn test_cancel_before_detect_keeps_learning() {
    let orch = orchestrator(
        MockCollector::default().with_state("a", unhealthy_state("api-0")),
        vec![target("a")],
    )
    .await;

    let report = orch.run_phases(|next| next == Phase::Detect).await;

    assert_eq!(report.skipped_from, Some(Phase::Detect));
    assert!(report.anomalies.is_empty());
    assert_eq!(orch.learning().observations("a").len(), 1);
    assert_eq!(orch.engine().history_len().await, 0);
}

#[tokio::test]
async fn test_aborted_detection_reported_per_target() {
    let mut tasks = JoinSet::new();
    tasks.spawn(async { ("a".to_string(), Vec::new()) });
    tasks.spawn(async {
        if true {
            panic!("detector failed");
        }
        ("b".to_string(), Vec::new())
    });
    let pending = HashSet::from(["a".to_string(), "b".to_string()]);

    let (anomalies, aborted) = join_detections(tasks, pending).await;

    assert!(anomalies.is_empty());
    assert_eq!(aborted, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_learn_records_each_observed_target() {
    let collector = MockCollector::default()
        .failing("a")
        .with_state("b", TargetState::default());
    let orch = orchestrator(collector, vec![target("a"), target("b")]).await;
    let (_tx, cancel) = idle();

    orch.run_cycle(&cancel).await;
    orch.run_cycle(&cancel).await;

    assert!(orch.learning().observations("a").is_empty());
    assert_eq!(orch.learning().observations("b").len(), 2);
    assert_eq!(orch.learning().average_reward("b"), Some(1.0));
}

#[tokio::test]
async fn test_sinks_receive_cycle_anomalies() {
    let recording = Arc::new(RecordingSink::default());
    let orch = Orchestrator::builder()
        .collector(Arc::new(
            MockCollector::default().with_state("a", unhealthy_state("api-0")),
        ))
        .targets(vec![target("a")])
        .sink(Arc::new(FailingSink))
        .sink(recording.clone())
        .build()
        .await
        .unwrap();
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    let received = recording.received.lock().unwrap();
    assert_eq!(received.len(), report.anomalies.len());
    assert!(report.error().is_none());
}

#[tokio::test]
async fn test_disabled_targets_not_observed() {
    let mut disabled = target("off");
    disabled.enabled = false;

    let collector = Arc::new(MockCollector::default().with_state("a", TargetState::default()));
    let orch = Orchestrator::builder()
        .collector(collector.clone())
        .targets(vec![target("a"), disabled])
        .build()
        .await
        .unwrap();
    let (_tx, cancel) = idle();

    let report = orch.run_cycle(&cancel).await;

    assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.summary.total_targets, 1);
}

#[tokio::test]
async fn test_build_validates_configuration() {
    assert!(Orchestrator::builder()
        .targets(vec![target("a")])
        .build()
        .await
        .is_err());

    assert!(Orchestrator::builder()
        .collector(Arc::new(MockCollector::default()))
        .targets(vec![target("a"), target("a")])
        .build()
        .await
        .is_err());

    assert!(Orchestrator::builder()
        .collector(Arc::new(MockCollector::default()))
        .build()
        .await
        .is_err());
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let err = Orchestrator::builder()
        .collector(Arc::new(MockCollector::default()))
        .targets(vec![target("a")])
        .interval(Duration::ZERO)
        .build()
        .await
        .err()
        .expect("zero interval should be rejected");

    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::InvalidInterval)
    );
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let orch = Orchestrator::builder()
        .collector(Arc::new(
            MockCollector::default().with_state("a", TargetState::default()),
        ))
        .targets(vec![target("a")])
        .interval(Duration::from_millis(10))
        .build()
        .await
        .unwrap();
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(orch.run(rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop after shutdown")
        .unwrap();
}
