//! Agent library for multi-target anomaly detection
//!
//! This crate provides the core functionality for:
//! - Collecting state snapshots from monitored targets
//! - Bounded metric history and summary statistics
//! - Layered anomaly classification and detection
//! - A target registry with health tracking
//! - The observe/learn/detect cycle across all targets
//! - Observability and anomaly delivery

pub mod anomaly;
pub mod collector;
pub mod config;
pub mod error;
pub mod history;
pub mod learn;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod quantity;
pub mod registry;
pub mod sink;
pub mod stats;

pub use anomaly::{DetectionEngine, DetectionScope, Detector};
pub use collector::{FileCollector, StateCollector};
pub use config::{DetectionConfig, TargetConfig};
pub use error::{CollectionError, ConfigError, CycleError, RegistryError, TargetFailure};
pub use history::{EvictionPolicy, MetricHistoryStore};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
pub use orchestrator::{CycleReport, Orchestrator, OrchestratorBuilder, Phase};
pub use registry::{TargetRecord, TargetRegistry};
pub use sink::{AnomalySink, LogSink, SeverityFilter};
