//! Delivery of detected anomalies
//!
//! Storage backends and notification transports implement `AnomalySink`.
//! The orchestrator hands every sink the aggregated anomalies of a cycle;
//! a failing sink is logged and does not affect the others.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Anomaly, Severity};
use crate::observability::StructuredLogger;

/// Consumer of the anomalies produced by a detection cycle
#[async_trait]
pub trait AnomalySink: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn deliver(&self, anomalies: &[Anomaly]) -> Result<()>;
}

/// Writes one structured log event per anomaly
pub struct LogSink {
    logger: StructuredLogger,
}

impl LogSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl AnomalySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, anomalies: &[Anomaly]) -> Result<()> {
        for anomaly in anomalies {
            self.logger.log_anomaly(anomaly);
        }
        Ok(())
    }
}

/// Forwards only anomalies at or above a minimum severity
pub struct SeverityFilter<S> {
    inner: S,
    min_severity: Severity,
}

impl<S: AnomalySink> SeverityFilter<S> {
    pub fn new(inner: S, min_severity: Severity) -> Self {
        Self {
            inner,
            min_severity,
        }
    }
}

#[async_trait]
impl<S: AnomalySink> AnomalySink for SeverityFilter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn deliver(&self, anomalies: &[Anomaly]) -> Result<()> {
        let selected: Vec<Anomaly> = anomalies
            .iter()
            .filter(|a| a.severity >= self.min_severity)
            .cloned()
            .collect();

        if selected.is_empty() {
            return Ok(());
        }
        self.inner.deliver(&selected).await
    }
}
