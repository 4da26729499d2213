//! Fleetwatch - multi-target anomaly detection agent
//!
//! Periodically observes every configured target, learns from each
//! snapshot and reports anomalies as structured log events.

use anyhow::Result;
use fleetwatch_lib::{FileCollector, LogSink, Orchestrator, SeverityFilter, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fleetwatch");

    let config = config::AgentConfig::load()?;
    info!(
        agent_name = %config.agent_name,
        targets = config.targets.len(),
        snapshot_dir = %config.snapshot_dir.display(),
        "Agent configured"
    );

    let logger = StructuredLogger::new(&config.agent_name);
    let sink = SeverityFilter::new(LogSink::new(logger.clone()), config.min_severity);

    let orchestrator = Orchestrator::builder()
        .collector(Arc::new(FileCollector::new(config.snapshot_dir.clone())))
        .targets(config.targets.clone())
        .detection(config.detection.clone())
        .sink(Arc::new(sink))
        .interval(Duration::from_secs(config.observation_interval_secs))
        .agent_name(&config.agent_name)
        .build()
        .await?;

    logger.log_startup(AGENT_VERSION, orchestrator.registry().len().await);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut detection = tokio::spawn(orchestrator.run(shutdown_rx));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(true);
            if let Err(e) = detection.await {
                error!(error = %e, "Detection loop terminated abnormally");
            }
        }
        joined = &mut detection => {
            if let Err(e) = joined {
                error!(error = %e, "Detection loop terminated abnormally");
            }
            logger.log_shutdown("detection loop exited");
        }
    }

    info!("Shutting down");
    Ok(())
}
