//! Agent configuration

use anyhow::{Context, Result};
use fleetwatch_lib::config::{apply_target_defaults, validate_targets};
use fleetwatch_lib::{ConfigError, DetectionConfig, Severity, TargetConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming the configuration file
const CONFIG_PATH_ENV: &str = "FLEETWATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "fleetwatch.yaml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to every log event
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Seconds between detection cycles
    #[serde(default = "default_observation_interval")]
    pub observation_interval_secs: u64,

    /// Directory holding `<target-id>.json` snapshots
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Anomalies below this severity are not logged
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_agent_name() -> String {
    "fleetwatch".to_string()
}

fn default_observation_interval() -> u64 {
    30
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_min_severity() -> Severity {
    Severity::Low
}

impl AgentConfig {
    /// Load configuration from the file named by `FLEETWATCH_CONFIG` and
    /// `FLEETWATCH_*` environment overrides
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load configuration from a file; a missing file leaves the defaults
    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("FLEETWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path))?;

        let mut agent: AgentConfig = config
            .try_deserialize()
            .context("invalid agent configuration")?;

        if agent.observation_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval.into());
        }

        apply_target_defaults(&mut agent.targets);
        validate_targets(&agent.targets)?;
        agent.detection.validate()?;

        Ok(agent)
    }
}
