//! Directory of monitored targets
//!
//! Tracks the latest snapshot, health and last error of every enabled
//! target. Reads take a shared lock, mutations an exclusive one.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::TargetConfig;
use crate::error::RegistryError;
use crate::models::{AggregateSummary, TargetState};

/// State kept for one target
#[derive(Debug, Clone)]
pub struct TargetRecord {
    pub config: TargetConfig,
    pub state: TargetState,
    pub last_updated: DateTime<Utc>,
    pub healthy: bool,
    pub last_error: Option<String>,
}

impl TargetRecord {
    fn new(config: TargetConfig) -> Self {
        let state = TargetState::empty(&config.id, &config.name);
        Self {
            config,
            state,
            last_updated: Utc::now(),
            healthy: true,
            last_error: None,
        }
    }
}

/// Thread-safe registry of target records
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Arc<RwLock<HashMap<String, TargetRecord>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every enabled target with an empty state
    pub async fn initialize(&self, configs: &[TargetConfig]) {
        let mut targets = self.targets.write().await;

        for config in configs.iter().filter(|c| c.enabled) {
            info!(target_id = %config.id, target_name = %config.name, "Initialized target");
            targets.insert(config.id.clone(), TargetRecord::new(config.clone()));
        }
    }

    /// Replace a target's state and mark it healthy
    pub async fn update_state(&self, id: &str, state: TargetState) -> Result<(), RegistryError> {
        let mut targets = self.targets.write().await;
        let record = targets
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        record.state = state;
        record.last_updated = Utc::now();
        record.healthy = true;
        record.last_error = None;
        Ok(())
    }

    /// Update health without touching the stored state
    pub async fn set_health(
        &self,
        id: &str,
        healthy: bool,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut targets = self.targets.write().await;
        let record = targets
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if !healthy {
            warn!(target_id = %id, error = ?error, "Target marked unhealthy");
        }

        record.healthy = healthy;
        record.last_error = error;
        record.last_updated = Utc::now();
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<TargetRecord> {
        self.targets.read().await.get(id).cloned()
    }

    /// Configurations of all registered targets, ordered by id
    pub async fn configs(&self) -> Vec<TargetConfig> {
        let targets = self.targets.read().await;
        let mut configs: Vec<_> = targets.values().map(|r| r.config.clone()).collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }

    /// Consistent view of all states with a freshly computed summary
    pub async fn snapshot(&self) -> (HashMap<String, TargetState>, AggregateSummary) {
        let targets = self.targets.read().await;

        let mut states = HashMap::with_capacity(targets.len());
        let mut summary = AggregateSummary {
            total_targets: 0,
            healthy_targets: 0,
            unhealthy_targets: 0,
            total_monitored_nodes: 0,
            total_anomalies: 0,
            last_updated: Utc::now(),
        };

        for (id, record) in targets.iter() {
            states.insert(id.clone(), record.state.clone());

            summary.total_targets += 1;
            if record.healthy {
                summary.healthy_targets += 1;
            } else {
                summary.unhealthy_targets += 1;
            }
            summary.total_monitored_nodes += record.state.nodes.len();
        }

        (states, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeState;

    fn targets() -> Vec<TargetConfig> {
        let mut disabled = TargetConfig::new("off", "Disabled");
        disabled.enabled = false;
        vec![
            TargetConfig::new("prod", "Production"),
            TargetConfig::new("staging", "Staging"),
            disabled,
        ]
    }

    fn state_with_nodes(count: usize) -> TargetState {
        TargetState {
            nodes: (0..count)
                .map(|i| NodeState {
                    name: format!("node-{}", i),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_skips_disabled_targets() {
        let registry = TargetRegistry::new();
        registry.initialize(&targets()).await;

        assert_eq!(registry.len().await, 2);
        assert!(registry.get("off").await.is_none());

        let record = registry.get("prod").await.unwrap();
        assert!(record.healthy);
        assert!(record.state.nodes.is_empty());
        assert_eq!(record.state.target_name, "Production");
    }

    #[tokio::test]
    async fn test_update_state_replaces_and_heals() {
        let registry = TargetRegistry::new();
        registry.initialize(&targets()).await;

        registry
            .set_health("prod", false, Some("timeout".to_string()))
            .await
            .unwrap();
        registry.update_state("prod", state_with_nodes(3)).await.unwrap();
        registry.update_state("prod", state_with_nodes(1)).await.unwrap();

        let record = registry.get("prod").await.unwrap();
        assert!(record.healthy);
        assert!(record.last_error.is_none());
        assert_eq!(record.state.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_target() {
        let registry = TargetRegistry::new();
        registry.initialize(&targets()).await;

        assert_eq!(
            registry.update_state("off", TargetState::default()).await,
            Err(RegistryError::NotFound("off".to_string()))
        );
        assert!(registry.set_health("nope", false, None).await.is_err());
    }

    #[tokio::test]
    async fn test_set_health_keeps_state() {
        let registry = TargetRegistry::new();
        registry.initialize(&targets()).await;
        registry.update_state("prod", state_with_nodes(2)).await.unwrap();

        registry
            .set_health("prod", false, Some("connection refused".to_string()))
            .await
            .unwrap();

        let record = registry.get("prod").await.unwrap();
        assert!(!record.healthy);
        assert_eq!(record.last_error.as_deref(), Some("connection refused"));
        assert_eq!(record.state.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_summary() {
        let registry = TargetRegistry::new();
        registry.initialize(&targets()).await;
        registry.update_state("prod", state_with_nodes(3)).await.unwrap();
        registry.update_state("staging", state_with_nodes(2)).await.unwrap();
        registry.set_health("staging", false, None).await.unwrap();

        let (states, summary) = registry.snapshot().await;

        assert_eq!(states.len(), 2);
        assert_eq!(summary.total_targets, 2);
        assert_eq!(summary.healthy_targets, 1);
        assert_eq!(summary.unhealthy_targets, 1);
        assert_eq!(summary.total_monitored_nodes, 5);
    }

    #[tokio::test]
    async fn test_configs_sorted_by_id() {
        let registry = TargetRegistry::new();
        registry.initialize(&targets()).await;

        let ids: Vec<_> = registry.configs().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["prod", "staging"]);
    }
}
