//! Per-target observation log for the learn phase
//!
//! Each successful observation is scored with a simple health reward and
//! appended to a bounded per-target log.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

use crate::models::{TargetState, NODE_READY};

/// Reward lost for every node that is not ready
const NOT_READY_PENALTY: f64 = 0.5;

/// One scored observation
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub node_count: usize,
    pub reward: f64,
}

/// Reward for a snapshot: 1.0 minus a penalty per node that is not ready
pub fn reward(state: &TargetState) -> f64 {
    let not_ready = state
        .nodes
        .iter()
        .filter(|n| n.status != NODE_READY)
        .count();
    1.0 - NOT_READY_PENALTY * not_ready as f64
}

/// Bounded observation history per target
pub struct LearningLog {
    observations: DashMap<String, VecDeque<Observation>>,
    max_per_target: usize,
}

impl LearningLog {
    pub fn new(max_per_target: usize) -> Self {
        Self {
            observations: DashMap::new(),
            max_per_target: max_per_target.max(1),
        }
    }

    /// Score the snapshot and append it to the target's log
    pub fn learn(&self, target_id: &str, state: &TargetState) -> Observation {
        let observation = Observation {
            timestamp: Utc::now(),
            node_count: state.nodes.len(),
            reward: reward(state),
        };

        let mut log = self.observations.entry(target_id.to_string()).or_default();
        log.push_back(observation.clone());
        while log.len() > self.max_per_target {
            log.pop_front();
        }

        debug!(
            target_id = %target_id,
            reward = observation.reward,
            observations = log.len(),
            "Recorded observation"
        );

        observation
    }

    /// Observations for a target, oldest first
    pub fn observations(&self, target_id: &str) -> Vec<Observation> {
        self.observations
            .get(target_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Mean reward over a target's log
    pub fn average_reward(&self, target_id: &str) -> Option<f64> {
        let log = self.observations.get(target_id)?;
        if log.is_empty() {
            return None;
        }
        Some(log.iter().map(|o| o.reward).sum::<f64>() / log.len() as f64)
    }
}
