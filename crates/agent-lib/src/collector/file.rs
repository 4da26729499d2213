//! Snapshot files on disk
//!
//! Reads one JSON document per target, either from the path named by the
//! target's `source` or from `<root>/<target-id>.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::StateCollector;
use crate::config::TargetConfig;
use crate::error::CollectionError;
use crate::models::TargetState;

/// Collector reading JSON snapshots from a directory
pub struct FileCollector {
    root: PathBuf,
}

impl FileCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the snapshot file for a target
    pub fn snapshot_path(&self, target: &TargetConfig) -> PathBuf {
        match target.source.as_deref() {
            Some(source) if Path::new(source).is_absolute() => PathBuf::from(source),
            Some(source) => self.root.join(source),
            None => self.root.join(format!("{}.json", target.id)),
        }
    }

    /// Decode a snapshot and bind it to the target it was read for
    pub fn parse_snapshot(target: &TargetConfig, content: &str) -> Result<TargetState, CollectionError> {
        let mut state: TargetState =
            serde_json::from_str(content).map_err(|source| CollectionError::Decode {
                target: target.id.clone(),
                source,
            })?;

        if !state.target_id.is_empty() && state.target_id != target.id {
            return Err(CollectionError::TargetMismatch {
                expected: target.id.clone(),
                found: state.target_id,
            });
        }

        state.target_id = target.id.clone();
        state.target_name = target.name.clone();

        // Collectors may report raw quantities instead of percentages
        state.nodes = std::mem::take(&mut state.nodes)
            .into_iter()
            .map(|node| {
                if node.cpu_capacity.is_empty() && node.memory_capacity.is_empty() {
                    node
                } else {
                    node.with_raw_usage()
                }
            })
            .collect();

        Ok(state)
    }
}

#[async_trait]
impl StateCollector for FileCollector {
    async fn observe(&self, target: &TargetConfig) -> Result<TargetState, CollectionError> {
        let path = self.snapshot_path(target);

        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| CollectionError::Io {
                target: target.id.clone(),
                source,
            })?;

        let state = Self::parse_snapshot(target, &content)?;

        debug!(
            target_id = %target.id,
            path = %path.display(),
            nodes = state.nodes.len(),
            namespaces = state.resources.len(),
            events = state.events.len(),
            "Read target snapshot"
        );

        Ok(state)
    }
}
