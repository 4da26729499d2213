//! State collection from monitored targets
//!
//! A collector turns a target configuration into a `TargetState` snapshot.
//! Talking to a target's native API is the collector's business; the
//! detection engine only ever sees snapshots.

mod file;


pub use file::FileCollector;

use crate::config::TargetConfig;
use crate::error::CollectionError;
use crate::models::TargetState;

pub use async_trait::async_trait;

/// Trait for target state collection implementations
#[async_trait]
pub trait StateCollector: Send + Sync {
    /// Observe the current state of a target
    async fn observe(&self, target: &TargetConfig) -> Result<TargetState, CollectionError>;
}
