//! Anomaly detection for target snapshots
//!
//! This module provides:
//! - The layered classifier (threshold, z-score and EWMA gates)
//! - The detection pass that records history and emits anomalies
//! - A mutex-guarded engine shared by concurrently polled targets

mod classifier;
mod detector;

pub use classifier::{classify, evaluate, is_anomaly, Gate, Verdict};
pub use detector::{
    DetectionEngine, DetectionScope, Detector, PROBLEMATIC_REASONS, RECURRING_WARNING_COUNT,
};
