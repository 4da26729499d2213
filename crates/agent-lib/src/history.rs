//! Bounded metric history
//!
//! All series share a single sample budget. Two eviction policies are
//! available:
//! - `Global`: one FIFO across every key. When full, the oldest sample of
//!   any series is dropped, so a busy target can push a quiet target's
//!   whole history out of the buffer.
//! - `PerKey`: one queue per series under the same total budget. When
//!   full, the oldest sample of the largest series is dropped.
//!
//! The store is not synchronized; callers serialize access (see
//! `detector::DetectionEngine`).

use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};

use crate::models::{MetricKey, MetricSample};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Single FIFO shared by all series
    #[default]
    Global,
    /// Per-series queues sharing one total budget
    PerKey,
}

/// Bounded, keyed append log of metric samples
pub struct MetricHistoryStore {
    max_size: usize,
    backend: Backend,
}

enum Backend {
    Global(VecDeque<MetricSample>),
    PerKey {
        series: HashMap<MetricKey, VecDeque<Entry>>,
        total: usize,
        next_seq: u64,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    value: f64,
}

impl MetricHistoryStore {
    pub fn new(max_size: usize, policy: EvictionPolicy) -> Self {
        let backend = match policy {
            EvictionPolicy::Global => Backend::Global(VecDeque::with_capacity(max_size.min(10_000))),
            EvictionPolicy::PerKey => Backend::PerKey {
                series: HashMap::new(),
                total: 0,
                next_seq: 0,
            },
        };

        Self { max_size, backend }
    }

    pub fn policy(&self) -> EvictionPolicy {
        match self.backend {
            Backend::Global(_) => EvictionPolicy::Global,
            Backend::PerKey { .. } => EvictionPolicy::PerKey,
        }
    }

    /// Append a sample, evicting until the store is back within budget
    pub fn record(&mut self, key: MetricKey, value: f64) {
        let max_size = self.max_size;

        match &mut self.backend {
            Backend::Global(samples) => {
                samples.push_back(MetricSample {
                    timestamp: Utc::now(),
                    key,
                    value,
                });
                while samples.len() > max_size {
                    samples.pop_front();
                }
            }
            Backend::PerKey {
                series,
                total,
                next_seq,
            } => {
                let seq = *next_seq;
                *next_seq += 1;
                series.entry(key).or_default().push_back(Entry { seq, value });
                *total += 1;

                while *total > max_size {
                    if !evict_from_largest(series) {
                        break;
                    }
                    *total -= 1;
                }
            }
        }
    }

    /// All values recorded for a key, oldest first
    pub fn query(&self, key: &MetricKey) -> Vec<f64> {
        match &self.backend {
            Backend::Global(samples) => samples
                .iter()
                .filter(|s| &s.key == key)
                .map(|s| s.value)
                .collect(),
            Backend::PerKey { series, .. } => series
                .get(key)
                .map(|entries| entries.iter().map(|e| e.value).collect())
                .unwrap_or_default(),
        }
    }

    /// Total number of samples across all keys
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Global(samples) => samples.len(),
            Backend::PerKey { total, .. } => *total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

/// Drop the oldest sample of the largest series; ties go to the series
/// holding the oldest sample
fn evict_from_largest(series: &mut HashMap<MetricKey, VecDeque<Entry>>) -> bool {
    let victim = series
        .iter()
        .filter_map(|(key, entries)| entries.front().map(|front| (key, entries.len(), front.seq)))
        .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
        .map(|(key, _, _)| key.clone());

    let Some(key) = victim else {
        return false;
    };

    if let Some(entries) = series.get_mut(&key) {
        entries.pop_front();
        if entries.is_empty() {
            series.remove(&key);
        }
    }
    true
}
