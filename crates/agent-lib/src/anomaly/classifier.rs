//! Layered anomaly decision policy
//!
//! A value is anomalous when any of these gates fires:
//! 1. Low variance: when the window's standard deviation is below the
//!    configured floor, only `value > threshold` is considered.
//! 2. Statistical outlier: z-score above 4 while the value is above 80%
//!    of the threshold.
//! 3. Hard ceiling: `value > threshold`.
//! 4. Trend break: distance from the EWMA above `max(3 * stddev, 5)` while
//!    the value is above 70% of the threshold.
//!
//! Short series skip the statistics entirely and are judged by the hard
//! ceiling alone.

use tracing::debug;

use crate::config::MetricParams;
use crate::stats::{compute_stats, SeriesStats};

/// Z-score beyond which a value is a statistical outlier
const Z_SCORE_LIMIT: f64 = 4.0;

/// Fraction of the threshold an outlier must reach to matter
const OUTLIER_MATERIALITY: f64 = 0.8;

/// Standard deviations from the EWMA that count as a trend break
const TREND_STD_DEV_MULTIPLIER: f64 = 3.0;

/// Smallest EWMA deviation that counts as a trend break
const MIN_EWMA_DEVIATION: f64 = 5.0;

/// Fraction of the threshold a trend break must reach to matter
const TREND_MATERIALITY: f64 = 0.7;

/// The gate that flagged a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Series shorter than the metric's minimum history, over threshold
    InsufficientHistory,
    /// Flat series, over threshold
    LowVariance,
    StatisticalOutlier,
    HardCeiling,
    TrendBreak,
}

/// Outcome of classifying one observation against its history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Gate that fired, `None` for a normal value
    pub gate: Option<Gate>,
    /// Window statistics, absent when history was too short
    pub stats: Option<SeriesStats>,
}

impl Verdict {
    pub fn is_anomaly(&self) -> bool {
        self.gate.is_some()
    }

    pub fn insufficient_history(&self) -> bool {
        self.stats.is_none()
    }
}

/// Decide which gate, if any, flags `value`
///
/// A series with zero deviation always takes the low-variance path, even
/// when `min_std_dev` is not positive, so no z-score is ever computed from
/// a zero divisor. Validated configurations keep `min_std_dev > 0`.
pub fn evaluate(
    value: f64,
    mean: f64,
    std_dev: f64,
    ewma: f64,
    threshold: f64,
    min_std_dev: f64,
) -> Option<Gate> {
    // A zero deviation would make the z-score meaningless
    if std_dev < min_std_dev || std_dev < f64::EPSILON {
        return (value > threshold).then_some(Gate::LowVariance);
    }

    let z_score = (value - mean).abs() / std_dev;
    if z_score > Z_SCORE_LIMIT && value > OUTLIER_MATERIALITY * threshold {
        return Some(Gate::StatisticalOutlier);
    }

    if value > threshold {
        return Some(Gate::HardCeiling);
    }

    let ewma_deviation = (value - ewma).abs();
    let trend_limit = (TREND_STD_DEV_MULTIPLIER * std_dev).max(MIN_EWMA_DEVIATION);
    if ewma_deviation > trend_limit && value > TREND_MATERIALITY * threshold {
        return Some(Gate::TrendBreak);
    }

    None
}

/// Whether `value` is anomalous given the window statistics
pub fn is_anomaly(
    value: f64,
    mean: f64,
    std_dev: f64,
    ewma: f64,
    threshold: f64,
    min_std_dev: f64,
) -> bool {
    evaluate(value, mean, std_dev, ewma, threshold, min_std_dev).is_some()
}

/// Classify the newest value of a series, applying the minimum-history gate
///
/// `history` must already contain `value` as its last element.
pub fn classify(value: f64, history: &[f64], params: &MetricParams, min_history: usize) -> Verdict {
    if history.len() < min_history {
        return Verdict {
            gate: (value > params.threshold).then_some(Gate::InsufficientHistory),
            stats: None,
        };
    }

    let stats = compute_stats(history, params.alpha);
    let gate = evaluate(
        value,
        stats.mean,
        stats.std_dev,
        stats.ewma,
        params.threshold,
        params.min_std_dev,
    );

    debug!(
        value = value,
        samples = history.len(),
        mean = stats.mean,
        std_dev = stats.std_dev,
        ewma = stats.ewma,
        threshold = params.threshold,
        min_std_dev = params.min_std_dev,
        gate = ?gate,
        "Anomaly check"
    );

    Verdict {
        gate,
        stats: Some(stats),
    }
}
