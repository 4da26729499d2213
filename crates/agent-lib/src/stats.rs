//! Summary statistics over a metric window
//!
//! Statistics are recomputed from the full window on every call; no
//! running state is kept between queries.

/// Mean, sample standard deviation and EWMA of a value sequence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub ewma: f64,
}

/// Compute statistics for `values` using smoothing factor `alpha`
///
/// - Empty input yields all zeros.
/// - Standard deviation uses Bessel's correction and is zero below two
///   samples.
/// - EWMA is seeded with the first value.
pub fn compute_stats(values: &[f64], alpha: f64) -> SeriesStats {
    let Some((&first, rest)) = values.split_first() else {
        return SeriesStats::default();
    };

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;

    // Two-pass variance for stability
    let std_dev = if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
        variance.sqrt()
    } else {
        0.0
    };

    let ewma = rest
        .iter()
        .fold(first, |ewma, v| alpha * v + (1.0 - alpha) * ewma);

    SeriesStats {
        mean,
        std_dev,
        ewma,
    }
}
