//! Pluggable pixel dissimilarity metrics.
//!
//! Any metric must return zero for identical windows and grow
//! monotonically with pixel divergence. Thresholds are expressed in the
//! units of whichever metric is configured.

use crate::frame::PixelWindow;
use serde::{Deserialize, Serialize};

/// Scores how different two equally-sized pixel windows are.
pub trait DissimilarityMetric: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Dissimilarity of `a` and `b`; both windows have the same shape.
    fn measure(&self, a: &PixelWindow<'_>, b: &PixelWindow<'_>) -> f64;
}

fn fold_samples(a: &PixelWindow<'_>, b: &PixelWindow<'_>, f: impl Fn(u8, u8) -> u64) -> u64 {
    debug_assert_eq!(a.rect().width, b.rect().width);
    debug_assert_eq!(a.rect().height, b.rect().height);
    debug_assert_eq!(a.channels(), b.channels());

    a.rows()
        .zip(b.rows())
        .map(|(ra, rb)| ra.iter().zip(rb).map(|(&x, &y)| f(x, y)).sum::<u64>())
        .sum()
}

/// Mean of squared per-sample differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl DissimilarityMetric for MeanSquaredError {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn measure(&self, a: &PixelWindow<'_>, b: &PixelWindow<'_>) -> f64 {
        let samples = a.sample_count();
        if samples == 0 {
            return 0.0;
        }
        let sum = fold_samples(a, b, |x, y| {
            let d = x.abs_diff(y) as u64;
            d * d
        });
        sum as f64 / samples as f64
    }
}

/// Mean of absolute per-sample differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsoluteDifference;

impl DissimilarityMetric for MeanAbsoluteDifference {
    fn name(&self) -> &'static str {
        "mad"
    }

    fn measure(&self, a: &PixelWindow<'_>, b: &PixelWindow<'_>) -> f64 {
        let samples = a.sample_count();
        if samples == 0 {
            return 0.0;
        }
        fold_samples(a, b, |x, y| x.abs_diff(y) as u64) as f64 / samples as f64
    }
}

/// Sum of absolute per-sample differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumAbsoluteDifference;

impl DissimilarityMetric for SumAbsoluteDifference {
    fn name(&self) -> &'static str {
        "sad"
    }

    fn measure(&self, a: &PixelWindow<'_>, b: &PixelWindow<'_>) -> f64 {
        fold_samples(a, b, |x, y| x.abs_diff(y) as u64) as f64
    }
}

/// Configurable metric selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// [`MeanSquaredError`].
    #[default]
    Mse,
    /// [`MeanAbsoluteDifference`].
    Mad,
    /// [`SumAbsoluteDifference`].
    Sad,
}

impl MetricKind {
    /// Instantiates the selected metric.
    pub fn build(self) -> Box<dyn DissimilarityMetric> {
        match self {
            MetricKind::Mse => Box::new(MeanSquaredError),
            MetricKind::Mad => Box::new(MeanAbsoluteDifference),
            MetricKind::Sad => Box::new(SumAbsoluteDifference),
        }
    }
}
