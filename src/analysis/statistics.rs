//! Summary statistics over block dissimilarity scores.

use crate::difference::{BlockGrid, DifferenceMap};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// Distribution of a set of block scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    /// Number of scores.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population variance.
    pub variance: f64,
    /// Standard deviation relative to the mean; 0 when the mean is 0.
    pub coefficient_of_variation: f64,
}

impl ScoreStatistics {
    /// Computes the statistics of `scores`.
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }

        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let coefficient_of_variation = if mean > 0.0 {
            variance.sqrt() / mean
        } else {
            0.0
        };

        Self {
            count: scores.len(),
            mean,
            variance,
            coefficient_of_variation,
        }
    }
}

/// What changed between two consecutive raw frames, in aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionStatistics {
    /// Fraction of grid blocks that changed.
    pub changed_ratio: f64,
    /// Distribution of the changed blocks' scores.
    pub changed: ScoreStatistics,
    /// Signed change of the mean sample value (positive = brighter).
    pub mean_shift: f64,
}

impl TransitionStatistics {
    /// Summarizes a transition from its difference map and the frame pair.
    pub fn analyze(previous: &Frame, current: &Frame, map: &DifferenceMap, grid: &BlockGrid) -> Self {
        let total = grid.block_count();
        let changed_ratio = if total == 0 {
            0.0
        } else {
            map.changed().len() as f64 / total as f64
        };

        Self {
            changed_ratio,
            changed: ScoreStatistics::from_scores(&map.changed_scores()),
            mean_shift: current.mean_sample() - previous.mean_sample(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_scores_have_zero_variation() {
        let stats = ScoreStatistics::from_scores(&[25.0; 10]);
        assert_eq!(stats.count, 10);
        assert_eq!(stats.mean, 25.0);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.coefficient_of_variation, 0.0);
    }

    #[test]
    fn test_spread_scores_have_high_variation() {
        let stats = ScoreStatistics::from_scores(&[1.0, 1.0, 1.0, 97.0]);
        assert_eq!(stats.mean, 25.0);
        assert!(stats.coefficient_of_variation > 1.0);
    }

    #[test]
    fn test_empty_scores() {
        assert_eq!(ScoreStatistics::from_scores(&[]), ScoreStatistics::default());
    }
}
