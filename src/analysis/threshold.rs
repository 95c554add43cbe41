//! Fade classification thresholds.

use super::statistics::TransitionStatistics;
use serde::{Deserialize, Serialize};

/// Thresholds a transition must pass to count as a fade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FadeThresholds {
    /// Changed-block fraction that must be exceeded.
    pub ratio_threshold: f64,
    /// Coefficient of variation of changed-block scores that must not be exceeded.
    pub variance_threshold: f64,
}

impl Default for FadeThresholds {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.9,
            variance_threshold: 0.25,
        }
    }
}

impl FadeThresholds {
    /// Thresholds on the changed ratio and the score variation.
    pub fn new(ratio_threshold: f64, variance_threshold: f64) -> Self {
        Self {
            ratio_threshold,
            variance_threshold,
        }
    }

    /// Checks a transition; `Ok` means fade.
    pub fn check(&self, stats: &TransitionStatistics) -> Result<(), FadeRejection> {
        if stats.changed.count == 0 {
            return Err(FadeRejection::NoChange);
        }

        if stats.changed_ratio <= self.ratio_threshold {
            return Err(FadeRejection::Localized {
                observed: stats.changed_ratio,
                threshold: self.ratio_threshold,
            });
        }

        if stats.changed.coefficient_of_variation > self.variance_threshold {
            return Err(FadeRejection::Uneven {
                observed: stats.changed.coefficient_of_variation,
                threshold: self.variance_threshold,
            });
        }

        Ok(())
    }
}

/// Why a transition was not classified as a fade.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum FadeRejection {
    /// Nothing changed between the frames.
    #[error("no blocks changed")]
    NoChange,

    /// Too few blocks changed for a global transition.
    #[error("changed ratio {observed:.3} does not exceed {threshold:.3}")]
    Localized {
        /// Changed-block ratio of the transition.
        observed: f64,
        /// Ratio a fade must exceed.
        threshold: f64,
    },

    /// Changed blocks moved by visibly different amounts.
    #[error("score variation {observed:.3} exceeds {threshold:.3}")]
    Uneven {
        /// Coefficient of variation of the changed scores.
        observed: f64,
        /// Largest variation a fade may show.
        threshold: f64,
    },
}
