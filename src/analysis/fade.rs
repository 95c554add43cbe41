//! Fade detection.

use super::{FadeRejection, FadeThresholds, TransitionStatistics};
use crate::difference::{BlockGrid, DifferenceMap};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// Outcome of classifying one transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FadeAssessment {
    /// Index of the current frame.
    pub frame_index: u64,
    /// Aggregate transition statistics.
    pub statistics: TransitionStatistics,
    /// Why the transition is not a fade, if it is not.
    pub rejection: Option<FadeRejection>,
}

impl FadeAssessment {
    /// Returns true if the transition is a fade.
    pub fn is_fade(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Classifies transitions as localized changes or global fades.
#[derive(Debug, Clone, Default)]
pub struct FadeDetector {
    thresholds: FadeThresholds,
}

impl FadeDetector {
    /// Detector applying `thresholds`.
    pub fn new(thresholds: FadeThresholds) -> Self {
        Self { thresholds }
    }

    /// Returns the active thresholds.
    pub fn thresholds(&self) -> &FadeThresholds {
        &self.thresholds
    }

    /// Returns true if the transition should be handled as a full-frame fade.
    pub fn classify(
        &self,
        previous: &Frame,
        current: &Frame,
        map: &DifferenceMap,
        grid: &BlockGrid,
    ) -> bool {
        self.assess(previous, current, map, grid).is_fade()
    }

    /// Classifies a transition and keeps the statistics behind the verdict.
    pub fn assess(
        &self,
        previous: &Frame,
        current: &Frame,
        map: &DifferenceMap,
        grid: &BlockGrid,
    ) -> FadeAssessment {
        let statistics = TransitionStatistics::analyze(previous, current, map, grid);
        let rejection = self.thresholds.check(&statistics).err();

        if rejection.is_none() {
            tracing::info!(
                frame = current.index(),
                changed_ratio = statistics.changed_ratio,
                variation = statistics.changed.coefficient_of_variation,
                mean_shift = statistics.mean_shift,
                "Fade detected"
            );
        } else {
            tracing::trace!(
                frame = current.index(),
                changed_ratio = statistics.changed_ratio,
                "Transition is localized"
            );
        }

        FadeAssessment {
            frame_index: current.index(),
            statistics,
            rejection,
        }
    }
}
