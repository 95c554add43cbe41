//! Transition statistics and fade classification.
//!
//! A fade (or any scene-wide lighting shift) marks nearly every block as
//! changed with similar scores. Patching such a frame region by region is
//! worse than one full-frame upscale, so the pipeline asks the
//! [`FadeDetector`] before expanding regions.

mod fade;
mod statistics;
mod threshold;

pub use fade::{FadeAssessment, FadeDetector};
pub use statistics::{ScoreStatistics, TransitionStatistics};
pub use threshold::{FadeRejection, FadeThresholds};
