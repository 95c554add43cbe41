use super::{FrameKind, StepReport};
use serde::{Deserialize, Serialize};

/// Running totals for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Frames emitted.
    pub frames: u64,
    /// Frame 0 only.
    pub keyframes: u64,
    /// Patched frames without a completed correction pass.
    pub pframes: u64,
    /// Patched frames with a completed correction pass.
    pub correction_frames: u64,
    /// Frames replaced wholesale after a fade.
    pub fade_frames: u64,
    /// Patch regions sent to the upscaler.
    pub regions_dispatched: u64,
    /// Raw pixels covered by patch regions.
    pub pixels_dispatched: u64,
    /// Upscaler invocations, retries and verification included.
    pub upscale_calls: u64,
    /// Upscaler invocations that were retries.
    pub dispatch_retries: u64,
    /// Correction passes that ran.
    pub corrections_run: u64,
    /// Blocks marked dirty by correction.
    pub dirty_blocks: u64,
    /// Blocks forced into a difference map by correction.
    pub forced_blocks: u64,
    /// Changed-block fraction of the most recent transition.
    pub last_changed_ratio: f64,
    /// Index of the most recent emitted frame.
    pub last_frame_index: Option<u64>,
    /// Index of the frame that halted the run, if any.
    pub failed_frame: Option<u64>,
}

impl PipelineStats {
    /// Folds one emitted frame into the totals.
    pub fn record(&mut self, report: &StepReport) {
        self.frames += 1;
        match report.kind {
            FrameKind::Keyframe => self.keyframes += 1,
            FrameKind::PFrame => self.pframes += 1,
            FrameKind::CorrectionFrame => self.correction_frames += 1,
            FrameKind::FadeFrame => self.fade_frames += 1,
        }
        self.regions_dispatched += report.regions.len() as u64;
        self.pixels_dispatched += report.regions.iter().map(|r| r.area()).sum::<u64>();
        self.forced_blocks += report.forced as u64;
        if let Some(outcome) = report.correction.as_ref().filter(|o| !o.skipped) {
            self.corrections_run += 1;
            self.dirty_blocks += outcome.diverged() as u64;
        }
        if let Some(map) = &report.difference {
            self.last_changed_ratio = map.changed_ratio();
        }
        self.last_frame_index = Some(report.index);
    }

    /// Frames emitted of the given kind.
    pub fn count(&self, kind: FrameKind) -> u64 {
        match kind {
            FrameKind::Keyframe => self.keyframes,
            FrameKind::PFrame => self.pframes,
            FrameKind::CorrectionFrame => self.correction_frames,
            FrameKind::FadeFrame => self.fade_frames,
        }
    }
}
