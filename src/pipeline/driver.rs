//! The per-frame state machine.

use super::{FrameKind, FrameSink, PipelineError, PipelineStats};
use crate::analysis::{FadeAssessment, FadeDetector, FadeThresholds};
use crate::compose::FrameCompositor;
use crate::config::{CorrectionConfig, PipelineConfig};
use crate::correction::{CorrectionEngine, CorrectionOutcome};
use crate::difference::{BlockGrid, DifferenceMap, FrameDifferencer};
use crate::frame::{Frame, FramePool, FrameSource, Rect};
use crate::regions::{BleedExpander, ExtractedRegion, RegionExtractor};
use crate::upscale::{DispatchError, Dispatcher, Purpose, UpscaledRegion};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Frames carried from one step to the next.
///
/// Owned by exactly one step at a time: a step takes it by value and hands
/// the updated state back.
#[derive(Debug, Clone)]
pub struct FrameState {
    /// The last raw frame.
    pub previous_raw: Frame,
    /// The last reconstructed frame.
    pub reconstructed: Frame,
}

/// What happened to one frame.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Frame index.
    pub index: u64,
    /// How the reconstruction was produced.
    pub kind: FrameKind,
    /// Differences against the previous frame, forced blocks included.
    /// `None` for the keyframe.
    pub difference: Option<DifferenceMap>,
    /// Fade classification. `None` for the keyframe.
    pub fade: Option<FadeAssessment>,
    /// Regions dispatched as patches, in raw coordinates.
    pub regions: Vec<Rect>,
    /// Upscaled patches, in the same order as `regions`.
    pub upscaled: Vec<UpscaledRegion>,
    /// Correction pass run on this frame, if it was due.
    pub correction: Option<CorrectionOutcome>,
    /// Blocks forced in by the previous correction pass.
    pub forced: usize,
}

/// Result of a successful step.
#[derive(Debug)]
pub struct Step {
    /// State for the next frame; `state.reconstructed` is the output frame.
    pub state: FrameState,
    /// What the step did.
    pub report: StepReport,
    /// The raw frame that left the window, for buffer reuse.
    pub retired: Option<Frame>,
}

/// Where the driver is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for frame 0.
    Init,
    /// Keyframe done, expecting `next_index`.
    Streaming { next_index: u64 },
    /// The source was exhausted.
    Done,
    /// Frame `index` could not be completed; nothing after it is processed.
    Failed { index: u64 },
}

/// Sequences the pipeline stages across a frame stream.
pub struct PipelineDriver {
    block_size: u32,
    differencer: FrameDifferencer,
    fade: FadeDetector,
    expander: BleedExpander,
    extractor: RegionExtractor,
    dispatcher: Dispatcher,
    compositor: FrameCompositor,
    correction: CorrectionEngine,
    grid: Option<BlockGrid>,
    state: DriverState,
    stats: PipelineStats,
    pool: FramePool,
}

impl PipelineDriver {
    /// Builds a driver around an already configured dispatcher.
    ///
    /// The dispatcher's scale factor wins over `config.scale_factor`; the
    /// two are expected to agree.
    pub fn new(
        config: &PipelineConfig,
        correction: &CorrectionConfig,
        dispatcher: Dispatcher,
    ) -> Self {
        let scale = dispatcher.scale_factor();
        if scale != config.scale_factor {
            warn!(
                configured = config.scale_factor,
                upscaler = scale,
                "Scale factor differs from upscaler, using upscaler's"
            );
        }

        Self {
            block_size: config.block_size,
            differencer: FrameDifferencer::from_kind(config.metric, config.difference_threshold),
            fade: FadeDetector::new(FadeThresholds::new(
                config.fade_ratio_threshold,
                config.fade_variance_threshold,
            )),
            expander: BleedExpander::new(config.bleed),
            extractor: RegionExtractor::new(),
            dispatcher,
            compositor: FrameCompositor::new(scale),
            correction: CorrectionEngine::new(
                config.correction_block_size,
                correction,
                config.metric.build(),
            ),
            grid: None,
            state: DriverState::Init,
            stats: PipelineStats::default(),
            pool: FramePool::default(),
        }
    }

    /// Current state machine position.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Totals so far, with dispatcher counters folded in.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = self.stats.clone();
        let dispatch = self.dispatcher.stats();
        stats.upscale_calls = dispatch.calls;
        stats.dispatch_retries = dispatch.retries;
        stats
    }

    /// The grid, once frame 0 fixed the resolution.
    pub fn grid(&self) -> Option<&BlockGrid> {
        self.grid.as_ref()
    }

    /// The dispatcher, for its counters and cancellation flag.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Correction state carried between frames.
    pub fn correction(&self) -> &CorrectionEngine {
        &self.correction
    }

    /// Raw buffers recycled between source and driver.
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Processes one raw frame.
    ///
    /// `state` must be `None` for frame 0 and the previous step's state
    /// afterwards. On error the driver moves to [`DriverState::Failed`] and
    /// rejects every later frame.
    pub fn step(&mut self, state: Option<FrameState>, raw: Frame) -> Result<Step, PipelineError> {
        let index = raw.index();
        let result = match self.state {
            DriverState::Init => self.keyframe(state, raw),
            DriverState::Streaming { next_index } => self.advance(next_index, state, raw),
            DriverState::Done => return Err(PipelineError::Finished),
            DriverState::Failed { index } => return Err(PipelineError::Halted { index }),
        };

        match result {
            Ok(step) => {
                self.state = DriverState::Streaming {
                    next_index: index + 1,
                };
                self.stats.record(&step.report);
                debug!(
                    frame = index,
                    kind = %step.report.kind,
                    regions = step.report.regions.len(),
                    forced = step.report.forced,
                    "Frame reconstructed"
                );
                Ok(step)
            }
            Err(error) => {
                self.state = DriverState::Failed { index };
                self.stats.failed_frame = Some(index);
                Err(error)
            }
        }
    }

    fn keyframe(&mut self, state: Option<FrameState>, raw: Frame) -> Result<Step, PipelineError> {
        if raw.index() != 0 {
            return Err(PipelineError::OutOfOrder {
                expected: 0,
                actual: raw.index(),
            });
        }
        if state.is_some() {
            warn!("Ignoring frame state passed with the keyframe");
        }
        raw.ensure_valid()?;
        let grid = BlockGrid::new(raw.width(), raw.height(), self.block_size)?;
        info!(
            width = raw.width(),
            height = raw.height(),
            block_size = self.block_size,
            blocks = grid.block_count(),
            scale = self.compositor.scale_factor(),
            "Stream started"
        );

        let (region, reconstructed) = self.full_frame(&raw)?;
        self.correction.reset();
        self.correction.commit_frame(0, &BTreeSet::new(), &[]);
        self.grid = Some(grid);

        let report = StepReport {
            index: 0,
            kind: FrameKind::Keyframe,
            difference: None,
            fade: None,
            regions: vec![region.region],
            upscaled: vec![region],
            correction: None,
            forced: 0,
        };
        Ok(Step {
            state: FrameState {
                previous_raw: raw,
                reconstructed,
            },
            report,
            retired: None,
        })
    }

    fn advance(
        &mut self,
        expected: u64,
        state: Option<FrameState>,
        raw: Frame,
    ) -> Result<Step, PipelineError> {
        let index = raw.index();
        if index != expected {
            return Err(PipelineError::OutOfOrder {
                expected,
                actual: index,
            });
        }
        let Some(FrameState {
            previous_raw,
            mut reconstructed,
        }) = state
        else {
            return Err(PipelineError::MissingState { index });
        };
        let Some(grid) = self.grid else {
            return Err(PipelineError::MissingState { index });
        };
        raw.ensure_valid()?;

        let mut map = self.differencer.diff(&previous_raw, &raw, &grid)?;
        let assessment = self.fade.assess(&previous_raw, &raw, &map, &grid);

        if assessment.is_fade() {
            let (region, fresh) = self.full_frame(&raw)?;
            self.correction.reset();
            self.correction.commit_frame(index, &BTreeSet::new(), &[]);

            let report = StepReport {
                index,
                kind: FrameKind::FadeFrame,
                difference: Some(map),
                fade: Some(assessment),
                regions: vec![region.region],
                upscaled: vec![region],
                correction: None,
                forced: 0,
            };
            return Ok(Step {
                state: FrameState {
                    previous_raw: raw,
                    reconstructed: fresh,
                },
                report,
                retired: Some(previous_raw),
            });
        }

        let consumed = self.correction.pending().clone();
        let forced = self.correction.apply_pending(&mut map);

        let regions = self.expander.expand(&map, raw.width(), raw.height());
        let pieces = self.extractor.extract(&raw, &regions)?;
        let upscaled = self.dispatcher.dispatch(index, &pieces, Purpose::Patch)?;
        self.compositor
            .compose_in_place(&mut reconstructed, &upscaled, raw.dimensions())?;
        reconstructed.set_index(index);

        let correction = if self.correction.is_due(index) {
            let outcome =
                self.correction
                    .verify(index, &raw, &reconstructed, &grid, &self.dispatcher)?;
            Some(outcome)
        } else {
            None
        };

        self.correction.commit_frame(index, &consumed, &regions);
        if let Some(outcome) = &correction {
            self.correction.commit_outcome(outcome);
        }

        let kind = match &correction {
            Some(outcome) if !outcome.skipped => FrameKind::CorrectionFrame,
            _ => FrameKind::PFrame,
        };
        let report = StepReport {
            index,
            kind,
            difference: Some(map),
            fade: Some(assessment),
            regions,
            upscaled,
            correction,
            forced,
        };
        Ok(Step {
            state: FrameState {
                previous_raw: raw,
                reconstructed,
            },
            report,
            retired: Some(previous_raw),
        })
    }

    /// Upscales the whole raw frame as one region.
    fn full_frame(&self, raw: &Frame) -> Result<(UpscaledRegion, Frame), PipelineError> {
        let whole = ExtractedRegion {
            region: raw.bounds(),
            image: raw.clone(),
        };
        let mut upscaled = self
            .dispatcher
            .dispatch(raw.index(), std::slice::from_ref(&whole), Purpose::Patch)?;
        let Some(region) = upscaled.pop() else {
            return Err(PipelineError::Halted { index: raw.index() });
        };
        let reconstructed = self
            .compositor
            .substitute(region.clone(), raw.dimensions(), raw.index())?;
        Ok((region, reconstructed))
    }

    /// Drives `source` to exhaustion, emitting every frame to `sink`.
    ///
    /// Stops at the first frame that cannot be completed and returns
    /// [`PipelineError::FrameFailed`] naming it; earlier frames were already
    /// emitted and are unaffected.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<PipelineStats, PipelineError> {
        if let Some(total) = source.frame_count_hint() {
            info!(frames = total, "Processing stream");
        }

        let mut state: Option<FrameState> = None;
        let mut next_index = 0u64;
        loop {
            if self.dispatcher.cancel_flag().is_cancelled() {
                let cancelled = DispatchError::Cancelled {
                    frame_index: next_index,
                };
                return Err(self.fail(sink, next_index, cancelled.into()));
            }

            let raw = match source.next_frame(self.pool.acquire()) {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(error) => return Err(self.fail(sink, next_index, error.into())),
            };
            let index = raw.index();

            let step = match self.step(state.take(), raw) {
                Ok(step) => step,
                Err(error) => return Err(self.fail(sink, index, error)),
            };
            if let Err(error) = sink.emit(&step.report, &step.state.reconstructed) {
                return Err(self.fail(sink, index, error.into()));
            }
            sink.progress(&self.stats());

            if let Some(retired) = step.retired {
                self.pool.release(retired.into_pixels());
            }
            state = Some(step.state);
            next_index = index + 1;
        }

        self.state = DriverState::Done;
        let stats = self.stats();
        sink.finish(&stats)?;
        info!(
            frames = stats.frames,
            keyframes = stats.keyframes,
            pframes = stats.pframes,
            corrections = stats.correction_frames,
            fades = stats.fade_frames,
            regions = stats.regions_dispatched,
            upscale_calls = stats.upscale_calls,
            buffers_reused = self.pool.reused(),
            "Stream finished"
        );
        Ok(stats)
    }

    fn fail(
        &mut self,
        sink: &mut dyn FrameSink,
        index: u64,
        error: PipelineError,
    ) -> PipelineError {
        self.state = DriverState::Failed { index };
        self.stats.failed_frame = Some(index);
        tracing::error!(frame = index, error = %error, "Frame failed, halting");
        sink.abort(&self.stats());
        PipelineError::FrameFailed {
            index,
            source: Box::new(error),
        }
    }
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("state", &self.state)
            .field("grid", &self.grid)
            .field("dispatcher", &self.dispatcher)
            .field("correction", &self.correction)
            .finish()
    }
}
