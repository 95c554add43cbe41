//! Periodic verification of the reconstruction against fresh upscales.

use super::{BlockSampler, CorrectionDivergence, CorrectionRecord, Remediation};
use crate::config::CorrectionConfig;
use crate::difference::{Block, BlockGrid, DifferenceMap, DissimilarityMetric};
use crate::frame::{Frame, FrameError, Rect};
use crate::regions::RegionExtractor;
use crate::upscale::{DispatchError, Dispatcher, Purpose};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

/// Errors that abort a correction pass.
///
/// A verification whose upscale exhausted its retries is not one of them;
/// it is logged and the pass is skipped.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error)]
pub enum CorrectionError {
    #[error("correction cancelled at frame {frame_index}")]
    Cancelled { frame_index: u64 },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// What one correction pass found.
#[derive(Debug, Clone, Default)]
pub struct CorrectionOutcome {
    /// Frame the pass ran on.
    pub frame_index: u64,
    /// Blocks that were verified.
    pub sampled: Vec<Block>,
    /// One record per verified block.
    pub records: Vec<CorrectionRecord>,
    /// Blocks to force into the next frame, remediation applied.
    pub dirty: BTreeSet<Block>,
    /// The verification upscale failed and nothing was checked.
    pub skipped: bool,
}

impl CorrectionOutcome {
    /// Number of verified blocks that drifted.
    pub fn diverged(&self) -> usize {
        self.records.iter().filter(|r| r.dirty).count()
    }
}

/// Tracks recent pastes, runs correction passes and carries dirty blocks
/// over to the following frame.
///
/// [`verify`](Self::verify) only reads state. The mutating methods are
/// meant to be called after a frame is known to have succeeded, so a
/// failed frame leaves the engine as it was.
pub struct CorrectionEngine {
    cadence: u32,
    tolerance: f64,
    sweep_blocks: usize,
    remediation: Remediation,
    retention_frames: u64,
    sampler: BlockSampler,
    metric: Box<dyn DissimilarityMetric>,
    /// Regions pasted in the last `cadence` frames, by frame index.
    recent: VecDeque<(u64, Vec<Rect>)>,
    records: VecDeque<CorrectionRecord>,
    pending: BTreeSet<Block>,
    passes: u64,
    divergences: u64,
}

impl CorrectionEngine {
    /// Engine running a pass every `cadence` frames, comparing with
    /// `metric`.
    pub fn new(cadence: u32, config: &CorrectionConfig, metric: Box<dyn DissimilarityMetric>) -> Self {
        Self {
            cadence: cadence.max(1),
            tolerance: config.tolerance,
            sweep_blocks: config.sweep_blocks,
            remediation: config.remediation,
            retention_frames: config.retention_frames,
            sampler: BlockSampler::new(config.sampling, config.seed),
            metric,
            recent: VecDeque::new(),
            records: VecDeque::new(),
            pending: BTreeSet::new(),
            passes: 0,
            divergences: 0,
        }
    }

    /// Frames between correction passes.
    pub fn cadence(&self) -> u32 {
        self.cadence
    }

    /// Whether `frame_index` is a correction frame.
    pub fn is_due(&self, frame_index: u64) -> bool {
        frame_index > 0 && frame_index % u64::from(self.cadence) == 0
    }

    /// Blocks carried over from the last correction pass.
    pub fn pending(&self) -> &BTreeSet<Block> {
        &self.pending
    }

    /// Forces every pending block into `map`; returns how many were new.
    pub fn apply_pending(&self, map: &mut DifferenceMap) -> usize {
        self.pending.iter().filter(|&&block| map.force(block)).count()
    }

    /// Records kept within the retention window.
    pub fn records(&self) -> impl Iterator<Item = &CorrectionRecord> + '_ {
        self.records.iter()
    }

    /// Correction passes committed so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Diverged blocks found so far.
    pub fn divergences(&self) -> u64 {
        self.divergences
    }

    /// Blocks a pass on `frame_index` would verify.
    ///
    /// Seam blocks come first: blocks within one block of a recently pasted
    /// region's edge that the region does not fully cover. The sampler
    /// tops that up with `sweep_blocks` extra blocks.
    pub fn select_samples(&self, frame_index: u64, grid: &BlockGrid) -> Vec<Block> {
        let mut selected = BTreeSet::new();
        for (_, regions) in &self.recent {
            for region in regions {
                let around = region.grow_clamped(grid.block_size(), grid.width(), grid.height());
                selected.extend(
                    grid.blocks_overlapping(around)
                        .filter(|block| !region.contains(&block.rect())),
                );
            }
        }

        let round = frame_index / u64::from(self.cadence);
        selected.extend(self.sampler.pick(round, grid, self.sweep_blocks));
        selected.into_iter().collect()
    }

    /// Re-upscales the sampled blocks of `current` and compares them with
    /// the same area of `reconstructed`.
    pub fn verify(
        &self,
        frame_index: u64,
        current: &Frame,
        reconstructed: &Frame,
        grid: &BlockGrid,
        dispatcher: &Dispatcher,
    ) -> Result<CorrectionOutcome, CorrectionError> {
        let sampled = self.select_samples(frame_index, grid);
        let mut outcome = CorrectionOutcome {
            frame_index,
            ..Default::default()
        };
        if sampled.is_empty() {
            return Ok(outcome);
        }

        let rects: Vec<Rect> = sampled.iter().map(Block::rect).collect();
        let pieces = RegionExtractor::new().extract(current, &rects)?;
        let fresh = match dispatcher.dispatch(frame_index, &pieces, Purpose::Verification) {
            Ok(fresh) => fresh,
            Err(DispatchError::Cancelled { frame_index }) => {
                return Err(CorrectionError::Cancelled { frame_index });
            }
            Err(error) => {
                tracing::warn!(
                    frame = frame_index,
                    error = %error,
                    "Verification upscale failed, skipping correction pass"
                );
                outcome.sampled = sampled;
                outcome.skipped = true;
                return Ok(outcome);
            }
        };

        let scale = dispatcher.scale_factor();
        for (block, upscaled) in sampled.iter().zip(&fresh) {
            let predicted = reconstructed.window(block.rect().scaled(scale))?;
            let truth = upscaled.image.window(upscaled.image.bounds())?;
            let residual = self.metric.measure(&predicted, &truth);
            let dirty = residual > self.tolerance;

            if dirty {
                let divergence = CorrectionDivergence {
                    frame_index,
                    block: *block,
                    residual,
                    tolerance: self.tolerance,
                };
                tracing::warn!(frame = frame_index, block = %block, residual, "{divergence}");
                outcome.dirty.insert(*block);
                if self.remediation == Remediation::Neighbors {
                    outcome.dirty.extend(grid.neighbors(*block));
                }
            }
            outcome.records.push(CorrectionRecord {
                frame_index,
                block: *block,
                residual,
                dirty,
            });
        }
        outcome.sampled = sampled;

        tracing::debug!(
            frame = frame_index,
            sampled = outcome.sampled.len(),
            diverged = outcome.diverged(),
            metric = self.metric.name(),
            "Correction pass complete"
        );
        Ok(outcome)
    }

    /// Commits a successful frame: drops the pending blocks it consumed
    /// and remembers where it pasted.
    pub fn commit_frame(&mut self, frame_index: u64, consumed: &BTreeSet<Block>, pasted: &[Rect]) {
        self.pending.retain(|block| !consumed.contains(block));
        if !pasted.is_empty() {
            self.recent.push_back((frame_index, pasted.to_vec()));
        }
        let cadence = u64::from(self.cadence);
        while let Some(&(index, _)) = self.recent.front() {
            if index + cadence > frame_index {
                break;
            }
            self.recent.pop_front();
        }
    }

    /// Commits a correction pass: its dirty blocks become pending.
    pub fn commit_outcome(&mut self, outcome: &CorrectionOutcome) {
        if outcome.skipped {
            return;
        }
        self.passes += 1;
        self.divergences += outcome.diverged() as u64;
        self.pending.extend(outcome.dirty.iter().copied());
        self.records.extend(outcome.records.iter().copied());

        while let Some(record) = self.records.front() {
            if record.frame_index + self.retention_frames > outcome.frame_index {
                break;
            }
            self.records.pop_front();
        }
    }

    /// Forgets paste history and pending blocks after a full-frame
    /// substitution, which makes every block fresh.
    pub fn reset(&mut self) {
        self.recent.clear();
        self.pending.clear();
    }
}

impl std::fmt::Debug for CorrectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionEngine")
            .field("cadence", &self.cadence)
            .field("tolerance", &self.tolerance)
            .field("metric", &self.metric.name())
            .field("pending", &self.pending.len())
            .field("passes", &self.passes)
            .finish()
    }
}
