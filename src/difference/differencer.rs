//! Frame-to-frame block differencing.

use super::{Block, BlockGrid, DissimilarityMetric, MetricKind};
use crate::frame::{Frame, FrameError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while comparing two raw frames.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DifferenceError {
    #[error(
        "resolution mismatch: expected {}x{}, got {}x{}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    ResolutionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("channel mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: u8, actual: u8 },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Blocks whose content changed between two consecutive raw frames.
///
/// Alongside the changed set the map keeps the raw score of every block,
/// which fade classification needs, and a `forced` set of blocks the
/// correction engine pushed in regardless of their score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceMap {
    frame_index: u64,
    columns: u32,
    rows: u32,
    block_size: u32,
    scores: Vec<f64>,
    changed: BTreeSet<Block>,
    forced: BTreeSet<Block>,
}

impl DifferenceMap {
    /// A map with no changes, used for the identical-frame case.
    pub fn unchanged(frame_index: u64, grid: &BlockGrid) -> Self {
        Self {
            frame_index,
            columns: grid.columns(),
            rows: grid.rows(),
            block_size: grid.block_size(),
            scores: vec![0.0; grid.block_count()],
            changed: BTreeSet::new(),
            forced: BTreeSet::new(),
        }
    }

    /// Index of the current frame of the compared pair.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Grid size as `(columns, rows)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Returns true when no block needs upscaling.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.forced.is_empty()
    }

    /// Number of distinct blocks needing upscaling.
    pub fn len(&self) -> usize {
        self.changed.len() + self.forced.difference(&self.changed).count()
    }

    /// Blocks whose score exceeded the threshold.
    pub fn changed(&self) -> &BTreeSet<Block> {
        &self.changed
    }

    /// Blocks added by correction.
    pub fn forced(&self) -> &BTreeSet<Block> {
        &self.forced
    }

    /// Every block needing upscaling, row-major, without duplicates.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.changed.union(&self.forced)
    }

    /// Returns true if `block` needs upscaling.
    pub fn contains(&self, block: &Block) -> bool {
        self.changed.contains(block) || self.forced.contains(block)
    }

    /// Adds a block regardless of its score. Returns false if already present.
    pub fn force(&mut self, block: Block) -> bool {
        if self.changed.contains(&block) {
            return false;
        }
        self.forced.insert(block)
    }

    /// Score of every block, row-major.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Score of one block.
    pub fn score(&self, block: &Block) -> f64 {
        let index = block.grid_y as usize * self.columns as usize + block.grid_x as usize;
        self.scores.get(index).copied().unwrap_or(0.0)
    }

    /// Scores of the changed blocks, row-major.
    pub fn changed_scores(&self) -> Vec<f64> {
        self.changed.iter().map(|b| self.score(b)).collect()
    }

    /// Total blocks in the grid.
    pub fn total_blocks(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Fraction of grid blocks whose score exceeded the threshold.
    pub fn changed_ratio(&self) -> f64 {
        let total = self.total_blocks();
        if total == 0 {
            return 0.0;
        }
        self.changed.len() as f64 / total as f64
    }

    /// Grid block size in pixels.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }
}

/// Compares consecutive raw frames block by block.
///
/// Stateless: the caller owns the previous frame. The same input pair always
/// yields the same map; blocks are scored in parallel but each score is an
/// independent reduction.
#[derive(Debug)]
pub struct FrameDifferencer {
    metric: Box<dyn DissimilarityMetric>,
    threshold: f64,
}

impl FrameDifferencer {
    /// Differencer scoring blocks with `metric`; scores above `threshold`
    /// mark a block changed.
    pub fn new(metric: Box<dyn DissimilarityMetric>, threshold: f64) -> Self {
        Self { metric, threshold }
    }

    /// Builds a differencer for a configured metric.
    pub fn from_kind(kind: MetricKind, threshold: f64) -> Self {
        Self::new(kind.build(), threshold)
    }

    /// The change threshold, in metric units.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The metric in use.
    pub fn metric(&self) -> &dyn DissimilarityMetric {
        self.metric.as_ref()
    }

    /// Scores every block of `current` against `previous`.
    ///
    /// A block is changed iff its score strictly exceeds the threshold.
    pub fn diff(
        &self,
        previous: &Frame,
        current: &Frame,
        grid: &BlockGrid,
    ) -> Result<DifferenceMap, DifferenceError> {
        if previous.dimensions() != current.dimensions() {
            return Err(DifferenceError::ResolutionMismatch {
                expected: previous.dimensions(),
                actual: current.dimensions(),
            });
        }
        if !grid.matches(current.width(), current.height()) {
            return Err(DifferenceError::ResolutionMismatch {
                expected: (grid.width(), grid.height()),
                actual: current.dimensions(),
            });
        }
        if previous.channels() != current.channels() {
            return Err(DifferenceError::ChannelMismatch {
                expected: previous.channels(),
                actual: current.channels(),
            });
        }

        let scores = (0..grid.block_count())
            .into_par_iter()
            .map(|i| -> Result<f64, FrameError> {
                let rect = grid.block_at_index(i).rect();
                let a = previous.window(rect)?;
                let b = current.window(rect)?;
                Ok(self.metric.measure(&a, &b))
            })
            .collect::<Result<Vec<f64>, FrameError>>()?;

        let changed: BTreeSet<Block> = scores
            .iter()
            .enumerate()
            .filter(|&(_, &score)| score > self.threshold)
            .map(|(i, _)| grid.block_at_index(i))
            .collect();

        tracing::debug!(
            frame = current.index(),
            changed = changed.len(),
            total = grid.block_count(),
            metric = self.metric.name(),
            "Frame differenced"
        );

        Ok(DifferenceMap {
            frame_index: current.index(),
            columns: grid.columns(),
            rows: grid.rows(),
            block_size: grid.block_size(),
            scores,
            changed,
            forced: BTreeSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difference::MeanSquaredError;
    use crate::frame::Rect;
    use proptest::prelude::*;

    fn differencer() -> FrameDifferencer {
        FrameDifferencer::new(Box::new(MeanSquaredError), 8.0)
    }

    fn paint(frame: &mut Frame, rect: Rect, value: u8) {
        let patch = Frame::filled(rect.width, rect.height, frame.channels(), value, 0);
        frame.paste(&patch, rect.x, rect.y).unwrap();
    }

    #[test]
    fn test_identical_frames_empty_map() {
        let grid = BlockGrid::new(16, 16, 8).unwrap();
        let frame = Frame::filled(16, 16, 3, 90, 0);

        let map = differencer().diff(&frame, &frame, &grid).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.changed_ratio(), 0.0);
    }

    #[test]
    fn test_single_block_change_detected() {
        let grid = BlockGrid::new(16, 16, 8).unwrap();
        let previous = Frame::filled(16, 16, 1, 50, 0);
        let mut current = Frame::filled(16, 16, 1, 50, 1);
        paint(&mut current, Rect::new(0, 0, 8, 8), 200);

        let map = differencer().diff(&previous, &current, &grid).unwrap();
        assert_eq!(map.frame_index(), 1);
        assert_eq!(map.changed().iter().copied().collect::<Vec<_>>(), vec![Block::new(0, 0, 8)]);
        assert_eq!(map.score(&Block::new(0, 0, 8)), 150.0 * 150.0);
        assert_eq!(map.score(&Block::new(1, 1, 8)), 0.0);
    }

    #[test]
    fn test_change_below_threshold_ignored() {
        let grid = BlockGrid::new(16, 16, 8).unwrap();
        let previous = Frame::filled(16, 16, 1, 50, 0);
        let current = Frame::filled(16, 16, 1, 52, 1);

        let map = differencer().diff(&previous, &current, &grid).unwrap();
        assert!(map.is_empty());
        assert!(map.scores().iter().all(|&s| s == 4.0));
    }

    #[test]
    fn test_resolution_mismatch_is_an_error() {
        let grid = BlockGrid::new(16, 16, 8).unwrap();
        let previous = Frame::filled(16, 16, 1, 0, 0);
        let current = Frame::filled(16, 8, 1, 0, 1);

        assert_eq!(
            differencer().diff(&previous, &current, &grid).unwrap_err(),
            DifferenceError::ResolutionMismatch {
                expected: (16, 16),
                actual: (16, 8),
            }
        );
    }

    #[test]
    fn test_forced_blocks_join_the_map() {
        let grid = BlockGrid::new(16, 16, 8).unwrap();
        let mut map = DifferenceMap::unchanged(3, &grid);
        assert!(map.is_empty());

        assert!(map.force(Block::new(1, 0, 8)));
        assert!(!map.force(Block::new(1, 0, 8)));
        assert!(!map.is_empty());
        assert_eq!(map.len(), 1);
        assert!(map.changed().is_empty());
        assert!(map.contains(&Block::new(1, 0, 8)));
    }

    proptest! {
        #[test]
        fn prop_identical_frames_never_differ(
            seed in proptest::collection::vec(any::<u8>(), 24 * 16 * 3),
            threshold in 0.0f64..1000.0,
        ) {
            let grid = BlockGrid::new(24, 16, 8).unwrap();
            let frame = Frame::new(seed, 24, 16, 3, 0);
            let map = FrameDifferencer::from_kind(MetricKind::Mse, threshold)
                .diff(&frame, &frame, &grid)
                .unwrap();
            prop_assert!(map.is_empty());
        }

        #[test]
        fn prop_diff_is_deterministic(
            a in proptest::collection::vec(any::<u8>(), 16 * 16),
            b in proptest::collection::vec(any::<u8>(), 16 * 16),
        ) {
            let grid = BlockGrid::new(16, 16, 4).unwrap();
            let previous = Frame::new(a, 16, 16, 1, 0);
            let current = Frame::new(b, 16, 16, 1, 1);
            let differencer = FrameDifferencer::from_kind(MetricKind::Mad, 20.0);
            prop_assert_eq!(
                differencer.diff(&previous, &current, &grid).unwrap(),
                differencer.diff(&previous, &current, &grid).unwrap()
            );
        }
    }
}
