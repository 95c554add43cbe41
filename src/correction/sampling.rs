//! Choice of extra blocks to verify on a correction frame.

use crate::difference::{Block, BlockGrid};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// How the extra blocks are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Consecutive row-major blocks, advancing each round, so every block is
    /// revisited after `block_count / count` rounds.
    #[default]
    Sweep,
    /// A seeded uniform draw per round; reproducible for a given seed.
    Random,
}

/// Picks blocks for a correction round.
///
/// Stateless: the pick depends only on the round number, so retrying a
/// frame selects the same blocks.
#[derive(Debug, Clone, Copy)]
pub struct BlockSampler {
    mode: SamplingMode,
    seed: u64,
}

impl BlockSampler {
    /// Sampler in `mode`; `seed` fixes the random draws.
    pub fn new(mode: SamplingMode, seed: u64) -> Self {
        Self { mode, seed }
    }

    /// Returns up to `count` distinct blocks for `round`.
    pub fn pick(&self, round: u64, grid: &BlockGrid, count: usize) -> Vec<Block> {
        let total = grid.block_count();
        let count = count.min(total);
        if count == 0 {
            return Vec::new();
        }

        match self.mode {
            SamplingMode::Sweep => {
                let start = ((round as u128 * count as u128) % total as u128) as usize;
                (0..count)
                    .map(|i| grid.block_at_index((start + i) % total))
                    .collect()
            }
            SamplingMode::Random => {
                let mut rng =
                    ChaCha8Rng::seed_from_u64(self.seed ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15));
                let mut indices: Vec<usize> = (0..total).collect();
                // Partial Fisher-Yates: the first `count` slots end up uniform.
                for i in 0..count {
                    let j = i + (rng.next_u64() % (total - i) as u64) as usize;
                    indices.swap(i, j);
                }
                indices[..count]
                    .iter()
                    .map(|&i| grid.block_at_index(i))
                    .collect()
            }
        }
    }
}
