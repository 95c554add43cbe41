//! Correction records and remediation policy.

use crate::difference::Block;
use serde::{Deserialize, Serialize};

/// Result of verifying one block on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// Frame the verification ran on.
    pub frame_index: u64,
    /// Verified block.
    pub block: Block,
    /// Dissimilarity between the reconstruction and a fresh upscale.
    pub residual: f64,
    /// Whether the residual exceeded the tolerance.
    pub dirty: bool,
}

/// A block whose reconstruction drifted past tolerance.
///
/// Logged and remediated on the next frame; never a run failure.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("block {block} drifted by {residual:.2} at frame {frame_index} (tolerance {tolerance:.2})")]
pub struct CorrectionDivergence {
    /// Frame the pass ran on.
    pub frame_index: u64,
    /// Block that diverged.
    pub block: Block,
    /// Measured dissimilarity.
    pub residual: f64,
    /// Configured limit it exceeded.
    pub tolerance: f64,
}

/// Which blocks a divergence forces into the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Remediation {
    /// Only the block that diverged.
    #[default]
    Block,
    /// The block and its eight neighbours.
    Neighbors,
}
