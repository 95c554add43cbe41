//! Drift correction.
//!
//! Unchanged regions are never re-upscaled, so small errors can survive
//! indefinitely. Every `correction_block_size` frames the
//! [`CorrectionEngine`] re-upscales a sample of blocks from scratch,
//! compares them with the reconstruction, and forces blocks that drifted
//! into the next frame's difference map.

mod engine;
mod record;
mod sampling;

pub use engine::{CorrectionEngine, CorrectionError, CorrectionOutcome};
pub use record::{CorrectionDivergence, CorrectionRecord, Remediation};
pub use sampling::{BlockSampler, SamplingMode};
