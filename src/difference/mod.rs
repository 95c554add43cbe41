//! Block-granularity change detection.
//!
//! A frame is tiled by a [`BlockGrid`]; the [`FrameDifferencer`] scores every
//! block of the current raw frame against the previous one with a pluggable
//! [`DissimilarityMetric`] and reports the blocks that changed as a
//! [`DifferenceMap`]. An empty map means no upscale work for that frame.

mod differencer;
mod grid;
mod metric;

pub use differencer::{DifferenceError, DifferenceMap, FrameDifferencer};
pub use grid::{Block, BlockGrid, GridError};
pub use metric::{
    DissimilarityMetric, MeanAbsoluteDifference, MeanSquaredError, MetricKind,
    SumAbsoluteDifference,
};
