//! Frame sequencing.
//!
//! The [`PipelineDriver`] runs every raw frame through differencing, fade
//! classification, region dispatch, composition, and periodic correction,
//! and emits reconstructed frames to a [`FrameSink`] in index order.
//!
//! ```text
//! Init → Keyframe(0) → {PFrame | CorrectionFrame | FadeFrame}* → Done
//! ```

mod driver;
mod error;
mod kind;
mod sink;
mod stats;

#[cfg(test)]
mod scenarios;

pub use driver::{DriverState, FrameState, PipelineDriver, Step, StepReport};
pub use error::PipelineError;
pub use kind::FrameKind;
pub use sink::{CollectingSink, FrameSink, SinkError};
pub use stats::PipelineStats;
