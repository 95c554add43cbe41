//! Frame buffers and the decoder-side frame stream.
//!
//! Raw frames arrive from a [`FrameSource`] at native resolution; the
//! reconstructed stream uses the same [`Frame`] type at the upscaled
//! resolution. Buffers retired by the pipeline go back through a
//! [`FramePool`] so the sliding window does not churn the allocator.

mod frame;
mod pool;
mod rect;
mod source;

pub use frame::{Frame, FrameError, PixelWindow};
pub use pool::FramePool;
pub use rect::Rect;
pub use source::{DirectorySource, FrameSource, SourceError, SyntheticSource, VecSource};
