//! Reconstructing upscaled frames from the previous reconstruction plus
//! freshly upscaled regions.

mod compositor;

pub use compositor::{CompositeError, FrameCompositor};
