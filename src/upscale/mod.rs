//! Boundary to the external neural upscaler.
//!
//! The model itself is out of scope; the pipeline only needs the
//! [`Upscaler`] contract: a raw sub-image in, the same sub-image at
//! `scale_factor` times the size out, or a failure. The [`Dispatcher`]
//! fans regions out to it in parallel with bounded retries.

mod dispatch;
mod upscaler;

pub use dispatch::{CancelFlag, DispatchError, DispatchStats, Dispatcher, UpscaledRegion};
pub use upscaler::{NearestUpscaler, Purpose, UpscaleError, UpscaleRequest, Upscaler};
