//! Prometheus metrics for pipeline runs.
//!
//! # Metrics Exposed
//!
//! ## Frames
//! - `patchscale_frames_total{kind}` - Frames emitted, by frame kind
//! - `patchscale_last_frame_index` - Index of the last emitted frame
//! - `patchscale_failed` - 1 once a frame failed and the run halted
//!
//! ## Dispatch
//! - `patchscale_regions_dispatched_total` - Patch regions sent to the upscaler
//! - `patchscale_pixels_dispatched_total` - Raw pixels covered by those regions
//! - `patchscale_upscale_calls_total` - Upscaler invocations, retries included
//! - `patchscale_dispatch_retries_total` - Upscaler invocations that were retries
//!
//! ## Differencing and correction
//! - `patchscale_changed_ratio` - Changed-block fraction of the last transition
//! - `patchscale_corrections_total` - Correction passes run
//! - `patchscale_dirty_blocks_total` - Blocks found drifted
//! - `patchscale_forced_blocks_total` - Blocks forced into a difference map
//!
//! # Example
//!
//! ```no_run
//! use patchscale::metrics::{MetricsRegistry, MetricsSnapshot};
//! use patchscale::pipeline::PipelineStats;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot::from_stats(&PipelineStats::default()));
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
