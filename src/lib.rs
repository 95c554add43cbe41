//! Patchscale: incremental video upscaling.
//!
//! Instead of upscaling every pixel of every frame, the pipeline finds the
//! blocks that changed since the previous frame, upscales only padded
//! regions around them, and pastes the results onto the previous
//! reconstructed frame.
//!
//! # Architecture
//!
//! ```text
//! frame source → difference → analysis (fade?) → regions → upscale → compose → sink
//!                                                                       ↓
//!                                                               correction (periodic)
//! ```
//!
//! # Design Principles
//!
//! - **Never emit partial frames**: a frame is emitted only once every one
//!   of its regions was upscaled and composited
//! - **Explicit state**: the previous raw and reconstructed frames move from
//!   step to step by value
//! - **Bounded drift**: sampled blocks are re-verified every
//!   `correction_block_size` frames
//! - **The upscaler is a boundary**: any [`upscale::Upscaler`] can be plugged in
//!
//! # Example
//!
//! ```no_run
//! use patchscale::{
//!     config::{CorrectionConfig, PipelineConfig},
//!     frame::SyntheticSource,
//!     pipeline::{CollectingSink, PipelineDriver},
//!     upscale::{Dispatcher, NearestUpscaler},
//! };
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::default();
//! let dispatcher = Dispatcher::new(
//!     Arc::new(NearestUpscaler::new(config.scale_factor)),
//!     config.max_dispatch_retries,
//!     config.max_concurrent_dispatches,
//! );
//! let mut driver = PipelineDriver::new(&config, &CorrectionConfig::default(), dispatcher);
//!
//! let mut source = SyntheticSource::new(64, 64, 8, 30).unwrap();
//! let mut sink = CollectingSink::new();
//! let stats = driver.run(&mut source, &mut sink).unwrap();
//! println!("{} frames, {} regions upscaled", stats.frames, stats.regions_dispatched);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod compose;
pub mod config;
pub mod correction;
pub mod difference;
pub mod frame;
pub mod metrics;
pub mod pipeline;
pub mod regions;
pub mod upscale;
pub mod workspace;

// Re-export commonly used types at crate root
pub use compose::FrameCompositor;
pub use config::{FileConfig, PipelineConfig};
pub use correction::CorrectionEngine;
pub use difference::{BlockGrid, DifferenceMap, FrameDifferencer};
pub use frame::{Frame, FrameSource, Rect};
pub use pipeline::{FrameKind, PipelineDriver, PipelineError};
pub use regions::{BleedExpander, RegionExtractor};
pub use upscale::{Dispatcher, Upscaler};
pub use workspace::Workspace;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
