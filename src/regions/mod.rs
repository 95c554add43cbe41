//! Turning changed blocks into upscaler work items.
//!
//! Changed blocks are padded by a bleed margin and merged into disjoint
//! rectangles ([`BleedExpander`]), then cropped out of the current raw frame
//! ([`RegionExtractor`]).

mod bleed;
mod extract;

pub use bleed::{BleedExpander, BleedRegion};
pub use extract::{ExtractedRegion, RegionExtractor};
