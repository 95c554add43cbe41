//! Cropping bleed regions out of the current raw frame.

use super::BleedRegion;
use crate::frame::{Frame, FrameError};

/// A region and its pixels, ready for the upscaler.
#[derive(Debug, Clone)]
pub struct ExtractedRegion {
    /// Where the pixels came from in the raw frame.
    pub region: BleedRegion,
    /// Standalone copy of the region's pixels.
    pub image: Frame,
}

/// Pure crop of regions from a raw frame; no resampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionExtractor;

impl RegionExtractor {
    /// Creates an extractor.
    pub fn new() -> Self {
        Self
    }

    /// Crops every region out of `current`, in the given order.
    pub fn extract(
        &self,
        current: &Frame,
        regions: &[BleedRegion],
    ) -> Result<Vec<ExtractedRegion>, FrameError> {
        regions
            .iter()
            .map(|&region| {
                Ok(ExtractedRegion {
                    region,
                    image: current.crop(region)?,
                })
            })
            .collect()
    }
}
