//! Upscaler trait and the nearest-neighbour reference implementation.

use crate::frame::{Frame, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors an upscaler can report for a single request.
///
/// All of them are treated as retryable by the dispatcher.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpscaleError {
    #[error("upscaler unavailable: {0}")]
    Unavailable(String),
    #[error("upscaler produced corrupt output: {0}")]
    CorruptOutput(String),
    #[error(
        "upscaler returned {}x{}x{}, expected {}x{}x{}",
        .actual.0, .actual.1, .actual.2, .expected.0, .expected.1, .expected.2
    )]
    UnexpectedShape {
        expected: (u32, u32, u8),
        actual: (u32, u32, u8),
    },
}

/// Why a sub-image is being upscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Pixels that will be pasted into the reconstructed frame.
    Patch,
    /// A fresh reference for drift verification; never pasted.
    Verification,
}

/// One upscale call.
#[derive(Debug, Clone, Copy)]
pub struct UpscaleRequest<'a> {
    /// Frame the sub-image belongs to.
    pub frame_index: u64,
    /// Location of the sub-image in the raw frame.
    pub region: Rect,
    /// What the result is used for.
    pub purpose: Purpose,
    /// Raw pixels to upscale.
    pub image: &'a Frame,
}

/// An image upscaler with a fixed integer magnification.
///
/// Implementations must preserve the sub-image's spatial layout: output
/// pixel `(x * s, y * s)` corresponds to input pixel `(x, y)`, with no
/// cropping or padding.
pub trait Upscaler: Send + Sync {
    /// Magnification applied to both axes.
    fn scale_factor(&self) -> u32;

    /// Upscales one sub-image.
    fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError>;
}

/// Pixel-replication upscaler.
///
/// Deterministic and position-independent, so upscaling a crop equals
/// cropping the upscaled whole frame. Used as the reference implementation
/// and in tests.
#[derive(Debug, Clone, Copy)]
pub struct NearestUpscaler {
    factor: u32,
}

impl NearestUpscaler {
    /// Upscaler for the given integer factor.
    pub fn new(factor: u32) -> Self {
        Self {
            factor: factor.max(1),
        }
    }

    /// Upscales a whole frame directly.
    pub fn upscale_frame(&self, frame: &Frame) -> Frame {
        let s = self.factor as usize;
        let channels = frame.channels() as usize;
        let out_width = frame.width() as usize * s;
        let mut pixels = Vec::with_capacity(frame.pixels().len() * s * s);

        for y in 0..frame.height() {
            let row = frame.row(y);
            let start = pixels.len();
            for pixel in row.chunks_exact(channels) {
                for _ in 0..s {
                    pixels.extend_from_slice(pixel);
                }
            }
            for _ in 1..s {
                pixels.extend_from_within(start..start + out_width * channels);
            }
        }

        Frame::new(
            pixels,
            frame.width() * self.factor,
            frame.height() * self.factor,
            frame.channels(),
            frame.index(),
        )
    }
}

impl Upscaler for NearestUpscaler {
    fn scale_factor(&self) -> u32 {
        self.factor
    }

    fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError> {
        Ok(self.upscale_frame(request.image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_replicates_pixels() {
        let frame = Frame::new(vec![1, 2, 3, 4], 2, 2, 1, 0);
        let up = NearestUpscaler::new(2).upscale_frame(&frame);

        assert_eq!(up.dimensions(), (4, 4));
        assert_eq!(
            up.pixels(),
            &[1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]
        );
    }

    #[test]
    fn test_nearest_keeps_channels_interleaved() {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, 3, 0);
        let up = NearestUpscaler::new(3).upscale_frame(&frame);

        assert_eq!(up.dimensions(), (3, 3));
        assert!(up.pixels().chunks_exact(3).all(|p| p == [10, 20, 30]));
    }

    #[test]
    fn test_crop_commutes_with_upscale() {
        let pixels = (0..8u32 * 8).map(|i| (i * 3) as u8).collect();
        let frame = Frame::new(pixels, 8, 8, 1, 0);
        let upscaler = NearestUpscaler::new(2);
        let rect = Rect::new(2, 4, 3, 2);

        let of_crop = upscaler.upscale_frame(&frame.crop(rect).unwrap());
        let crop_of = upscaler.upscale_frame(&frame).crop(rect.scaled(2)).unwrap();
        assert_eq!(of_crop.pixels(), crop_of.pixels());
    }
}
