//! Paste-based frame composition.

use crate::frame::{Frame, FrameError, Rect};
use crate::upscale::UpscaledRegion;
use thiserror::Error;

/// Errors raised while compositing. Nothing is written when one is returned.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeError {
    #[error(
        "reconstructed frame is {}x{}, expected {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    TargetSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error(
        "region {region}: upscaled image is {}x{}, expected {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    ScaledSizeMismatch {
        region: Rect,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Pastes upscaled regions onto the previous reconstructed frame.
///
/// Regions are written at `(x * scale, y * scale)` and overwrite what was
/// there; there is no blending. Outside pasted regions the output is exactly
/// the previous reconstruction.
#[derive(Debug, Clone, Copy)]
pub struct FrameCompositor {
    scale_factor: u32,
}

impl FrameCompositor {
    /// Compositor for upscaled regions at `scale_factor`.
    pub fn new(scale_factor: u32) -> Self {
        Self {
            scale_factor: scale_factor.max(1),
        }
    }

    /// Magnification between raw and reconstructed space.
    pub fn scale_factor(&self) -> u32 {
        self.scale_factor
    }

    /// Resolution of a reconstructed frame for a raw resolution.
    pub fn target_size(&self, raw_width: u32, raw_height: u32) -> (u32, u32) {
        (raw_width * self.scale_factor, raw_height * self.scale_factor)
    }

    /// Builds the next reconstructed frame from the previous one.
    ///
    /// Takes `previous` by value: the buffer is reused for the result and no
    /// one else can observe it mid-update.
    pub fn compose(
        &self,
        mut previous: Frame,
        regions: &[UpscaledRegion],
        raw_size: (u32, u32),
        frame_index: u64,
    ) -> Result<Frame, CompositeError> {
        self.compose_in_place(&mut previous, regions, raw_size)?;
        previous.set_index(frame_index);
        Ok(previous)
    }

    /// Pastes every region into `target`, after checking all of them.
    pub fn compose_in_place(
        &self,
        target: &mut Frame,
        regions: &[UpscaledRegion],
        raw_size: (u32, u32),
    ) -> Result<(), CompositeError> {
        let expected = self.target_size(raw_size.0, raw_size.1);
        if target.dimensions() != expected {
            return Err(CompositeError::TargetSize {
                expected,
                actual: target.dimensions(),
            });
        }

        for upscaled in regions {
            let scaled = upscaled.region.scaled(self.scale_factor);
            let want = (scaled.width, scaled.height);
            if upscaled.image.dimensions() != want {
                return Err(CompositeError::ScaledSizeMismatch {
                    region: upscaled.region,
                    expected: want,
                    actual: upscaled.image.dimensions(),
                });
            }
            target.check_paste(&upscaled.image, scaled.x, scaled.y)?;
        }

        for upscaled in regions {
            let scaled = upscaled.region.scaled(self.scale_factor);
            target.paste(&upscaled.image, scaled.x, scaled.y)?;
        }

        tracing::trace!(regions = regions.len(), "Regions composited");
        Ok(())
    }

    /// Uses a full-frame upscale directly as the reconstruction.
    ///
    /// This is what composition degenerates to for keyframes and fades.
    pub fn substitute(
        &self,
        full: UpscaledRegion,
        raw_size: (u32, u32),
        frame_index: u64,
    ) -> Result<Frame, CompositeError> {
        let expected = self.target_size(raw_size.0, raw_size.1);
        if full.region != Rect::new(0, 0, raw_size.0, raw_size.1) || full.image.dimensions() != expected {
            return Err(CompositeError::ScaledSizeMismatch {
                region: full.region,
                expected,
                actual: full.image.dimensions(),
            });
        }
        full.image.ensure_valid()?;
        let mut frame = full.image;
        frame.set_index(frame_index);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upscale::NearestUpscaler;
    use proptest::prelude::*;

    fn raw(width: u32, height: u32, seed: u8) -> Frame {
        let pixels = (0..width * height)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect();
        Frame::new(pixels, width, height, 1, 0)
    }

    fn upscaled(frame: &Frame, rect: Rect, factor: u32) -> UpscaledRegion {
        UpscaledRegion {
            region: rect,
            image: NearestUpscaler::new(factor).upscale_frame(&frame.crop(rect).unwrap()),
        }
    }

    #[test]
    fn test_pasted_region_matches_full_upscale() {
        let upscaler = NearestUpscaler::new(2);
        let compositor = FrameCompositor::new(2);
        let before = raw(16, 16, 0);
        let mut after = before.clone();
        after.paste(&Frame::filled(8, 8, 1, 200, 0), 0, 0).unwrap();

        let rect = Rect::new(0, 0, 10, 10);
        let composed = compositor
            .compose(
                upscaler.upscale_frame(&before),
                &[upscaled(&after, rect, 2)],
                (16, 16),
                1,
            )
            .unwrap();

        assert_eq!(composed.index(), 1);
        assert_eq!(composed.pixels(), upscaler.upscale_frame(&after).pixels());
    }

    #[test]
    fn test_outside_regions_previous_content_is_kept() {
        let compositor = FrameCompositor::new(2);
        let previous = Frame::filled(16, 16, 1, 9, 0);
        let patch = UpscaledRegion {
            region: Rect::new(2, 2, 2, 2),
            image: Frame::filled(4, 4, 1, 200, 0),
        };

        let composed = compositor.compose(previous, &[patch], (8, 8), 1).unwrap();
        assert_eq!(composed.row(3), &[9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9]);
        assert_eq!(&composed.row(4)[3..9], &[9, 200, 200, 200, 200, 9]);
    }

    #[test]
    fn test_bad_region_aborts_before_any_write() {
        let compositor = FrameCompositor::new(2);
        let mut target = Frame::filled(16, 16, 1, 1, 0);
        let good = UpscaledRegion {
            region: Rect::new(0, 0, 2, 2),
            image: Frame::filled(4, 4, 1, 50, 0),
        };
        let bad = UpscaledRegion {
            region: Rect::new(4, 4, 2, 2),
            image: Frame::filled(3, 3, 1, 50, 0),
        };

        let err = compositor
            .compose_in_place(&mut target, &[good, bad], (8, 8))
            .unwrap_err();
        assert!(matches!(err, CompositeError::ScaledSizeMismatch { .. }));
        assert!(target.pixels().iter().all(|&s| s == 1));
    }

    #[test]
    fn test_wrong_target_size_rejected() {
        let compositor = FrameCompositor::new(2);
        let err = compositor
            .compose(Frame::filled(8, 8, 1, 0, 0), &[], (8, 8), 1)
            .unwrap_err();
        assert_eq!(
            err,
            CompositeError::TargetSize {
                expected: (16, 16),
                actual: (8, 8)
            }
        );
    }

    #[test]
    fn test_full_frame_substitution_equals_direct_upscale() {
        let upscaler = NearestUpscaler::new(3);
        let compositor = FrameCompositor::new(3);
        let frame = raw(8, 8, 4);

        let result = compositor
            .substitute(upscaled(&frame, frame.bounds(), 3), (8, 8), 5)
            .unwrap();
        assert_eq!(result.pixels(), upscaler.upscale_frame(&frame).pixels());
        assert_eq!(result.index(), 5);
    }

    proptest! {
        #[test]
        fn prop_empty_compose_is_identity(
            pixels in proptest::collection::vec(any::<u8>(), 16 * 16 * 3),
        ) {
            let previous = Frame::new(pixels, 16, 16, 3, 0);
            let composed = FrameCompositor::new(2)
                .compose(previous.clone(), &[], (8, 8), 1)
                .unwrap();
            prop_assert_eq!(composed.pixels(), previous.pixels());
        }

        #[test]
        fn prop_full_region_compose_equals_direct_upscale(
            pixels in proptest::collection::vec(any::<u8>(), 8 * 8),
            stale in any::<u8>(),
        ) {
            let frame = Frame::new(pixels, 8, 8, 1, 0);
            let upscaler = NearestUpscaler::new(2);
            let composed = FrameCompositor::new(2)
                .compose(
                    Frame::filled(16, 16, 1, stale, 0),
                    &[upscaled(&frame, frame.bounds(), 2)],
                    (8, 8),
                    1,
                )
                .unwrap();
            let direct = upscaler.upscale_frame(&frame);
            prop_assert_eq!(composed.pixels(), direct.pixels());
        }
    }
}
