//! Frame type representing a decoded or reconstructed image with metadata.

use super::Rect;
use thiserror::Error;

/// Errors raised by frame buffer operations.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("pixel buffer holds {actual} bytes, {width}x{height}x{channels} needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported channel count {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(u8),
    #[error("rectangle {rect} exceeds frame bounds {width}x{height}")]
    OutOfBounds { rect: Rect, width: u32, height: u32 },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: u8, actual: u8 },
}

/// A single frame of interleaved 8-bit samples.
///
/// Raw frames (decoder output) and reconstructed frames (compositor output)
/// share this type; the two spaces differ only in resolution.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Interleaved samples, row-major, no padding between rows.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Samples per pixel (1, 3 or 4).
    channels: u8,
    /// Position in the frame stream.
    index: u64,
}

impl Frame {
    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, channels: u8, index: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
            index,
        }
    }

    /// Creates a frame with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8, index: u64) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::new(vec![value; len], width, height, channels, index)
    }

    /// Returns the raw samples.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the raw samples mutably.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the number of samples per pixel.
    #[inline]
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Returns the stream index.
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Re-labels the frame with a new stream index.
    pub fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    /// The full-frame rectangle.
    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Bytes per row.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.ensure_valid().is_ok()
    }

    /// Like [`Frame::is_valid`] but reports what is wrong.
    pub fn ensure_valid(&self) -> Result<(), FrameError> {
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(FrameError::UnsupportedChannels(self.channels));
        }
        let expected = self.pixel_count() * self.channels as usize;
        if self.pixels.len() != expected {
            return Err(FrameError::BufferSize {
                width: self.width,
                height: self.height,
                channels: self.channels,
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Returns one row of samples.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }

    /// Borrows a rectangular view for block-level comparisons.
    pub fn window(&self, rect: Rect) -> Result<PixelWindow<'_>, FrameError> {
        self.check_rect(rect)?;
        Ok(PixelWindow { frame: self, rect })
    }

    /// Copies `rect` out into a standalone frame with the same index.
    pub fn crop(&self, rect: Rect) -> Result<Frame, FrameError> {
        let window = self.window(rect)?;
        let mut pixels = Vec::with_capacity(rect.area() as usize * self.channels as usize);
        for row in window.rows() {
            pixels.extend_from_slice(row);
        }
        Ok(Frame::new(pixels, rect.width, rect.height, self.channels, self.index))
    }

    /// Checks that `source` can be pasted at `(x, y)` without mutating anything.
    pub fn check_paste(&self, source: &Frame, x: u32, y: u32) -> Result<(), FrameError> {
        if source.channels != self.channels {
            return Err(FrameError::ChannelMismatch {
                expected: self.channels,
                actual: source.channels,
            });
        }
        source.ensure_valid()?;
        self.check_rect(Rect::new(x, y, source.width, source.height))
    }

    /// Overwrites the pixels at `(x, y)` with `source`. No blending.
    pub fn paste(&mut self, source: &Frame, x: u32, y: u32) -> Result<(), FrameError> {
        self.check_paste(source, x, y)?;
        let stride = self.row_stride();
        let offset = x as usize * self.channels as usize;
        let span = source.row_stride();
        for row in 0..source.height {
            let start = (y + row) as usize * stride + offset;
            self.pixels[start..start + span].copy_from_slice(source.row(row));
        }
        Ok(())
    }

    /// Mean sample value across the frame.
    pub fn mean_sample(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&s| s as u64).sum();
        sum as f64 / self.pixels.len() as f64
    }

    /// BLAKE3 fingerprint over shape and samples.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.width.to_le_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&[self.channels]);
        hasher.update(&self.pixels);
        *hasher.finalize().as_bytes()
    }

    /// Releases the sample buffer for reuse.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    fn check_rect(&self, rect: Rect) -> Result<(), FrameError> {
        if rect.is_empty() || !rect.fits_within(self.width, self.height) {
            return Err(FrameError::OutOfBounds {
                rect,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("index", &self.index)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

/// A borrowed rectangular view into a frame.
#[derive(Debug, Clone, Copy)]
pub struct PixelWindow<'a> {
    frame: &'a Frame,
    rect: Rect,
}

impl<'a> PixelWindow<'a> {
    /// The covered rectangle in frame coordinates.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Samples per pixel.
    #[inline]
    pub fn channels(&self) -> u8 {
        self.frame.channels
    }

    /// Number of samples covered.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.rect.area() as usize * self.frame.channels as usize
    }

    /// Iterates the covered rows as sample slices.
    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let frame = self.frame;
        let rect = self.rect;
        let channels = frame.channels as usize;
        let start = rect.x as usize * channels;
        let end = rect.right() as usize * channels;
        (rect.y..rect.bottom()).map(move |y| &frame.row(y)[start..end])
    }
}
