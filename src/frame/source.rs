//! Decoder boundary: lazy, finite, sequential raw frame streams.
//!
//! Sources are handed a recycled buffer on every call so steady-state
//! decoding does not allocate a fresh frame each time.

use super::Frame;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while producing raw frames.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("no frames found in {0}")]
    Empty(PathBuf),
    #[error("invalid source parameters: {0}")]
    InvalidParameters(String),
}

/// A lazy, finite stream of raw frames in index order.
pub trait FrameSource {
    /// Produces the next frame, or `None` once the stream is exhausted.
    ///
    /// `recycled` is a spare buffer the implementation may fill instead of
    /// allocating.
    fn next_frame(&mut self, recycled: Option<Vec<u8>>) -> Result<Option<Frame>, SourceError>;

    /// Total number of frames, when known up front.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }
}

fn prepare(recycled: Option<Vec<u8>>, len: usize) -> Vec<u8> {
    let mut buffer = recycled.unwrap_or_default();
    buffer.clear();
    buffer.reserve(len);
    buffer
}

/// In-memory source over pre-built frames.
#[derive(Debug, Default)]
pub struct VecSource {
    frames: VecDeque<Frame>,
    total: u64,
}

impl VecSource {
    /// Yields `frames` in order.
    pub fn new(frames: Vec<Frame>) -> Self {
        let total = frames.len() as u64;
        Self {
            frames: frames.into(),
            total,
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self, _recycled: Option<Vec<u8>>) -> Result<Option<Frame>, SourceError> {
        Ok(self.frames.pop_front())
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.total)
    }
}

/// Generates a deterministic test clip: a gradient background with a
/// square moving one block per frame, optionally followed by a fade.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    square: u32,
    frames: u64,
    next: u64,
    fade_from: Option<u64>,
}

impl SyntheticSource {
    /// Creates a grayscale clip of `frames` frames.
    pub fn new(width: u32, height: u32, square: u32, frames: u64) -> Result<Self, SourceError> {
        if width == 0 || height == 0 || square == 0 || square > width.min(height) {
            return Err(SourceError::InvalidParameters(format!(
                "{width}x{height} with square {square}"
            )));
        }
        Ok(Self {
            width,
            height,
            square,
            frames,
            next: 0,
            fade_from: None,
        })
    }

    /// Brightens the whole frame from `index` onward, one step per frame.
    pub fn with_fade_from(mut self, index: u64) -> Self {
        self.fade_from = Some(index);
        self
    }

    fn sample(&self, index: u64, x: u32, y: u32) -> u8 {
        let travel = (self.width - self.square) as u64 + 1;
        let square_x = ((index * self.square as u64) % travel) as u32;
        let square_y = (self.height - self.square) / 2;
        let inside = x >= square_x
            && x < square_x + self.square
            && y >= square_y
            && y < square_y + self.square;

        let base = if inside {
            230u32
        } else {
            (x * 3 + y * 5) % 160 + 20
        };
        let lift = match self.fade_from {
            Some(start) if index >= start => ((index - start + 1) * 12).min(255) as u32,
            _ => 0,
        };
        (base + lift).min(255) as u8
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self, recycled: Option<Vec<u8>>) -> Result<Option<Frame>, SourceError> {
        if self.next >= self.frames {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;

        let mut pixels = prepare(recycled, (self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push(self.sample(index, x, y));
            }
        }
        Ok(Some(Frame::new(pixels, self.width, self.height, 1, index)))
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.frames)
    }
}

/// Reads numbered image files (PNG/JPEG) from a directory in name order.
#[derive(Debug)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    /// Lists the frame files under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| SourceError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false);
            if is_frame {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        files.sort();

        tracing::info!(dir = %dir.display(), frames = files.len(), "Opened frame directory");
        Ok(Self { files, next: 0 })
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self, recycled: Option<Vec<u8>>) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let index = self.next as u64;
        self.next += 1;

        let decoded = image::open(path).map_err(|e| SourceError::Decode {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut pixels = prepare(recycled, rgb.as_raw().len());
        pixels.extend_from_slice(rgb.as_raw());
        Ok(Some(Frame::new(pixels, width, height, 3, index)))
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.files.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_source_is_finite_and_sequential() {
        let mut source = SyntheticSource::new(16, 16, 4, 3).unwrap();

        for expected in 0..3 {
            let frame = source.next_frame(None).unwrap().unwrap();
            assert_eq!(frame.index(), expected);
            assert!(frame.is_valid());
        }
        assert!(source.next_frame(None).unwrap().is_none());
    }

    #[test]
    fn test_synthetic_source_reuses_buffer() {
        let mut source = SyntheticSource::new(8, 8, 2, 2).unwrap();
        let first = source.next_frame(None).unwrap().unwrap();
        let buffer = first.into_pixels();
        let capacity = buffer.capacity();

        let second = source.next_frame(Some(buffer)).unwrap().unwrap();
        assert!(second.is_valid());
        assert_eq!(second.into_pixels().capacity(), capacity);
    }

    #[test]
    fn test_invalid_square_rejected() {
        assert!(matches!(
            SyntheticSource::new(8, 8, 9, 1),
            Err(SourceError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_directory_source_reads_sorted_pngs() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("frame_0002.png", 200u8), ("frame_0001.png", 100u8)] {
            image::GrayImage::from_pixel(4, 4, image::Luma([value]))
                .save(dir.path().join(name))
                .unwrap();
        }

        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.frame_count_hint(), Some(2));

        let first = source.next_frame(None).unwrap().unwrap();
        assert_eq!(first.channels(), 3);
        assert_eq!(first.pixels()[0], 100);
        let second = source.next_frame(None).unwrap().unwrap();
        assert_eq!(second.index(), 1);
        assert_eq!(second.pixels()[0], 200);
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectorySource::open(dir.path()),
            Err(SourceError::Empty(_))
        ));
    }
}
