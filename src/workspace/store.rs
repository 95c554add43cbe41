//! Artifact reads and writes.

use super::layout::{frame_file, region_file, temp_path};
use super::{Area, FrameEntry, RunManifest};
use crate::config::WorkspaceConfig;
use crate::correction::{CorrectionOutcome, CorrectionRecord};
use crate::difference::{Block, DifferenceMap};
use crate::frame::{Frame, Rect};
use crate::pipeline::{FrameKind, FrameSink, PipelineStats, SinkError, StepReport};
use crate::upscale::UpscaledRegion;
use chrono::Utc;
use image::ImageEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by workspace storage.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame {index} digest mismatch: manifest {expected}, file {actual}")]
    DigestMismatch {
        index: u64,
        expected: String,
        actual: String,
    },
    #[error("frame {0} is not recorded in the manifest")]
    UnknownFrame(u64),
    #[error("cannot store {0}-channel images")]
    UnsupportedChannels(u8),
}

/// Regions dispatched for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Frame the regions belong to.
    pub frame_index: u64,
    /// How the frame was reconstructed.
    pub kind: FrameKind,
    /// Raw-space rectangles, in dispatch order.
    pub regions: Vec<Rect>,
}

/// Result of one correction pass as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionDescriptor {
    /// Frame the pass ran on.
    pub frame_index: u64,
    /// Whether the verification upscale failed and the pass was skipped.
    pub skipped: bool,
    /// One record per sampled block.
    pub records: Vec<CorrectionRecord>,
    /// Blocks forced into the next frame.
    pub dirty: Vec<Block>,
}

impl From<&CorrectionOutcome> for CorrectionDescriptor {
    fn from(outcome: &CorrectionOutcome) -> Self {
        Self {
            frame_index: outcome.frame_index,
            skipped: outcome.skipped,
            records: outcome.records.clone(),
            dirty: outcome.dirty.iter().copied().collect(),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn hex(digest: [u8; 32]) -> String {
    blake3::Hash::from(digest).to_hex().to_string()
}

/// A workspace directory and the manifest of the run writing to it.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    save_regions: bool,
    save_frames: bool,
    debug: bool,
    manifest: RunManifest,
}

impl Workspace {
    /// Creates the workspace layout, reusing existing directories.
    pub fn create(config: &WorkspaceConfig) -> Result<Self, WorkspaceError> {
        let root = config.resolved_path();
        for area in Area::ALL {
            let dir = root.join(area.dir_name());
            fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        }
        tracing::info!(path = %root.display(), "Workspace ready");

        Ok(Self {
            root,
            save_regions: config.save_regions,
            save_frames: config.save_frames,
            debug: config.debug,
            manifest: RunManifest::new(),
        })
    }

    /// Opens a finished or in-progress workspace for reading.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let manifest = read_json(&root.join("manifest.json"))?;
        Ok(Self {
            root,
            save_regions: false,
            save_frames: false,
            debug: false,
            manifest,
        })
    }

    /// Workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `area`.
    pub fn dir(&self, area: Area) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// File the binary mirrors its log output to.
    pub fn log_path(&self) -> PathBuf {
        self.dir(Area::Logs).join("patchscale.log")
    }

    /// Manifest as recorded so far.
    pub fn manifest(&self) -> &RunManifest {
        &self.manifest
    }

    /// Stores a difference map under `differences`.
    pub fn write_difference(&self, map: &DifferenceMap) -> Result<PathBuf, WorkspaceError> {
        let path = self
            .dir(Area::Differences)
            .join(frame_file(map.frame_index(), "json"));
        write_json(&path, map)?;
        Ok(path)
    }

    /// Reads back a stored difference map.
    pub fn load_difference(&self, index: u64) -> Result<DifferenceMap, WorkspaceError> {
        read_json(&self.dir(Area::Differences).join(frame_file(index, "json")))
    }

    /// Stores the regions dispatched for a frame, under `fade_data` for
    /// full-frame kinds and `pframe_data` otherwise.
    pub fn write_regions(&self, descriptor: &RegionDescriptor) -> Result<PathBuf, WorkspaceError> {
        let area = if descriptor.kind.is_full_frame() {
            Area::FadeData
        } else {
            Area::PFrameData
        };
        let path = self
            .dir(area)
            .join(frame_file(descriptor.frame_index, "json"));
        write_json(&path, descriptor)?;
        Ok(path)
    }

    /// Reads back the regions stored for frame `index`.
    pub fn load_regions(&self, index: u64) -> Result<RegionDescriptor, WorkspaceError> {
        let name = frame_file(index, "json");
        let pframe = self.dir(Area::PFrameData).join(&name);
        if pframe.exists() {
            return read_json(&pframe);
        }
        read_json(&self.dir(Area::FadeData).join(name))
    }

    /// Writes one upscaled region as PNG under `upscaled`.
    pub fn write_upscaled(&self, index: u64, region: &UpscaledRegion) -> Result<PathBuf, WorkspaceError> {
        let path = self
            .dir(Area::Upscaled)
            .join(region_file(index, region.region));
        write_png(&path, &region.image)?;
        Ok(path)
    }

    /// Reads back an upscaled region of frame `index`.
    pub fn load_upscaled(&self, index: u64, region: Rect) -> Result<Frame, WorkspaceError> {
        read_png(&self.dir(Area::Upscaled).join(region_file(index, region)), index)
    }

    /// Stores a correction pass under `correction_data`.
    pub fn write_correction(&self, outcome: &CorrectionOutcome) -> Result<PathBuf, WorkspaceError> {
        let path = self
            .dir(Area::CorrectionData)
            .join(frame_file(outcome.frame_index, "json"));
        write_json(&path, &CorrectionDescriptor::from(outcome))?;
        Ok(path)
    }

    /// Reads back the correction pass of frame `index`.
    pub fn load_correction(&self, index: u64) -> Result<CorrectionDescriptor, WorkspaceError> {
        read_json(&self.dir(Area::CorrectionData).join(frame_file(index, "json")))
    }

    /// Records a reconstructed frame in the manifest and, when frames are
    /// kept, writes it as PNG.
    pub fn write_reconstructed(
        &mut self,
        frame: &Frame,
        kind: FrameKind,
        regions: usize,
    ) -> Result<(), WorkspaceError> {
        if self.save_frames {
            let path = self.dir(Area::Merged).join(frame_file(frame.index(), "png"));
            write_png(&path, frame)?;
        }
        self.manifest.resolution = Some(frame.dimensions());
        self.manifest.frames.insert(
            frame.index(),
            FrameEntry {
                kind,
                digest: hex(frame.digest()),
                regions,
            },
        );
        Ok(())
    }

    /// Reads a reconstructed frame back and checks it against the digest
    /// recorded when it was written.
    pub fn load_reconstructed(&self, index: u64) -> Result<Frame, WorkspaceError> {
        let expected = self
            .manifest
            .digest(index)
            .ok_or(WorkspaceError::UnknownFrame(index))?;
        let frame = read_png(&self.dir(Area::Merged).join(frame_file(index, "png")), index)?;
        let actual = hex(frame.digest());
        if actual != expected {
            return Err(WorkspaceError::DigestMismatch {
                index,
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(frame)
    }

    /// Writes a grayscale mask of a difference map: changed blocks white,
    /// forced blocks mid-gray.
    pub fn write_change_mask(&self, map: &DifferenceMap) -> Result<PathBuf, WorkspaceError> {
        let (columns, rows) = map.dimensions();
        let size = map.block_size();
        let width = columns * size;
        let mut pixels = vec![0u8; width as usize * (rows * size) as usize];
        for (block, value) in map
            .forced()
            .iter()
            .map(|b| (b, 128u8))
            .chain(map.changed().iter().map(|b| (b, 255u8)))
        {
            let r = block.rect();
            for y in r.y..r.bottom() {
                let start = (y * width + r.x) as usize;
                pixels[start..start + r.width as usize].fill(value);
            }
        }
        let mask = Frame::new(pixels, width, rows * size, 1, map.frame_index());
        let path = self
            .dir(Area::Debug)
            .join(format!("frame_{:06}_mask.png", map.frame_index()));
        write_png(&path, &mask)?;
        Ok(path)
    }

    /// Writes `manifest.json` as it currently stands.
    pub fn save_manifest(&self) -> Result<(), WorkspaceError> {
        write_json(&self.root.join("manifest.json"), &self.manifest)
    }
}

impl FrameSink for Workspace {
    fn emit(&mut self, report: &StepReport, frame: &Frame) -> Result<(), SinkError> {
        if let Some(map) = &report.difference {
            self.write_difference(map)?;
            if self.debug {
                self.write_change_mask(map)?;
            }
        }
        self.write_regions(&RegionDescriptor {
            frame_index: report.index,
            kind: report.kind,
            regions: report.regions.clone(),
        })?;
        if self.save_regions {
            for region in &report.upscaled {
                self.write_upscaled(report.index, region)?;
            }
        }
        if let Some(outcome) = &report.correction {
            self.write_correction(outcome)?;
        }
        self.write_reconstructed(frame, report.kind, report.regions.len())?;
        Ok(())
    }

    fn finish(&mut self, stats: &PipelineStats) -> Result<(), SinkError> {
        self.manifest.finished_at = Some(Utc::now());
        self.manifest.stats = Some(stats.clone());
        self.save_manifest()?;
        tracing::info!(
            path = %self.root.display(),
            frames = self.manifest.frames.len(),
            "Workspace manifest written"
        );
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WorkspaceError> {
    let temp = temp_path(path);
    fs::write(&temp, bytes).map_err(io_error(&temp))?;
    fs::rename(&temp, path).map_err(io_error(path))?;
    tracing::trace!(path = %path.display(), bytes = bytes.len(), "Artifact written");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), WorkspaceError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| WorkspaceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, WorkspaceError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    serde_json::from_slice(&bytes).map_err(|source| WorkspaceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_png(path: &Path, frame: &Frame) -> Result<(), WorkspaceError> {
    let color = match frame.channels() {
        1 => image::ExtendedColorType::L8,
        3 => image::ExtendedColorType::Rgb8,
        4 => image::ExtendedColorType::Rgba8,
        other => return Err(WorkspaceError::UnsupportedChannels(other)),
    };
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(frame.pixels(), frame.width(), frame.height(), color)
        .map_err(|source| WorkspaceError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, &bytes)
}

fn read_png(path: &Path, index: u64) -> Result<Frame, WorkspaceError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| WorkspaceError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (decoded.width(), decoded.height());
    let (pixels, channels) = match decoded.color().channel_count() {
        1 => (decoded.into_luma8().into_raw(), 1),
        2 | 4 => (decoded.into_rgba8().into_raw(), 4),
        _ => (decoded.into_rgb8().into_raw(), 3),
    };
    Ok(Frame::new(pixels, width, height, channels, index))
}
