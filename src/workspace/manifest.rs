use crate::pipeline::{FrameKind, PipelineStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-frame manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    /// How the frame was reconstructed.
    pub kind: FrameKind,
    /// BLAKE3 of the reconstructed frame, hex.
    pub digest: String,
    /// Patch regions dispatched for the frame.
    pub regions: usize,
}

/// Summary of one run, written as `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Crate version that produced the workspace.
    pub version: String,
    /// When the workspace was opened.
    pub started_at: DateTime<Utc>,
    /// When the run completed, if it did.
    pub finished_at: Option<DateTime<Utc>>,
    /// Reconstructed frame resolution.
    pub resolution: Option<(u32, u32)>,
    /// Emitted frames by index.
    pub frames: BTreeMap<u64, FrameEntry>,
    /// Final totals, once the run finished.
    pub stats: Option<PipelineStats>,
}

impl RunManifest {
    /// Empty manifest stamped with the current time.
    pub fn new() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            resolution: None,
            frames: BTreeMap::new(),
            stats: None,
        }
    }

    /// Digest recorded for a frame.
    pub fn digest(&self, index: u64) -> Option<&str> {
        self.frames.get(&index).map(|entry| entry.digest.as_str())
    }

    /// Whether the run completed.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}
