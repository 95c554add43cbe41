use serde::{Deserialize, Serialize};
use std::fmt;

/// How a reconstructed frame was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Fully upscaled from scratch; the first frame only.
    Keyframe,
    /// Previous reconstruction plus patched regions.
    PFrame,
    /// A p-frame whose sampled blocks were also verified.
    CorrectionFrame,
    /// Fully re-upscaled because the whole frame changed.
    FadeFrame,
}

impl FrameKind {
    /// Whether the reconstruction is a single full-frame upscale.
    pub fn is_full_frame(self) -> bool {
        match self {
            FrameKind::Keyframe | FrameKind::FadeFrame => true,
            FrameKind::PFrame | FrameKind::CorrectionFrame => false,
        }
    }

    /// Stable lowercase name, used for metric labels and file names.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Keyframe => "keyframe",
            FrameKind::PFrame => "pframe",
            FrameKind::CorrectionFrame => "correction",
            FrameKind::FadeFrame => "fade",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
