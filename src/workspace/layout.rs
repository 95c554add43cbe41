use crate::frame::Rect;
use std::path::{Path, PathBuf};

/// Subdirectories of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Difference maps, one JSON file per frame.
    Differences,
    /// Region descriptors of p-frames and correction frames.
    PFrameData,
    /// Region descriptors of keyframes and fades.
    FadeData,
    /// Correction records.
    CorrectionData,
    /// Upscaled regions as PNG.
    Upscaled,
    /// Reconstructed frames as PNG.
    Merged,
    /// Change masks.
    Debug,
    /// Log files.
    Logs,
}

impl Area {
    /// Every area, in creation order.
    pub const ALL: [Area; 8] = [
        Area::Differences,
        Area::PFrameData,
        Area::FadeData,
        Area::CorrectionData,
        Area::Upscaled,
        Area::Merged,
        Area::Debug,
        Area::Logs,
    ];

    /// Directory name under the workspace root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Area::Differences => "differences",
            Area::PFrameData => "pframe_data",
            Area::FadeData => "fade_data",
            Area::CorrectionData => "correction_data",
            Area::Upscaled => "upscaled",
            Area::Merged => "merged",
            Area::Debug => "debug",
            Area::Logs => "logs",
        }
    }
}

pub(crate) fn frame_file(index: u64, extension: &str) -> String {
    format!("frame_{index:06}.{extension}")
}

pub(crate) fn region_file(index: u64, region: Rect) -> String {
    format!(
        "frame_{index:06}_x{:05}_y{:05}_{}x{}.png",
        region.x, region.y, region.width, region.height
    )
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".temp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_sort_by_index() {
        assert!(frame_file(9, "png") < frame_file(10, "png"));
        assert_eq!(frame_file(42, "json"), "frame_000042.json");
        assert_eq!(
            region_file(3, Rect::new(16, 8, 10, 12)),
            "frame_000003_x00016_y00008_10x12.png"
        );
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let temp = temp_path(Path::new("/ws/merged/frame_000001.png"));
        assert_eq!(temp, Path::new("/ws/merged/frame_000001.png.temp"));
    }
}
