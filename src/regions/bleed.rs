//! Bleed padding and region merging.

use crate::difference::DifferenceMap;
use crate::frame::Rect;

/// A padded extraction rectangle in raw-frame pixel space.
pub type BleedRegion = Rect;

/// Grows changed blocks by a bleed margin and merges what overlaps or touches.
///
/// Output regions are pairwise non-overlapping (they do not even share an
/// edge), lie inside the frame, cover every block of the map, and come out
/// sorted top-to-bottom then left-to-right.
#[derive(Debug, Clone, Copy, Default)]
pub struct BleedExpander {
    bleed: u32,
}

impl BleedExpander {
    /// Expander growing every changed block by `bleed` pixels.
    pub fn new(bleed: u32) -> Self {
        Self { bleed }
    }

    /// Padding in pixels.
    pub fn bleed(&self) -> u32 {
        self.bleed
    }

    /// Expands and merges the blocks of `map` within a `width x height` frame.
    pub fn expand(&self, map: &DifferenceMap, width: u32, height: u32) -> Vec<BleedRegion> {
        let mut merged: Vec<BleedRegion> = Vec::new();

        for block in map.blocks() {
            let mut region = block.rect().grow_clamped(self.bleed, width, height);
            if region.is_empty() {
                continue;
            }

            // Absorb until nothing left touches; a grown union can reach
            // regions that the original rectangle did not.
            while let Some(pos) = merged.iter().position(|r| r.touches_or_overlaps(&region)) {
                region = region.union(&merged.swap_remove(pos));
            }
            merged.push(region);
        }

        merged.sort();

        tracing::trace!(
            frame = map.frame_index(),
            blocks = map.len(),
            regions = merged.len(),
            bleed = self.bleed,
            "Expanded changed blocks"
        );

        merged
    }
}
