//! Axis-aligned pixel rectangles.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A rectangle in pixel space with an exclusive right/bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Creates a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Number of pixels covered.
    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns true if the rectangle covers no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Returns true if the two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Returns true if the rectangles overlap or share an edge or corner.
    pub fn touches_or_overlaps(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Shared area, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (x < right && y < bottom).then(|| Rect::new(x, y, right - x, bottom - y))
    }

    /// Grows the rectangle by `margin` on every side, clamped to
    /// `[0, bound_width) x [0, bound_height)`.
    pub fn grow_clamped(&self, margin: u32, bound_width: u32, bound_height: u32) -> Rect {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        let right = self.right().saturating_add(margin).min(bound_width);
        let bottom = self.bottom().saturating_add(margin).min(bound_height);
        Rect {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }

    /// Multiplies every coordinate by `factor`.
    pub fn scaled(&self, factor: u32) -> Rect {
        Rect {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    /// Returns true if the rectangle lies inside a `width x height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

impl Ord for Rect {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x, self.height, self.width).cmp(&(
            other.y,
            other.x,
            other.height,
            other.width,
        ))
    }
}

impl PartialOrd for Rect {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_clamps_at_origin() {
        let rect = Rect::new(0, 0, 8, 8).grow_clamped(2, 16, 16);
        assert_eq!(rect, Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn test_grow_clamps_at_far_edge() {
        let rect = Rect::new(8, 8, 8, 8).grow_clamped(2, 16, 16);
        assert_eq!(rect, Rect::new(6, 6, 10, 10));
    }

    #[test]
    fn test_edge_sharing_touches_but_does_not_overlap() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(4, 0, 4, 4);
        assert!(a.touches_or_overlaps(&b));
        assert!(!a.overlaps(&b));
        assert_eq!(a.union(&b), Rect::new(0, 0, 8, 4));
    }

    #[test]
    fn test_gap_neither_touches_nor_overlaps() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(5, 5, 2, 2);
        assert!(!a.touches_or_overlaps(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_ordering_is_row_major() {
        let mut rects = vec![Rect::new(8, 0, 2, 2), Rect::new(0, 4, 2, 2), Rect::new(0, 0, 2, 2)];
        rects.sort();
        assert_eq!(
            rects,
            vec![Rect::new(0, 0, 2, 2), Rect::new(8, 0, 2, 2), Rect::new(0, 4, 2, 2)]
        );
    }
}
