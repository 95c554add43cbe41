//! Fixed-size block tiling of a frame.

use crate::frame::Rect;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised when a resolution cannot be tiled.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error(
        "resolution {width}x{height} is not a multiple of block size {block_size} \
         (nearest aligned resolution: {aligned_width}x{aligned_height})"
    )]
    Misaligned {
        width: u32,
        height: u32,
        block_size: u32,
        aligned_width: u32,
        aligned_height: u32,
    },
    #[error("block size must be positive")]
    ZeroBlockSize,
    #[error("frame has no pixels")]
    EmptyFrame,
}

/// One cell of the grid, addressed by grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Column.
    pub grid_x: u32,
    /// Row.
    pub grid_y: u32,
    /// Edge length in pixels.
    pub size: u32,
}

impl Block {
    /// Block at grid column `grid_x`, row `grid_y`.
    pub const fn new(grid_x: u32, grid_y: u32, size: u32) -> Self {
        Self {
            grid_x,
            grid_y,
            size,
        }
    }

    /// Pixel rectangle covered by the block.
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.grid_x * self.size,
            self.grid_y * self.size,
            self.size,
            self.size,
        )
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.grid_y, self.grid_x, self.size).cmp(&(other.grid_y, other.grid_x, other.size))
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.grid_x, self.grid_y)
    }
}

/// Exact tiling of a `width x height` frame into square blocks.
///
/// Pure geometry; the resolution must already be a multiple of the block
/// size. Blocks are enumerated row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    width: u32,
    height: u32,
    block_size: u32,
    columns: u32,
    rows: u32,
}

impl BlockGrid {
    /// Creates a grid, refusing resolutions that do not tile exactly.
    pub fn new(width: u32, height: u32, block_size: u32) -> Result<Self, GridError> {
        if block_size == 0 {
            return Err(GridError::ZeroBlockSize);
        }
        if width == 0 || height == 0 {
            return Err(GridError::EmptyFrame);
        }
        if width % block_size != 0 || height % block_size != 0 {
            let (aligned_width, aligned_height) =
                Self::aligned_resolution(width, height, block_size);
            return Err(GridError::Misaligned {
                width,
                height,
                block_size,
                aligned_width,
                aligned_height,
            });
        }
        Ok(Self {
            width,
            height,
            block_size,
            columns: width / block_size,
            rows: height / block_size,
        })
    }

    /// Nearest resolution an upstream scaler should produce: each dimension
    /// rounded down to a multiple of `block_size`, never below one block.
    pub fn aligned_resolution(width: u32, height: u32, block_size: u32) -> (u32, u32) {
        let align = |v: u32| ((v / block_size) * block_size).max(block_size);
        (align(width), align(height))
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Side of a block in pixels.
    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Blocks per row.
    #[inline]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Blocks per column.
    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// The whole frame.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Returns true if a frame of this resolution fits the grid.
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Block at grid coordinates, if inside the grid.
    pub fn block(&self, grid_x: u32, grid_y: u32) -> Option<Block> {
        (grid_x < self.columns && grid_y < self.rows)
            .then(|| Block::new(grid_x, grid_y, self.block_size))
    }

    /// Block at a row-major index.
    pub fn block_at_index(&self, index: usize) -> Block {
        let columns = self.columns as usize;
        Block::new(
            (index % columns) as u32,
            (index / columns) as u32,
            self.block_size,
        )
    }

    /// Row-major index of a block.
    pub fn index_of(&self, block: &Block) -> usize {
        block.grid_y as usize * self.columns as usize + block.grid_x as usize
    }

    /// All blocks, row-major.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.block_count()).map(move |i| self.block_at_index(i))
    }

    /// The up-to-eight blocks surrounding `block`.
    pub fn neighbors(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        let x = block.grid_x as i64;
        let y = block.grid_y as i64;
        (-1i64..=1)
            .flat_map(move |dy| (-1i64..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .filter_map(move |(dx, dy)| {
                let nx = u32::try_from(x + dx).ok()?;
                let ny = u32::try_from(y + dy).ok()?;
                self.block(nx, ny)
            })
    }

    /// Blocks sharing at least one pixel with `rect`, row-major.
    pub fn blocks_overlapping(&self, rect: Rect) -> impl Iterator<Item = Block> + '_ {
        let clipped = rect.intersection(&self.bounds());
        let (x0, y0, x1, y1) = match clipped {
            Some(r) => (
                r.x / self.block_size,
                r.y / self.block_size,
                (r.right() - 1) / self.block_size + 1,
                (r.bottom() - 1) / self.block_size + 1,
            ),
            None => (0, 0, 0, 0),
        };
        (y0..y1).flat_map(move |gy| (x0..x1).map(move |gx| Block::new(gx, gy, self.block_size)))
    }
}
