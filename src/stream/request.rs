use std::fmt;

use crate::pyramid::{tile_rect, zorder, PixelRect};

/// Number of consecutive failed fetches after which a tile is abandoned.
pub const MAX_ATTEMPTS: u8 = 3;

/// Grid coordinates of a tile at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub row: u32,
    pub col: u32,
    pub level: u32,
}

impl TileCoord {
    pub fn new(row: u32, col: u32, level: u32) -> Self {
        Self { row, col, level }
    }

    /// Morton index of the tile on its level's grid.
    pub fn index(&self) -> u64 {
        zorder::index(self.row, self.col, self.level)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} ({}, {})", self.level, self.row, self.col)
    }
}

/// A pending or in-flight tile fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Tile row (0-indexed from top)
    pub row: u32,

    /// Tile column (0-indexed from left)
    pub col: u32,

    /// Pyramid level (0 = coarsest)
    pub level: u32,

    /// Morton index at `level`
    pub index: u64,

    /// Consecutive failed fetches so far, at most [`MAX_ATTEMPTS`]
    pub attempts: u8,
}

impl TileRequest {
    /// Create a fresh request for the tile at `coord`.
    pub fn new(coord: TileCoord) -> Self {
        Self {
            row: coord.row,
            col: coord.col,
            level: coord.level,
            index: coord.index(),
            attempts: 0,
        }
    }

    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.row, self.col, self.level)
    }

    /// Relative path of the tile resource, e.g. `tile_lvl3_17.jpg`.
    pub fn path(&self, extension: &str) -> String {
        format!("tile_lvl{}_{}.{}", self.level, self.index, extension)
    }

    /// Region of the full-resolution image this tile covers.
    pub fn rect(&self, width: u32, height: u32) -> PixelRect {
        tile_rect(width, height, self.row, self.col, self.level)
    }

    /// Record a failed fetch. Returns true once the retry budget is spent.
    pub fn record_failure(&mut self) -> bool {
        self.attempts = (self.attempts + 1).min(MAX_ATTEMPTS);
        self.attempts >= MAX_ATTEMPTS
    }
}
