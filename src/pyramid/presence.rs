//! Resolution presence map.
//!
//! One 16-bit mask per cell of the finest grid, indexed by Morton order. Bit
//! `k` of a cell is set once a tile at level `k` covering that cell has been
//! received. Bits are only ever set, never cleared.

use super::zorder;

/// Highest `max_level` a presence map can be built for.
///
/// The finest grid then holds `4^12` cells (32 MiB of masks).
pub const MAX_SUPPORTED_LEVEL: u32 = 12;

/// Per-cell bitmask of received resolution levels.
#[derive(Debug, Clone)]
pub struct PresenceMap {
    max_level: u32,
    cells: Vec<u16>,
}

impl PresenceMap {
    /// Create an empty map for a pyramid whose finest level is `max_level`.
    ///
    /// # Panics
    ///
    /// Panics if `max_level` exceeds [`MAX_SUPPORTED_LEVEL`]. Metadata is
    /// validated before a map is built, so this only fires on misuse.
    pub fn new(max_level: u32) -> Self {
        assert!(
            max_level <= MAX_SUPPORTED_LEVEL,
            "max_level {max_level} exceeds supported {MAX_SUPPORTED_LEVEL}"
        );
        Self {
            max_level,
            cells: vec![0; zorder::grid_len(max_level) as usize],
        }
    }

    /// Finest level of the grid this map tracks.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Number of cells on the finest grid.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false: even a single-level pyramid has one cell.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether data at `level` covers the finest cell `finest_index`.
    #[inline]
    pub fn is_present(&self, finest_index: u64, level: u32) -> bool {
        self.cells
            .get(finest_index as usize)
            .map(|mask| mask & (1 << level) != 0)
            .unwrap_or(false)
    }

    /// Whether the tile `(row, col)` at `level` has been received.
    pub fn is_tile_present(&self, row: u32, col: u32, level: u32) -> bool {
        if !self.in_grid(row, col, level) {
            return false;
        }
        let finest = zorder::to_finest(zorder::index(row, col, level), level, self.max_level);
        self.is_present(finest, level)
    }

    /// Record the tile `(row, col)` at `level` as received.
    ///
    /// Sets bit `level` over the contiguous run of finest cells the tile
    /// covers. Repeated calls leave the map unchanged, and tiles outside the
    /// pyramid are ignored.
    pub fn mark_received(&mut self, row: u32, col: u32, level: u32) {
        if !self.in_grid(row, col, level) {
            return;
        }
        let start = zorder::to_finest(zorder::index(row, col, level), level, self.max_level) as usize;
        let run = zorder::cells_per_tile(level, self.max_level) as usize;
        let Some(cells) = self.cells.get_mut(start..start + run) else {
            return;
        };
        let bit = 1u16 << level;
        for mask in cells {
            *mask |= bit;
        }
    }

    fn in_grid(&self, row: u32, col: u32, level: u32) -> bool {
        level <= self.max_level
            && row < zorder::grid_side(level)
            && col < zorder::grid_side(level)
    }

    /// Finest level received for the cell, if any.
    pub fn finest_level_at(&self, finest_index: u64) -> Option<u32> {
        match self.cells.get(finest_index as usize) {
            Some(&mask) if mask != 0 => Some(15 - mask.leading_zeros()),
            _ => None,
        }
    }

    /// Number of finest cells covered by data at `level`.
    pub fn covered_cells(&self, level: u32) -> usize {
        let bit = 1u16 << level;
        self.cells.iter().filter(|mask| *mask & bit != 0).count()
    }

    /// True once every cell has been received at the finest level.
    pub fn is_complete(&self) -> bool {
        let bit = 1u16 << self.max_level;
        self.cells.iter().all(|mask| mask & bit != 0)
    }
}
