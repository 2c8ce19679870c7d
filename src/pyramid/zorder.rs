//! Z-order (Morton) linearization of tile coordinates.
//!
//! Column bits occupy the even bit positions and row bits the odd ones, so the
//! four children of a tile at level `L` map to four consecutive indices at
//! level `L + 1`:
//!
//! ```text
//! index(2r + dr, 2c + dc, L + 1) == 4 * index(r, c, L) + (2 * dr + dc)
//! ```
//!
//! A tile therefore covers one contiguous run of the finest grid, which is what
//! lets the presence map record a coarse tile with a single range fill.

/// Spread the low 32 bits of `v` so that bit `i` moves to bit `2i`.
#[inline]
fn spread_bits(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: gather the even bits of `v`.
#[inline]
fn compact_bits(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Number of tiles along one side of the grid at `level`.
#[inline]
pub fn grid_side(level: u32) -> u32 {
    1 << level
}

/// Number of tiles in the whole grid at `level`.
#[inline]
pub fn grid_len(level: u32) -> u64 {
    1u64 << (2 * level)
}

/// Morton index of the tile at `(row, col)` on the grid of `level`.
///
/// The result lies in `[0, grid_len(level))` for coordinates inside the grid.
/// `level` does not change the interleaving; it only bounds the valid domain.
#[inline]
pub fn index(row: u32, col: u32, level: u32) -> u64 {
    debug_assert!(row < grid_side(level) && col < grid_side(level));
    spread_bits(col) | (spread_bits(row) << 1)
}

/// Recover `(row, col)` from a Morton index.
#[inline]
pub fn coords(index: u64, level: u32) -> (u32, u32) {
    debug_assert!(index < grid_len(level));
    (compact_bits(index >> 1), compact_bits(index))
}

/// Rescale an index at `level` to the first covered index on the grid of
/// `max_level`.
#[inline]
pub fn to_finest(index: u64, level: u32, max_level: u32) -> u64 {
    index << (2 * (max_level - level))
}

/// Number of finest-grid cells covered by one tile at `level`.
#[inline]
pub fn cells_per_tile(level: u32, max_level: u32) -> u64 {
    1u64 << (2 * (max_level - level))
}
