//! Capability interface for remotely streamed image pyramids.
//!
//! The streaming worker is written once against [`PyramidImage`]; each image
//! variant (a plain raster, a multi-view capture, ...) implements it and owns
//! its own decode path and [`PresenceMap`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::PyramidError;

use super::presence::PresenceMap;
use super::zorder;

// =============================================================================
// Pixel Rectangle
// =============================================================================

/// Integer rectangle in full-resolution image coordinates.
///
/// `x`/`y` is the top-left corner; the rectangle spans `width × height`
/// pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive right edge. Equal to `x` for an empty rectangle.
    pub fn right(&self) -> u32 {
        self.x + self.width.saturating_sub(1)
    }

    /// Inclusive bottom edge. Equal to `y` for an empty rectangle.
    pub fn bottom(&self) -> u32 {
        self.y + self.height.saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Region of the full-resolution image covered by tile `(row, col)` at
/// `level`.
///
/// The image is split into `2^level` equal bands per axis and the band edges
/// are truncated to whole pixels, so adjacent tiles share edges without gaps.
pub fn tile_rect(width: u32, height: u32, row: u32, col: u32, level: u32) -> PixelRect {
    let side = zorder::grid_side(level) as f64;
    let delta_w = width as f64 / side;
    let delta_h = height as f64 / side;

    let x1 = (delta_w * col as f64) as u32;
    let x2 = (delta_w * (col + 1) as f64) as u32;
    let y1 = (delta_h * row as f64) as u32;
    let y2 = (delta_h * (row + 1) as f64) as u32;

    PixelRect::new(x1, y1, x2 - x1, y2 - y1)
}

// =============================================================================
// PyramidImage Trait
// =============================================================================

/// A multi-resolution image whose tiles arrive incrementally.
///
/// Levels run from `min_level()` (coarsest) to `max_level()` (finest); the
/// tile grid at level `L` has `2^L` tiles per side.
pub trait PyramidImage: Send + Sync {
    /// Width of the full-resolution image in pixels.
    fn width(&self) -> u32;

    /// Height of the full-resolution image in pixels.
    fn height(&self) -> u32;

    /// Coarsest level served remotely.
    fn min_level(&self) -> u32;

    /// Finest level served remotely.
    fn max_level(&self) -> u32;

    /// File extension of remote tile resources (e.g. `"jpg"`).
    fn tile_extension(&self) -> &str;

    /// Decode a tile payload into the region `rect` at `level`.
    fn decode_tile_into(
        &mut self,
        payload: &[u8],
        rect: PixelRect,
        level: u32,
    ) -> Result<(), PyramidError>;

    /// Which levels have been received for each finest cell.
    fn presence(&self) -> &PresenceMap;

    /// Mutable access for recording receipts.
    fn presence_mut(&mut self) -> &mut PresenceMap;
}

/// A pyramid shared between the streaming worker and the renderer.
pub type SharedPyramid = Arc<RwLock<dyn PyramidImage>>;

/// Wrap a pyramid for sharing with the worker.
pub fn share<P: PyramidImage + 'static>(pyramid: P) -> SharedPyramid {
    Arc::new(RwLock::new(pyramid))
}
