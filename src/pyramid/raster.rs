//! In-memory raster pyramid.
//!
//! [`RasterPyramid`] is the plain single-view implementation of
//! [`PyramidImage`]: tile payloads are ordinary images (JPEG or PNG) decoded
//! with the `image` crate and kept per level, together with the thumbnail.
//! It can composite everything received so far into one preview image.

use std::collections::HashMap;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::PyramidError;

use super::metadata::PyramidMetadata;
use super::presence::PresenceMap;
use super::traits::{tile_rect, PixelRect, PyramidImage};
use super::zorder;

/// A decoded tile and the image region it covers.
#[derive(Debug, Clone)]
pub struct DecodedTile {
    /// Region in full-resolution coordinates
    pub rect: PixelRect,

    /// Level the tile was fetched at
    pub level: u32,

    /// Decoded pixels at the tile's native size
    pub pixels: RgbaImage,
}

/// Raster image pyramid filled tile by tile.
pub struct RasterPyramid {
    metadata: PyramidMetadata,
    presence: PresenceMap,
    /// Decoded tiles keyed by `(level, x, y)` of their region
    tiles: HashMap<(u32, u32, u32), DecodedTile>,
    thumbnail: Option<RgbaImage>,
}

impl RasterPyramid {
    /// Allocate an empty pyramid for the described remote image.
    pub fn new(metadata: PyramidMetadata) -> Result<Self, PyramidError> {
        metadata.validate()?;
        let presence = PresenceMap::new(metadata.max_level);
        Ok(Self {
            metadata,
            presence,
            tiles: HashMap::new(),
            thumbnail: None,
        })
    }

    pub fn metadata(&self) -> &PyramidMetadata {
        &self.metadata
    }

    /// Decode and keep the thumbnail.
    pub fn set_thumbnail(&mut self, payload: &[u8]) -> Result<(), PyramidError> {
        let image = image::load_from_memory(payload).map_err(|e| PyramidError::Decode {
            level: self.metadata.min_level,
            message: format!("thumbnail: {}", e),
        })?;
        self.thumbnail = Some(image.to_rgba8());
        Ok(())
    }

    pub fn thumbnail(&self) -> Option<&RgbaImage> {
        self.thumbnail.as_ref()
    }

    /// Number of decoded tiles held.
    pub fn decoded_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Decoded tile `(row, col)` at `level`, if received.
    pub fn tile(&self, row: u32, col: u32, level: u32) -> Option<&DecodedTile> {
        let rect = tile_rect(self.metadata.width, self.metadata.height, row, col, level);
        self.tiles.get(&(level, rect.x, rect.y))
    }

    /// Finest decoded tile covering pixel `(x, y)`.
    pub fn best_tile_at(&self, x: u32, y: u32) -> Option<&DecodedTile> {
        if x >= self.metadata.width || y >= self.metadata.height {
            return None;
        }
        let max_level = self.metadata.max_level;
        let side = zorder::grid_side(max_level) as u64;
        let row = (y as u64 * side / self.metadata.height as u64) as u32;
        let col = (x as u64 * side / self.metadata.width as u64) as u32;

        let finest = zorder::index(row, col, max_level);
        let level = self.presence.finest_level_at(finest)?;
        let shift = max_level - level;
        self.tile(row >> shift, col >> shift, level)
    }

    /// Composite the thumbnail and all received tiles, coarse to fine.
    ///
    /// `scale` maps full-resolution pixels to output pixels.
    pub fn compose(&self, scale: f64) -> RgbaImage {
        let out_w = ((self.metadata.width as f64 * scale).round() as u32).max(1);
        let out_h = ((self.metadata.height as f64 * scale).round() as u32).max(1);

        let mut canvas = match &self.thumbnail {
            Some(thumb) => imageops::resize(thumb, out_w, out_h, FilterType::Triangle),
            None => RgbaImage::new(out_w, out_h),
        };

        for level in self.metadata.min_level..=self.metadata.max_level {
            for tile in self.tiles.values().filter(|t| t.level == level) {
                let x = (tile.rect.x as f64 * scale).floor() as i64;
                let y = (tile.rect.y as f64 * scale).floor() as i64;
                let w = ((tile.rect.width as f64 * scale).ceil() as u32).max(1);
                let h = ((tile.rect.height as f64 * scale).ceil() as u32).max(1);
                let resized = imageops::resize(&tile.pixels, w, h, FilterType::Triangle);
                imageops::overlay(&mut canvas, &resized, x, y);
            }
        }

        canvas
    }
}

impl PyramidImage for RasterPyramid {
    fn width(&self) -> u32 {
        self.metadata.width
    }

    fn height(&self) -> u32 {
        self.metadata.height
    }

    fn min_level(&self) -> u32 {
        self.metadata.min_level
    }

    fn max_level(&self) -> u32 {
        self.metadata.max_level
    }

    fn tile_extension(&self) -> &str {
        &self.metadata.format
    }

    fn decode_tile_into(
        &mut self,
        payload: &[u8],
        rect: PixelRect,
        level: u32,
    ) -> Result<(), PyramidError> {
        if level < self.metadata.min_level || level > self.metadata.max_level {
            return Err(PyramidError::LevelOutOfRange {
                level,
                min_level: self.metadata.min_level,
                max_level: self.metadata.max_level,
            });
        }

        let image = image::load_from_memory(payload).map_err(|e| PyramidError::Decode {
            level,
            message: e.to_string(),
        })?;

        // Images narrower than the grid produce zero-area tiles.
        if rect.is_empty() {
            return Ok(());
        }

        self.tiles.insert(
            (level, rect.x, rect.y),
            DecodedTile {
                rect,
                level,
                pixels: image.to_rgba8(),
            },
        );
        Ok(())
    }

    fn presence(&self) -> &PresenceMap {
        &self.presence
    }

    fn presence_mut(&mut self) -> &mut PresenceMap {
        &mut self.presence
    }
}
