//! Remote pyramid metadata document.
//!
//! The base location serves a small JSON document describing the pyramid:
//!
//! ```json
//! { "width": 8000, "height": 6000, "min_level": 1, "max_level": 5, "format": "jpg" }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::PyramidError;

use super::presence::MAX_SUPPORTED_LEVEL;

/// Relative path of the metadata document.
pub const METADATA_PATH: &str = "info.json";

/// Relative path of the thumbnail image.
pub const THUMBNAIL_PATH: &str = "thumb.jpg";

/// Tile extension used when the metadata omits `format`.
pub const DEFAULT_TILE_FORMAT: &str = "jpg";

fn default_format() -> String {
    DEFAULT_TILE_FORMAT.to_string()
}

/// Description of a remote image pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidMetadata {
    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Coarsest level available remotely
    pub min_level: u32,

    /// Finest level available remotely
    pub max_level: u32,

    /// Tile file extension
    #[serde(default = "default_format")]
    pub format: String,

    /// Free-form image type reported by the producer
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
}

impl PyramidMetadata {
    /// Parse and validate a metadata document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PyramidError> {
        let metadata: PyramidMetadata = serde_json::from_slice(bytes)
            .map_err(|e| PyramidError::ProtocolViolation(format!("malformed metadata: {}", e)))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check that dimensions and resolution bounds are usable.
    pub fn validate(&self) -> Result<(), PyramidError> {
        if self.width == 0 || self.height == 0 {
            return Err(PyramidError::ProtocolViolation(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if self.min_level > self.max_level || self.max_level > MAX_SUPPORTED_LEVEL {
            return Err(PyramidError::InvalidLevels {
                min_level: self.min_level,
                max_level: self.max_level,
                supported: MAX_SUPPORTED_LEVEL,
            });
        }

        if self.format.is_empty()
            || !self.format.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(PyramidError::ProtocolViolation(format!(
                "invalid tile format {:?}",
                self.format
            )));
        }

        Ok(())
    }

    /// Total number of tiles across all remote levels.
    pub fn tile_count(&self) -> u64 {
        (self.min_level..=self.max_level)
            .map(super::zorder::grid_len)
            .sum()
    }
}
