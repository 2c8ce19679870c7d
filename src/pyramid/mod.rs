//! Image pyramid abstraction layer.
//!
//! This module describes what the streaming engine needs to know about a
//! remote multi-resolution image, independent of how tiles are decoded or
//! rendered.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Streaming Worker             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          PyramidImage Trait             │
//! │  (dimensions, levels, decode, presence) │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  RasterPyramid  │    │    PresenceMap      │
//! │ (decoded tiles) │    │ (Morton-indexed     │
//! │                 │    │  level bitmasks)    │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Levels
//!
//! Level `L` is a grid of `2^L × 2^L` tiles. Lower levels are coarser. The
//! presence map tracks, for every cell of the finest grid, which levels have
//! already been received.

mod metadata;
mod presence;
mod raster;
mod traits;
pub mod zorder;

pub use metadata::{PyramidMetadata, DEFAULT_TILE_FORMAT, METADATA_PATH, THUMBNAIL_PATH};
pub use presence::{PresenceMap, MAX_SUPPORTED_LEVEL};
pub use raster::{DecodedTile, RasterPyramid};
pub use traits::{share, tile_rect, PixelRect, PyramidImage, SharedPyramid};
