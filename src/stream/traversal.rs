//! Expanding-ring traversal over the tile pyramid.
//!
//! The search is anchored at the tiles under the viewport. It walks the
//! window around the anchor row by row, level by level from coarse to fine.
//! Once the finest level's window is done it widens the window by one tile
//! on every side ("ring"), goes back to the coarsest level, and walks only
//! the newly uncovered band of each level.
//!
//! ```text
//!   ring 0:  level min ──► level min+1 ──► ... ──► level max
//!                                                     │
//!            ┌────────────────────────────────────────┘
//!            ▼
//!   ring 1:  level min ──► ... ──► level max   (bands only)
//!            ...
//!   until every level's window is the whole grid and fully walked
//! ```
//!
//! Tiles already present in the [`PresenceMap`] at their own level are
//! skipped, so the same search can be resumed after data arrives or after
//! the viewport moves.

use crate::pyramid::{zorder, PixelRect, PresenceMap, PyramidImage};

use super::request::TileCoord;
use super::viewport::Viewport;

/// Inclusive tile window `[start_row, end_row] × [start_col, end_col]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl Window {
    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.start_row..=self.end_row).contains(&row)
            && (self.start_col..=self.end_col).contains(&col)
    }

    /// Whether the window spans the whole grid of `level`.
    pub fn covers_grid(&self, level: u32) -> bool {
        let last = zorder::grid_side(level) - 1;
        self.start_row == 0 && self.start_col == 0 && self.end_row == last && self.end_col == last
    }
}

/// Resumable ring search state.
#[derive(Debug, Clone)]
pub struct RingSearch {
    min_level: u32,
    max_level: u32,
    width: u32,
    height: u32,
    anchor: PixelRect,
    level: u32,
    ring: u32,
    window: Window,
    /// Window of the previous ring at the same level, already walked
    inner: Option<Window>,
    row: u32,
    col: u32,
    exhausted: bool,
}

impl RingSearch {
    /// Start a search for an image of `width × height` around `anchor`.
    pub fn new(min_level: u32, max_level: u32, width: u32, height: u32, anchor: PixelRect) -> Self {
        debug_assert!(min_level <= max_level);
        let empty = Window {
            start_row: 0,
            start_col: 0,
            end_row: 0,
            end_col: 0,
        };
        let mut search = Self {
            min_level,
            max_level,
            width,
            height,
            anchor,
            level: min_level,
            ring: 0,
            window: empty,
            inner: None,
            row: 0,
            col: 0,
            exhausted: false,
        };
        search.restart(anchor);
        search
    }

    /// Start a search over `image` anchored at `viewport`.
    pub fn for_image(image: &dyn PyramidImage, viewport: &Viewport) -> Self {
        let anchor = viewport.to_pixel_rect(image.width(), image.height());
        Self::new(
            image.min_level(),
            image.max_level(),
            image.width(),
            image.height(),
            anchor,
        )
    }

    /// Re-anchor the search and rewind it to the coarsest level, ring 0.
    pub fn restart(&mut self, anchor: PixelRect) {
        self.anchor = anchor;
        self.level = self.min_level;
        self.ring = 0;
        self.exhausted = false;
        self.enter_window();
    }

    /// Tile under the cursor.
    pub fn position(&self) -> TileCoord {
        TileCoord::new(self.row, self.col, self.level)
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn ring(&self) -> u32 {
        self.ring
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// First candidate at or after the cursor.
    pub fn first(&mut self, presence: &PresenceMap) -> Option<TileCoord> {
        if self.exhausted {
            return None;
        }
        if self.is_candidate(presence) {
            return Some(self.position());
        }
        self.advance(presence)
    }

    /// Next candidate strictly after the cursor, or `None` once the whole
    /// pyramid has been walked.
    pub fn advance(&mut self, presence: &PresenceMap) -> Option<TileCoord> {
        while self.step() {
            if self.is_candidate(presence) {
                return Some(self.position());
            }
        }
        None
    }

    /// Window at `ring` around the anchor on the grid of `level`.
    fn window_at(&self, ring: u32, level: u32) -> Window {
        let side = zorder::grid_side(level);
        let last = side - 1;
        let delta_w = self.width as f64 / side as f64;
        let delta_h = self.height as f64 / side as f64;

        let top = ((self.anchor.y as f64 / delta_h) as u32).min(last);
        let left = ((self.anchor.x as f64 / delta_w) as u32).min(last);
        let bottom = ((self.anchor.bottom() as f64 / delta_h) as u32).min(last);
        let right = ((self.anchor.right() as f64 / delta_w) as u32).min(last);

        Window {
            start_row: top.saturating_sub(ring),
            start_col: left.saturating_sub(ring),
            end_row: bottom.saturating_add(ring).min(last),
            end_col: right.saturating_add(ring).min(last),
        }
    }

    /// Whether `ring` spans the whole grid at every level.
    fn ring_covers_pyramid(&self, ring: u32) -> bool {
        (self.min_level..=self.max_level)
            .all(|level| self.window_at(ring, level).covers_grid(level))
    }

    fn enter_window(&mut self) {
        self.window = self.window_at(self.ring, self.level);
        self.inner = if self.ring > 0 {
            Some(self.window_at(self.ring - 1, self.level))
        } else {
            None
        };
        self.row = self.window.start_row;
        self.col = self.window.start_col;
    }

    /// Move the cursor one cell in walk order. Returns false once exhausted.
    fn step(&mut self) -> bool {
        if self.exhausted {
            return false;
        }

        if self.row == self.window.end_row && self.col == self.window.end_col {
            if self.level < self.max_level {
                self.level += 1;
            } else if self.ring_covers_pyramid(self.ring) {
                self.exhausted = true;
                return false;
            } else {
                self.ring += 1;
                self.level = self.min_level;
            }
            self.enter_window();
        } else if self.col == self.window.end_col {
            self.col = self.window.start_col;
            self.row += 1;
        } else {
            self.col += 1;
        }
        true
    }

    /// Whether the cursor cell should be fetched.
    ///
    /// Cells inside the previous ring are skipped in one jump to the inner
    /// window's right edge.
    fn is_candidate(&mut self, presence: &PresenceMap) -> bool {
        if let Some(inner) = self.inner {
            if inner.contains(self.row, self.col) {
                self.col = inner.end_col;
                return false;
            }
        }
        !presence.is_tile_present(self.row, self.col, self.level)
    }
}
