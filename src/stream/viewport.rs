use crate::pyramid::PixelRect;

/// Visible region of the image, in full-resolution image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Viewport covering a whole `width × height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    /// Smallest whole-pixel rectangle containing the viewport, clipped to a
    /// `width × height` image.
    ///
    /// A viewport entirely outside the image collapses onto the nearest
    /// edge pixel, so the traversal always has an anchor. A viewport with a
    /// NaN or infinite field maps to the whole image.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> PixelRect {
        if !self.is_finite() {
            return PixelRect::new(0, 0, width.max(1), height.max(1));
        }
        let max_x = width.saturating_sub(1) as f64;
        let max_y = height.saturating_sub(1) as f64;

        let left = self.x.floor().clamp(0.0, max_x);
        let top = self.y.floor().clamp(0.0, max_y);
        let right = ((self.x + self.width).ceil() - 1.0).clamp(left, max_x);
        let bottom = ((self.y + self.height).ceil() - 1.0).clamp(top, max_y);

        PixelRect::new(
            left as u32,
            top as u32,
            (right - left) as u32 + 1,
            (bottom - top) as u32 + 1,
        )
    }
}
