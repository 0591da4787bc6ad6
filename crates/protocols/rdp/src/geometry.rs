/// DPI at which one device-independent unit is one physical pixel.
pub const BASE_DPI: u32 = 96;

/// A rectangle in device-independent units, relative to the client area of
/// the top-level window that hosts it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Zero-area, sub-pixel or not-yet-measured rectangles.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite();
        !finite || self.width <= 1.0 || self.height <= 1.0
    }
}

/// A rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Scales a layout rectangle to physical pixels for the given window DPI.
///
/// Returns `None` for degenerate input and for a zero DPI.
pub fn to_physical(layout: LayoutRect, dpi: u32) -> Option<PixelRect> {
    if layout.is_degenerate() || dpi == 0 {
        return None;
    }

    let scale = f64::from(dpi) / f64::from(BASE_DPI);
    let rect = PixelRect {
        x: (layout.x * scale).round() as i32,
        y: (layout.y * scale).round() as i32,
        width: (layout.width * scale).round() as i32,
        height: (layout.height * scale).round() as i32,
    };

    (rect.width > 0 && rect.height > 0).then_some(rect)
}

/// Inverse of [`to_physical`], for platforms that measure in pixels.
pub fn to_layout(rect: PixelRect, dpi: u32) -> LayoutRect {
    let scale = f64::from(BASE_DPI) / f64::from(dpi.max(1));
    LayoutRect {
        x: f64::from(rect.x) * scale,
        y: f64::from(rect.y) * scale,
        width: f64::from(rect.width) * scale,
        height: f64::from(rect.height) * scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_by_window_dpi() {
        let layout = LayoutRect::new(10.0, 20.5, 800.0, 600.0);
        assert_eq!(to_physical(layout, 96), Some(PixelRect::new(10, 21, 800, 600)));
        assert_eq!(to_physical(layout, 144), Some(PixelRect::new(15, 31, 1200, 900)));
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert_eq!(to_physical(LayoutRect::new(0.0, 0.0, 0.0, 0.0), 96), None);
        assert_eq!(to_physical(LayoutRect::new(0.0, 0.0, 1.0, 1.0), 96), None);
        assert_eq!(to_physical(LayoutRect::new(0.0, 0.0, f64::NAN, 50.0), 96), None);
        assert_eq!(to_physical(LayoutRect::new(0.0, 0.0, 50.0, 50.0), 0), None);
    }

    #[test]
    fn layout_conversion_round_trips_at_integral_scale() {
        let rect = PixelRect::new(30, 60, 1200, 900);
        assert_eq!(to_physical(to_layout(rect, 192), 192), Some(rect));
    }
}
