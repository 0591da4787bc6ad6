use crate::error::SessionError;
use crate::geometry::{LayoutRect, PixelRect};

/// Opaque native window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub isize);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Native windowing operations the embed needs. All calls happen on the UI
/// thread that owns the windows.
pub trait WindowPlatform {
    /// Creates a child window under `owner`'s client area.
    fn create_child(&self, owner: WindowId) -> Result<WindowId, SessionError>;

    /// Moves and resizes `window` in its owner's client coordinates.
    fn set_bounds(&self, window: WindowId, rect: PixelRect);

    fn reparent(&self, window: WindowId, new_owner: WindowId) -> Result<(), SessionError>;

    fn show(&self, window: WindowId);

    fn hide(&self, window: WindowId);

    fn destroy(&self, window: WindowId);

    /// DPI of the monitor `window` is on; `None` when the lookup fails.
    fn dpi_for(&self, window: WindowId) -> Option<u32>;

    /// Gives input focus to `child`, and to the first window nested inside it.
    fn focus(&self, owner: WindowId, child: WindowId);
}

/// Where the hosting area currently sits inside its top-level window.
pub trait LayoutSource {
    /// `None` until the area has been laid out.
    fn layout_rect(&self) -> Option<LayoutRect>;
}
