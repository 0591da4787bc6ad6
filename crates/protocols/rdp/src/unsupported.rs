//! Stand-ins for hosts without the Win32 RDP control.

use crate::automation::{AutomationBinder, RdpAutomation};
use crate::error::SessionError;
use crate::geometry::PixelRect;
use crate::platform::{WindowId, WindowPlatform};

const UNSUPPORTED: &str = "embedded RDP sessions are only supported on Windows";

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPlatform;

impl WindowPlatform for UnsupportedPlatform {
    fn create_child(&self, _owner: WindowId) -> Result<WindowId, SessionError> {
        Err(SessionError::Platform(UNSUPPORTED.into()))
    }

    fn set_bounds(&self, _window: WindowId, _rect: PixelRect) {}

    fn reparent(&self, _window: WindowId, _new_owner: WindowId) -> Result<(), SessionError> {
        Err(SessionError::Platform(UNSUPPORTED.into()))
    }

    fn show(&self, _window: WindowId) {}

    fn hide(&self, _window: WindowId) {}

    fn destroy(&self, _window: WindowId) {}

    fn dpi_for(&self, _window: WindowId) -> Option<u32> {
        None
    }

    fn focus(&self, _owner: WindowId, _child: WindowId) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBinder;

impl AutomationBinder for UnsupportedBinder {
    fn bind(&self, _window: WindowId) -> Result<Box<dyn RdpAutomation>, SessionError> {
        Err(SessionError::Binding(UNSUPPORTED.into()))
    }
}
