//! OLE site for one session's control.
//!
//! [`SessionSite`] is the client and in-place site over the session's host
//! window. The frame it hands out is the top-level container window the tab
//! lives in, so it follows the session when it is docked or undocked.
use windows::core::{implement, Error, OutRef, Ref, BOOL, HRESULT, PCWSTR};
use windows::Win32::Foundation::{E_NOINTERFACE, E_NOTIMPL, HWND, RECT, SIZE, S_FALSE};
use windows::Win32::System::Com::IMoniker;
use windows::Win32::System::Ole::{
    IOleClientSite, IOleClientSite_Impl, IOleContainer, IOleInPlaceActiveObject, IOleInPlaceFrame,
    IOleInPlaceFrame_Impl, IOleInPlaceSite, IOleInPlaceSite_Impl, IOleInPlaceUIWindow,
    IOleInPlaceUIWindow_Impl, IOleWindow_Impl, OLEGETMONIKER, OLEINPLACEFRAMEINFO,
    OLEMENUGROUPWIDTHS, OLEWHICHMK,
};
use windows::Win32::UI::WindowsAndMessaging::{GetAncestor, GetClientRect, GA_ROOT, HACCEL, HMENU, MSG};

use crate::platform::WindowId;
use crate::win32::{to_hwnd, window_id};

const INPLACE_E_NOTOOLSPACE: HRESULT = HRESULT(0x8004_01A1_u32 as i32);

#[implement(IOleClientSite, IOleInPlaceSite)]
pub struct SessionSite {
    host: WindowId,
}

impl SessionSite {
    pub fn new(host: HWND) -> Self {
        Self { host: window_id(host) }
    }

    fn frame_window(&self) -> HWND {
        let host = to_hwnd(self.host);
        match unsafe { GetAncestor(host, GA_ROOT) } {
            root if root.is_invalid() => host,
            root => root,
        }
    }
}

impl IOleClientSite_Impl for SessionSite_Impl {
    fn SaveObject(&self) -> windows::core::Result<()> {
        Ok(())
    }

    fn GetMoniker(&self, _dwassign: &OLEGETMONIKER, _dwwhichmoniker: &OLEWHICHMK) -> windows::core::Result<IMoniker> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetContainer(&self) -> windows::core::Result<IOleContainer> {
        Err(Error::from(E_NOINTERFACE))
    }

    fn ShowObject(&self) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnShowWindow(&self, _fshow: BOOL) -> windows::core::Result<()> {
        Ok(())
    }

    fn RequestNewObjectLayout(&self) -> windows::core::Result<()> {
        Err(Error::from(E_NOTIMPL))
    }
}

impl IOleWindow_Impl for SessionSite_Impl {
    fn GetWindow(&self) -> windows::core::Result<HWND> {
        Ok(to_hwnd(self.host))
    }

    fn ContextSensitiveHelp(&self, _fentermode: BOOL) -> windows::core::Result<()> {
        Err(Error::from(E_NOTIMPL))
    }
}

impl IOleInPlaceSite_Impl for SessionSite_Impl {
    fn CanInPlaceActivate(&self) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnInPlaceActivate(&self) -> windows::core::Result<()> {
        tracing::trace!(hwnd = %self.host, "control in-place active");
        Ok(())
    }

    fn OnUIActivate(&self) -> windows::core::Result<()> {
        Ok(())
    }

    fn GetWindowContext(
        &self,
        ppframe: OutRef<'_, IOleInPlaceFrame>,
        ppdoc: OutRef<'_, IOleInPlaceUIWindow>,
        lprcposrect: *mut RECT,
        lprccliprect: *mut RECT,
        lpframeinfo: *mut OLEINPLACEFRAMEINFO,
    ) -> windows::core::Result<()> {
        let frame_window = self.frame_window();
        let frame: IOleInPlaceFrame = ContainerFrame {
            frame: window_id(frame_window),
        }
        .into();
        unsafe {
            if !ppframe.is_null() {
                ppframe.write(Some(frame))?;
            }
            if !ppdoc.is_null() {
                ppdoc.write(None)?;
            }
        }

        // The control always fills its host window.
        let mut client = RECT::default();
        unsafe {
            let _ = GetClientRect(to_hwnd(self.host), &mut client);
            if let Some(position) = lprcposrect.as_mut() {
                *position = client;
            }
            if let Some(clip) = lprccliprect.as_mut() {
                *clip = client;
            }
            if let Some(info) = lpframeinfo.as_mut() {
                info.fMDIApp = BOOL(0);
                info.hwndFrame = frame_window;
                info.haccel = HACCEL::default();
                info.cAccelEntries = 0;
            }
        }
        Ok(())
    }

    fn Scroll(&self, _scrollextant: &SIZE) -> windows::core::Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn OnUIDeactivate(&self, _fundoable: BOOL) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnInPlaceDeactivate(&self) -> windows::core::Result<()> {
        tracing::trace!(hwnd = %self.host, "control in-place deactivated");
        Ok(())
    }

    fn DiscardUndoState(&self) -> windows::core::Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn DeactivateAndUndo(&self) -> windows::core::Result<()> {
        Err(Error::from(E_NOTIMPL))
    }

    fn OnPosRectChange(&self, _lprcposrect: *const RECT) -> windows::core::Result<()> {
        // Geometry is driven by the host window's WM_SIZE.
        Ok(())
    }
}

/// The container window as the control's in-place frame. It offers no
/// menus, toolbars or accelerators.
#[implement(IOleInPlaceFrame)]
struct ContainerFrame {
    frame: WindowId,
}

impl IOleWindow_Impl for ContainerFrame_Impl {
    fn GetWindow(&self) -> windows::core::Result<HWND> {
        Ok(to_hwnd(self.frame))
    }

    fn ContextSensitiveHelp(&self, _fentermode: BOOL) -> windows::core::Result<()> {
        Err(Error::from(E_NOTIMPL))
    }
}

impl IOleInPlaceUIWindow_Impl for ContainerFrame_Impl {
    fn GetBorder(&self) -> windows::core::Result<RECT> {
        Err(Error::from(INPLACE_E_NOTOOLSPACE))
    }

    fn RequestBorderSpace(&self, _pborderwidths: *const RECT) -> windows::core::Result<()> {
        Err(Error::from(INPLACE_E_NOTOOLSPACE))
    }

    fn SetBorderSpace(&self, _pborderwidths: *const RECT) -> windows::core::Result<()> {
        Ok(())
    }

    fn SetActiveObject(
        &self,
        _pactiveobject: Ref<'_, IOleInPlaceActiveObject>,
        _pszobjname: &PCWSTR,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

impl IOleInPlaceFrame_Impl for ContainerFrame_Impl {
    fn InsertMenus(&self, _hmenushared: HMENU, _lpmenuwidths: *mut OLEMENUGROUPWIDTHS) -> windows::core::Result<()> {
        Ok(())
    }

    fn SetMenu(&self, _hmenushared: HMENU, _holemenu: isize, _hwndactiveobject: HWND) -> windows::core::Result<()> {
        Ok(())
    }

    fn RemoveMenus(&self, _hmenushared: HMENU) -> windows::core::Result<()> {
        Ok(())
    }

    fn SetStatusText(&self, _pszstatustext: &PCWSTR) -> windows::core::Result<()> {
        Ok(())
    }

    fn EnableModeless(&self, _fenable: BOOL) -> windows::core::Result<()> {
        Ok(())
    }

    /// S_FALSE: the keystroke stays with the control.
    fn TranslateAccelerator(&self, _lpmsg: *const MSG, _wid: u16) -> windows::core::Result<()> {
        Err(Error::from(S_FALSE))
    }
}
