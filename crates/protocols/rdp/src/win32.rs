//! Win32 implementation of [`WindowPlatform`].

use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{
    GetLastError, COLORREF, ERROR_CLASS_ALREADY_EXISTS, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::Graphics::Gdi::{GetStockObject, InvalidateRect, BLACK_BRUSH, HBRUSH};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::HiDpi::GetDpiForWindow;
use windows::Win32::UI::Input::KeyboardAndMouse::SetFocus;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::error::SessionError;
use crate::geometry::PixelRect;
use crate::platform::{WindowId, WindowPlatform};

const HOST_WINDOW_CLASS: PCWSTR = w!("RdsshSessionHost");

pub fn to_hwnd(window: WindowId) -> HWND {
    HWND(window.0 as *mut _)
}

pub fn window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as isize)
}

/// Child windows hosting one RDP control each.
///
/// Children are layered with full opacity so they compose above
/// hardware-accelerated siblings.
pub struct Win32Platform {
    _private: (),
}

impl Win32Platform {
    pub fn new() -> Result<Self, SessionError> {
        unsafe { register_host_window_class()? };
        Ok(Self { _private: () })
    }
}

impl WindowPlatform for Win32Platform {
    fn create_child(&self, owner: WindowId) -> Result<WindowId, SessionError> {
        let parent = to_hwnd(owner);
        unsafe {
            if !IsWindow(Some(parent)).as_bool() {
                return Err(SessionError::Platform(format!("owner window {owner} does not exist")));
            }

            let hwnd = CreateWindowExW(
                WS_EX_LAYERED,
                HOST_WINDOW_CLASS,
                w!(""),
                WS_CHILD | WS_VISIBLE | WS_CLIPCHILDREN | WS_CLIPSIBLINGS,
                0,
                0,
                1,
                1,
                Some(parent),
                None,
                None,
                None,
            )
            .map_err(|error| SessionError::Platform(format!("CreateWindowExW: {error}")))?;

            if let Err(error) = SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA) {
                let _ = DestroyWindow(hwnd);
                return Err(SessionError::Platform(format!("SetLayeredWindowAttributes: {error}")));
            }
            Ok(window_id(hwnd))
        }
    }

    fn set_bounds(&self, window: WindowId, rect: PixelRect) {
        let hwnd = to_hwnd(window);
        unsafe {
            if let Err(error) = SetWindowPos(
                hwnd,
                Some(HWND_TOP),
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                SWP_NOACTIVATE,
            ) {
                tracing::warn!(hwnd = %window, %error, "SetWindowPos failed");
                return;
            }
            let _ = InvalidateRect(Some(hwnd), None, false);
        }
    }

    fn reparent(&self, window: WindowId, new_owner: WindowId) -> Result<(), SessionError> {
        unsafe {
            if !IsWindow(Some(to_hwnd(new_owner))).as_bool() {
                return Err(SessionError::Platform(format!("owner window {new_owner} does not exist")));
            }
            SetParent(to_hwnd(window), Some(to_hwnd(new_owner)))
                .map(|_| ())
                .map_err(|error| SessionError::Platform(format!("SetParent: {error}")))
        }
    }

    fn show(&self, window: WindowId) {
        unsafe {
            let _ = ShowWindow(to_hwnd(window), SW_SHOWNA);
        }
    }

    fn hide(&self, window: WindowId) {
        unsafe {
            let _ = ShowWindow(to_hwnd(window), SW_HIDE);
        }
    }

    fn destroy(&self, window: WindowId) {
        unsafe {
            if let Err(error) = DestroyWindow(to_hwnd(window)) {
                tracing::warn!(hwnd = %window, %error, "DestroyWindow failed");
            }
        }
    }

    fn dpi_for(&self, window: WindowId) -> Option<u32> {
        match unsafe { GetDpiForWindow(to_hwnd(window)) } {
            0 => None,
            dpi => Some(dpi),
        }
    }

    fn focus(&self, owner: WindowId, child: WindowId) {
        unsafe {
            let _ = SetForegroundWindow(to_hwnd(owner));
            focus_nested(to_hwnd(child));
        }
    }
}

/// Focuses `hwnd`, then the control window nested inside it.
unsafe fn focus_nested(hwnd: HWND) {
    let _ = SetFocus(Some(hwnd));
    if let Ok(inner) = GetWindow(hwnd, GW_CHILD) {
        let _ = SetFocus(Some(inner));
    }
}

unsafe fn register_host_window_class() -> Result<(), SessionError> {
    let instance = GetModuleHandleW(None)
        .map_err(|error| SessionError::Platform(format!("GetModuleHandleW: {error}")))?;

    let class = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(host_wndproc),
        hInstance: instance.into(),
        hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
        lpszClassName: HOST_WINDOW_CLASS,
        hbrBackground: HBRUSH(GetStockObject(BLACK_BRUSH).0),
        ..Default::default()
    };

    if RegisterClassExW(&class) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
        return Err(SessionError::Platform(format!(
            "RegisterClassExW: {:?}",
            GetLastError()
        )));
    }
    Ok(())
}

unsafe extern "system" fn host_wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_SIZE => {
            // The in-place control window always fills its host.
            let width = (lparam.0 & 0xFFFF) as i32;
            let height = ((lparam.0 >> 16) & 0xFFFF) as i32;
            if let Ok(control) = GetWindow(hwnd, GW_CHILD) {
                let _ = MoveWindow(control, 0, 0, width, height, true);
            }
            LRESULT(0)
        }
        WM_MOUSEACTIVATE => {
            focus_nested(hwnd);
            LRESULT(MA_ACTIVATE as isize)
        }
        WM_SETFOCUS => {
            if let Ok(control) = GetWindow(hwnd, GW_CHILD) {
                let _ = SetFocus(Some(control));
            }
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
