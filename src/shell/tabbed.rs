//! Top-level windows that show sessions as tabs of a common tab control.
//!
//! Session windows are siblings of the tab control, laid over its display
//! area. Window messages never touch the session host directly; they post
//! jobs that run on the next drain of the dispatch queue.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rdssh_protocol_rdp::win32::{to_hwnd, window_id};
use rdssh_protocol_rdp::{
    to_layout, ContainerFactory, ContainerWindow, LayoutRect, LayoutSource, PixelRect,
    SessionError, SessionHost, TabId, TabSlot, UiDispatcher, WindowId,
};
use uuid::Uuid;
use windows::core::{w, PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM,
};
use windows::Win32::Graphics::Gdi::{ScreenToClient, COLOR_WINDOW, HBRUSH};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Controls::{
    InitCommonControlsEx, ICC_TAB_CLASSES, INITCOMMONCONTROLSEX, NMHDR, NM_RCLICK, TCHITTESTINFO,
    TCIF_PARAM, TCIF_TEXT, TCITEMW, TCM_ADJUSTRECT, TCM_DELETEITEM, TCM_GETCURSEL, TCM_GETITEMCOUNT,
    TCM_GETITEMW, TCM_HITTEST, TCM_INSERTITEMW, TCM_SETCURSEL, TCN_SELCHANGE, WC_TABCONTROLW,
};
use windows::Win32::UI::HiDpi::GetDpiForWindow;
use windows::Win32::UI::WindowsAndMessaging::*;

const CONTAINER_CLASS: PCWSTR = w!("RdsshContainer");
const TAB_CONTROL_ID: usize = 1;

const MENU_UNDOCK: usize = 1;
const MENU_DOCK: usize = 2;
const MENU_CLOSE: usize = 3;

static NEXT_TAB: AtomicU64 = AtomicU64::new(1);

/// Per-window data behind `GWLP_USERDATA`.
struct WindowContext {
    ui: UiDispatcher<SessionHost>,
    tabs: HWND,
    primary: bool,
}

pub fn register_class() -> Result<(), SessionError> {
    unsafe {
        let controls = INITCOMMONCONTROLSEX {
            dwSize: std::mem::size_of::<INITCOMMONCONTROLSEX>() as u32,
            dwICC: ICC_TAB_CLASSES,
        };
        if !InitCommonControlsEx(&controls).as_bool() {
            return Err(SessionError::Platform("InitCommonControlsEx failed".into()));
        }

        let instance = GetModuleHandleW(None)
            .map_err(|error| SessionError::Platform(format!("GetModuleHandleW: {error}")))?;
        let class = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(container_wndproc),
            hInstance: instance.into(),
            hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
            hbrBackground: HBRUSH((COLOR_WINDOW.0 + 1) as isize as *mut _),
            lpszClassName: CONTAINER_CLASS,
            ..Default::default()
        };
        if RegisterClassExW(&class) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
            return Err(SessionError::Platform(format!(
                "RegisterClassExW: {:?}",
                GetLastError()
            )));
        }
    }
    Ok(())
}

pub struct TabbedWindow {
    hwnd: HWND,
    tabs: HWND,
    primary: bool,
}

impl TabbedWindow {
    pub fn create(
        title: &str,
        primary: bool,
        ui: UiDispatcher<SessionHost>,
    ) -> Result<Self, SessionError> {
        let title = wide(title);
        unsafe {
            let instance = GetModuleHandleW(None)
                .map_err(|error| SessionError::Platform(format!("GetModuleHandleW: {error}")))?;

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE(0),
                CONTAINER_CLASS,
                PCWSTR(title.as_ptr()),
                WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                1280,
                800,
                None,
                None,
                Some(instance.into()),
                None,
            )
            .map_err(|error| SessionError::Platform(format!("CreateWindowExW(container): {error}")))?;

            let tabs = match CreateWindowExW(
                WINDOW_EX_STYLE(0),
                WC_TABCONTROLW,
                w!(""),
                WS_CHILD | WS_VISIBLE | WS_CLIPSIBLINGS,
                0,
                0,
                0,
                0,
                Some(hwnd),
                Some(HMENU(TAB_CONTROL_ID as *mut _)),
                Some(instance.into()),
                None,
            ) {
                Ok(tabs) => tabs,
                Err(error) => {
                    let _ = DestroyWindow(hwnd);
                    return Err(SessionError::Platform(format!("CreateWindowExW(tab control): {error}")));
                }
            };

            let context = Box::new(WindowContext { ui, tabs, primary });
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, Box::into_raw(context) as isize);

            fit_tab_control(hwnd, tabs);
            let _ = ShowWindow(hwnd, SW_SHOW);
            tracing::debug!(hwnd = %window_id(hwnd), primary, "container window created");

            Ok(Self { hwnd, tabs, primary })
        }
    }

    fn index_of(&self, tab: TabId) -> Option<usize> {
        (0..self.tab_count()).find(|index| unsafe { tab_at(self.tabs, *index) } == Some(tab))
    }
}

impl ContainerWindow for TabbedWindow {
    fn window(&self) -> WindowId {
        window_id(self.hwnd)
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn add_tab(&mut self, title: &str) -> Result<TabSlot, SessionError> {
        let tab = TabId(NEXT_TAB.fetch_add(1, Ordering::Relaxed));
        let mut text = wide(title);
        let item = TCITEMW {
            mask: TCIF_TEXT | TCIF_PARAM,
            pszText: PWSTR(text.as_mut_ptr()),
            lParam: LPARAM(tab.0 as isize),
            ..Default::default()
        };

        let index = unsafe {
            SendMessageW(
                self.tabs,
                TCM_INSERTITEMW,
                Some(WPARAM(self.tab_count())),
                Some(LPARAM(&item as *const TCITEMW as isize)),
            )
        };
        if index.0 < 0 {
            return Err(SessionError::Platform("TCM_INSERTITEMW failed".into()));
        }

        Ok(TabSlot {
            tab,
            layout: Rc::new(TabContentArea {
                owner: self.hwnd,
                tabs: self.tabs,
            }),
        })
    }

    fn remove_tab(&mut self, tab: TabId) {
        if let Some(index) = self.index_of(tab) {
            unsafe {
                SendMessageW(self.tabs, TCM_DELETEITEM, Some(WPARAM(index)), None);
            }
        }
    }

    fn select_tab(&mut self, tab: TabId) {
        if let Some(index) = self.index_of(tab) {
            unsafe {
                SendMessageW(self.tabs, TCM_SETCURSEL, Some(WPARAM(index)), None);
            }
        }
    }

    fn tab_count(&self) -> usize {
        let count = unsafe { SendMessageW(self.tabs, TCM_GETITEMCOUNT, None, None) };
        count.0.max(0) as usize
    }

    fn bring_to_front(&mut self) {
        unsafe {
            if IsIconic(self.hwnd).as_bool() {
                let _ = ShowWindow(self.hwnd, SW_RESTORE);
            }
            let _ = SetForegroundWindow(self.hwnd);
        }
    }

    fn close(&mut self) {
        unsafe {
            if let Err(error) = DestroyWindow(self.hwnd) {
                tracing::warn!(hwnd = %window_id(self.hwnd), %error, "DestroyWindow(container) failed");
            }
        }
    }
}

/// Opens secondary containers for undocked sessions.
pub struct TabbedWindowFactory {
    ui: UiDispatcher<SessionHost>,
}

impl TabbedWindowFactory {
    pub fn new(ui: UiDispatcher<SessionHost>) -> Self {
        Self { ui }
    }
}

impl ContainerFactory for TabbedWindowFactory {
    fn create_container(&self, title: &str) -> Result<Box<dyn ContainerWindow>, SessionError> {
        let title = format!("{title} - {}", super::APP_TITLE);
        Ok(Box::new(TabbedWindow::create(&title, false, self.ui.clone())?))
    }
}

/// The tab control's display area, in layout units of its top-level window.
struct TabContentArea {
    owner: HWND,
    tabs: HWND,
}

impl LayoutSource for TabContentArea {
    fn layout_rect(&self) -> Option<LayoutRect> {
        unsafe {
            let mut rect = RECT::default();
            GetClientRect(self.tabs, &mut rect).ok()?;
            SendMessageW(
                self.tabs,
                TCM_ADJUSTRECT,
                Some(WPARAM(0)),
                Some(LPARAM(&mut rect as *mut RECT as isize)),
            );

            let dpi = GetDpiForWindow(self.owner);
            if dpi == 0 {
                return None;
            }
            // The tab control sits at the owner's client origin.
            let pixels = PixelRect::new(
                rect.left,
                rect.top,
                rect.right - rect.left,
                rect.bottom - rect.top,
            );
            Some(to_layout(pixels, dpi))
        }
    }
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

unsafe fn context<'a>(hwnd: HWND) -> Option<&'a WindowContext> {
    let ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const WindowContext;
    ptr.as_ref()
}

unsafe fn tab_at(tabs: HWND, index: usize) -> Option<TabId> {
    let mut item = TCITEMW {
        mask: TCIF_PARAM,
        ..Default::default()
    };
    let found = SendMessageW(
        tabs,
        TCM_GETITEMW,
        Some(WPARAM(index)),
        Some(LPARAM(&mut item as *mut TCITEMW as isize)),
    );
    (found.0 != 0).then_some(TabId(item.lParam.0 as u64))
}

unsafe fn fit_tab_control(hwnd: HWND, tabs: HWND) {
    let mut client = RECT::default();
    if GetClientRect(hwnd, &mut client).is_ok() {
        let _ = MoveWindow(tabs, 0, 0, client.right, client.bottom, true);
    }
}

fn post_layout(ui: &UiDispatcher<SessionHost>, window: WindowId) {
    ui.post(move |host: &mut SessionHost| host.layout_pass(window));
}

/// Right-click menu of a tab: dock or undock, and close.
unsafe fn show_tab_menu(hwnd: HWND, context: &WindowContext) {
    let mut cursor = POINT::default();
    if GetCursorPos(&mut cursor).is_err() {
        return;
    }
    let mut hit = TCHITTESTINFO {
        pt: cursor,
        ..Default::default()
    };
    let _ = ScreenToClient(context.tabs, &mut hit.pt);
    let index = SendMessageW(
        context.tabs,
        TCM_HITTEST,
        None,
        Some(LPARAM(&mut hit as *mut TCHITTESTINFO as isize)),
    );
    if index.0 < 0 {
        return;
    }
    let Some(tab) = tab_at(context.tabs, index.0 as usize) else {
        return;
    };

    let Ok(menu) = CreatePopupMenu() else {
        return;
    };
    let (move_id, move_label) = if context.primary {
        (MENU_UNDOCK, w!("Undock"))
    } else {
        (MENU_DOCK, w!("Dock"))
    };
    let _ = AppendMenuW(menu, MF_STRING, move_id, move_label);
    let _ = AppendMenuW(menu, MF_STRING, MENU_CLOSE, w!("Close"));
    let command = TrackPopupMenuEx(
        menu,
        (TPM_RETURNCMD | TPM_RIGHTBUTTON).0,
        cursor.x,
        cursor.y,
        hwnd,
        None,
    );
    let _ = DestroyMenu(menu);

    let command = command.0 as usize;
    if command == 0 {
        return;
    }

    let window = window_id(hwnd);
    context.ui.post(move |host: &mut SessionHost| {
        let Some(identity) = session_on_tab(host, window, tab) else {
            return;
        };
        let result = match command {
            MENU_UNDOCK => host.undock(identity).map(|_| ()),
            MENU_DOCK => host.dock(identity),
            _ => {
                host.close_session(identity);
                Ok(())
            }
        };
        if let Err(error) = result {
            tracing::warn!(connection_id = %identity, %error, "tab command failed");
        }
    });
}

fn session_on_tab(host: &SessionHost, container: WindowId, tab: TabId) -> Option<Uuid> {
    host.sessions_in(container)
        .into_iter()
        .find(|identity| host.session_tab(*identity) == Some(tab))
}

unsafe extern "system" fn container_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_SIZE => {
            if let Some(context) = context(hwnd) {
                fit_tab_control(hwnd, context.tabs);
                post_layout(&context.ui, window_id(hwnd));
            }
            LRESULT(0)
        }
        WM_DPICHANGED => {
            let suggested = &*(lparam.0 as *const RECT);
            let _ = SetWindowPos(
                hwnd,
                None,
                suggested.left,
                suggested.top,
                suggested.right - suggested.left,
                suggested.bottom - suggested.top,
                SWP_NOZORDER | SWP_NOACTIVATE,
            );
            if let Some(context) = context(hwnd) {
                post_layout(&context.ui, window_id(hwnd));
            }
            LRESULT(0)
        }
        WM_NOTIFY => {
            let header = &*(lparam.0 as *const NMHDR);
            let Some(context) = context(hwnd) else {
                return LRESULT(0);
            };
            if header.hwndFrom != context.tabs {
                return DefWindowProcW(hwnd, msg, wparam, lparam);
            }
            match header.code {
                TCN_SELCHANGE => {
                    let index = SendMessageW(context.tabs, TCM_GETCURSEL, None, None);
                    if index.0 >= 0 {
                        if let Some(tab) = tab_at(context.tabs, index.0 as usize) {
                            let window = window_id(hwnd);
                            context
                                .ui
                                .post(move |host: &mut SessionHost| host.on_tab_selected(window, tab));
                        }
                    }
                    LRESULT(0)
                }
                NM_RCLICK => {
                    show_tab_menu(hwnd, context);
                    LRESULT(1)
                }
                _ => LRESULT(0),
            }
        }
        WM_CLOSE => {
            // Sessions go first; the window is destroyed after them.
            let window = window_id(hwnd);
            let posted = context(hwnd).is_some_and(|context| {
                context.ui.post(move |host: &mut SessionHost| {
                    host.on_container_closed(window);
                    if let Err(error) = unsafe { DestroyWindow(to_hwnd(window)) } {
                        tracing::debug!(hwnd = %window, %error, "container already gone");
                    }
                })
            });
            if !posted {
                let _ = DestroyWindow(hwnd);
            }
            LRESULT(0)
        }
        WM_DESTROY => {
            if context(hwnd).is_some_and(|context| context.primary) {
                PostQuitMessage(0);
            }
            LRESULT(0)
        }
        WM_NCDESTROY => {
            let ptr = SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) as *mut WindowContext;
            if !ptr.is_null() {
                drop(Box::from_raw(ptr));
            }
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
