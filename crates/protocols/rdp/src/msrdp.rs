//! [`RdpAutomation`] over the MsTscAx ActiveX control.

use windows::core::{IUnknown, Interface};
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::System::Com::{
    CoCreateInstance, IConnectionPoint, IConnectionPointContainer, IDispatch, CLSCTX_INPROC_SERVER,
};
use windows::Win32::System::Ole::{IOleClientSite, IOleObject, OLECLOSE_NOSAVE, OLEIVERB_INPLACEACTIVATE};
use windows::Win32::UI::HiDpi::GetDpiForWindow;
use windows::Win32::UI::WindowsAndMessaging::GetClientRect;

use crate::automation::{
    probe_versions, AutomationBinder, DisconnectSink, OptionValue, RdpAutomation,
    ADVANCED_SETTINGS_VERSIONS, SECURED_SETTINGS_VERSIONS,
};
use crate::com_interfaces::{self, DIID_IMSTSC_AX_EVENTS, RDP_CLIENT_CLSIDS};
use crate::dispatch_helpers as dispatch;
use crate::error::{AutomationError, SessionError};
use crate::event_sink::RdpEventSink;
use crate::geometry::BASE_DPI;
use crate::site::SessionSite;
use crate::platform::WindowId;
use crate::win32::{to_hwnd, window_id};

/// Creates the newest installed RDP client and activates it in place inside
/// the session's host window.
pub struct MsRdpBinder;

impl AutomationBinder for MsRdpBinder {
    fn bind(&self, window: WindowId) -> Result<Box<dyn RdpAutomation>, SessionError> {
        let automation = unsafe { MsRdpAutomation::activate(to_hwnd(window))? };
        Ok(Box::new(automation))
    }
}

struct Control {
    unknown: IUnknown,
    dispatch: IDispatch,
    site: IOleClientSite,
}

struct Advice {
    point: IConnectionPoint,
    cookie: u32,
}

pub struct MsRdpAutomation {
    hwnd: HWND,
    control: Option<Control>,
    advanced: Option<Option<IDispatch>>,
    secured: Option<Option<IDispatch>>,
    advice: Option<Advice>,
}

impl MsRdpAutomation {
    unsafe fn activate(hwnd: HWND) -> Result<Self, SessionError> {
        let unknown = create_control()?;
        let binding = |error: windows::core::Error| SessionError::Binding(error.to_string());

        let dispatch: IDispatch = unknown.cast().map_err(binding)?;
        let ole: IOleObject = unknown.cast().map_err(binding)?;
        let site: IOleClientSite = SessionSite::new(hwnd).into();
        ole.SetClientSite(&site).map_err(binding)?;

        let mut client = RECT::default();
        let _ = GetClientRect(hwnd, &mut client);
        if let Err(error) = ole.DoVerb(
            OLEIVERB_INPLACEACTIVATE.0,
            std::ptr::null(),
            &site,
            0,
            hwnd,
            &client,
        ) {
            let _ = ole.Close(OLECLOSE_NOSAVE);
            let _ = ole.SetClientSite(None);
            return Err(SessionError::Binding(format!("in-place activation: {error}")));
        }

        tracing::debug!(hwnd = %window_id(hwnd), "rdp control activated in place");
        Ok(Self {
            hwnd,
            control: Some(Control {
                unknown,
                dispatch,
                site,
            }),
            advanced: None,
            secured: None,
            advice: None,
        })
    }

    fn control(&self) -> Result<&Control, AutomationError> {
        self.control
            .as_ref()
            .ok_or_else(|| AutomationError::failed("control already released"))
    }

    fn dispatch(&self) -> Result<&IDispatch, AutomationError> {
        self.control().map(|control| &control.dispatch)
    }

    fn advanced_settings(&mut self) -> Option<IDispatch> {
        if self.advanced.is_none() {
            let found = self.probe(&ADVANCED_SETTINGS_VERSIONS);
            self.advanced = Some(found);
        }
        self.advanced.clone().flatten()
    }

    fn secured_settings(&mut self) -> Option<IDispatch> {
        if self.secured.is_none() {
            let found = self.probe(&SECURED_SETTINGS_VERSIONS);
            self.secured = Some(found);
        }
        self.secured.clone().flatten()
    }

    fn probe(&self, versions: &[&'static str]) -> Option<IDispatch> {
        let root = self.dispatch().ok()?;
        let (name, settings) =
            probe_versions(versions, |name| unsafe { dispatch::get_dispatch_property(root, name) })?;
        tracing::debug!(settings = name, "settings object resolved");
        Some(settings)
    }
}

unsafe fn create_control() -> Result<IUnknown, SessionError> {
    for (name, clsid) in &RDP_CLIENT_CLSIDS {
        match CoCreateInstance::<_, IUnknown>(clsid, None, CLSCTX_INPROC_SERVER) {
            Ok(unknown) => {
                tracing::info!(class = *name, "rdp client control created");
                return Ok(unknown);
            }
            Err(error) => {
                tracing::debug!(class = *name, hresult = format!("{:#010X}", error.code().0 as u32), "rdp client class unavailable");
            }
        }
    }
    Err(SessionError::Binding(
        "the Remote Desktop client control (MsTscAx) is not installed".into(),
    ))
}

impl RdpAutomation for MsRdpAutomation {
    fn set_server(&mut self, host: &str) -> Result<(), AutomationError> {
        Ok(unsafe { dispatch::put_bstr_property(self.dispatch()?, "Server", host)? })
    }

    fn set_user_name(&mut self, username: &str) -> Result<(), AutomationError> {
        Ok(unsafe { dispatch::put_bstr_property(self.dispatch()?, "UserName", username)? })
    }

    fn set_domain(&mut self, domain: &str) -> Result<(), AutomationError> {
        Ok(unsafe { dispatch::put_bstr_property(self.dispatch()?, "Domain", domain)? })
    }

    fn set_desktop_size(&mut self, width: i32, height: i32) -> Result<(), AutomationError> {
        let root = self.dispatch()?;
        unsafe {
            dispatch::put_i32_property(root, "DesktopWidth", width)?;
            dispatch::put_i32_property(root, "DesktopHeight", height)?;
        }
        Ok(())
    }

    fn set_advanced_option(&mut self, name: &str, value: &OptionValue) -> bool {
        if let Some(settings) = self.advanced_settings() {
            if unsafe { dispatch::try_put(&settings, name, value) } {
                return true;
            }
        }
        // A few options (ColorDepth among them) live on the control itself.
        match self.dispatch() {
            Ok(root) => unsafe { dispatch::try_put(root, name, value) },
            Err(_) => false,
        }
    }

    fn set_secured_option(&mut self, name: &str, value: &OptionValue) -> bool {
        match self.secured_settings() {
            Some(settings) => unsafe { dispatch::try_put(&settings, name, value) },
            None => false,
        }
    }

    fn set_prompt_for_credentials(&mut self, prompt: bool) -> bool {
        let Ok(control) = self.control() else {
            return false;
        };
        match unsafe { com_interfaces::set_prompt_for_credentials(&control.unknown, self.hwnd, prompt) } {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(%error, "IMsRdpClientNonScriptable3 unavailable; trying the property");
                self.set_advanced_option("PromptForCredentials", &OptionValue::Bool(prompt))
            }
        }
    }

    fn set_clear_text_password(&mut self, password: &str) -> Result<(), AutomationError> {
        let control = self.control()?;
        match unsafe { com_interfaces::set_clear_text_password(&control.unknown, password) } {
            Ok(()) => Ok(()),
            Err(error) => {
                let settings = self.advanced_settings().ok_or_else(|| AutomationError::from(error))?;
                Ok(unsafe { dispatch::put_bstr_property(&settings, "ClearTextPassword", password)? })
            }
        }
    }

    fn reset_password(&mut self) {
        if let Ok(control) = self.control() {
            if let Err(error) = unsafe { com_interfaces::reset_password(&control.unknown) } {
                tracing::trace!(%error, "ResetPassword unavailable");
            }
        }
    }

    fn connect(&mut self) -> Result<(), AutomationError> {
        Ok(unsafe { dispatch::invoke_method(self.dispatch()?, "Connect")? })
    }

    fn disconnect(&mut self) -> Result<(), AutomationError> {
        Ok(unsafe { dispatch::invoke_method(self.dispatch()?, "Disconnect")? })
    }

    fn update_session_display(&mut self, width: i32, height: i32) -> Result<(), AutomationError> {
        let root = self.dispatch()?;
        let dpi = match unsafe { GetDpiForWindow(self.hwnd) } {
            0 => BASE_DPI,
            dpi => dpi,
        };
        // Physical size in millimetres, then desktop and device scale factors.
        let to_mm = |pixels: i32| (f64::from(pixels) * 25.4 / f64::from(dpi)).round() as i32;
        let desktop_scale = (dpi * 100 / BASE_DPI).clamp(100, 500) as i32;
        let args = [width, height, to_mm(width), to_mm(height), 0, desktop_scale, 100];

        Ok(unsafe { dispatch::invoke_method_i32(root, "UpdateSessionDisplaySettings", &args)? })
    }

    fn subscribe_disconnected(&mut self, sink: DisconnectSink) -> Result<(), AutomationError> {
        self.unsubscribe();
        let control = self.control()?;
        unsafe {
            let container: IConnectionPointContainer = control.unknown.cast()?;
            let point = container.FindConnectionPoint(&DIID_IMSTSC_AX_EVENTS)?;
            let events: IDispatch = RdpEventSink::new(window_id(self.hwnd), sink).into();
            let cookie = point.Advise(&events)?;
            tracing::debug!(cookie, "rdp event sink advised");
            self.advice = Some(Advice { point, cookie });
        }
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(advice) = self.advice.take() {
            if let Err(error) = unsafe { advice.point.Unadvise(advice.cookie) } {
                tracing::debug!(%error, "Unadvise failed");
            }
        }
    }

    fn release(&mut self) {
        self.unsubscribe();
        self.advanced = None;
        self.secured = None;

        let Some(control) = self.control.take() else {
            return;
        };
        if let Ok(ole) = control.unknown.cast::<IOleObject>() {
            unsafe {
                let _ = ole.Close(OLECLOSE_NOSAVE);
                let _ = ole.SetClientSite(None);
            }
        }
        drop(control.site);
        tracing::debug!(hwnd = ?self.hwnd.0, "rdp control released");
    }
}

impl Drop for MsRdpAutomation {
    fn drop(&mut self) {
        self.release();
    }
}
