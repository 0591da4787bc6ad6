//! Connection-point sink for the control's `IMsTscAxEvents`.
//!
//! `Invoke` may arrive on any thread. The sink decodes the event, traces it and
//! hands disconnects to the [`DisconnectSink`]; nothing else leaves this file.
use std::panic::{catch_unwind, AssertUnwindSafe};

use windows::core::{implement, Error, GUID, PCWSTR};
use windows::Win32::Foundation::{E_FAIL, E_NOTIMPL};
use windows::Win32::System::Com::{DISPATCH_FLAGS, DISPPARAMS, EXCEPINFO, IDispatch, IDispatch_Impl, ITypeInfo};
use windows::Win32::System::Variant::{VARIANT, VT_I4};

use crate::automation::{DisconnectReason, DisconnectSink};
use crate::com_interfaces::*;
use crate::dispatch_helpers::DISP_E_UNKNOWNNAME;
use crate::platform::WindowId;

/// The subset of control events the session cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxEvent {
    Connecting,
    Connected,
    LoginComplete,
    Disconnected(i32),
    FatalError(i32),
    Warning(i32),
    LogonError(i32),
    Other(i32),
}

impl AxEvent {
    unsafe fn decode(dispid: i32, params: *const DISPPARAMS) -> Self {
        let code = || i32_arg(params, 0);
        match dispid {
            DISPID_CONNECTING => Self::Connecting,
            DISPID_CONNECTED => Self::Connected,
            DISPID_LOGIN_COMPLETE => Self::LoginComplete,
            DISPID_DISCONNECTED => Self::Disconnected(code().unwrap_or(0)),
            DISPID_FATAL_ERROR => Self::FatalError(code().unwrap_or(-1)),
            DISPID_WARNING => Self::Warning(code().unwrap_or(0)),
            DISPID_LOGON_ERROR => Self::LogonError(code().unwrap_or(0)),
            other => Self::Other(other),
        }
    }
}

#[implement(IDispatch)]
pub struct RdpEventSink {
    window: WindowId,
    on_disconnect: DisconnectSink,
}

impl RdpEventSink {
    pub fn new(window: WindowId, on_disconnect: DisconnectSink) -> Self {
        Self { window, on_disconnect }
    }

    fn deliver(&self, event: AxEvent) {
        let hwnd = self.window;
        match event {
            AxEvent::Connecting => tracing::debug!(%hwnd, "control connecting"),
            AxEvent::Connected => tracing::info!(%hwnd, "control connected"),
            AxEvent::LoginComplete => tracing::info!(%hwnd, "remote logon complete"),
            AxEvent::Disconnected(code) => {
                let reason = DisconnectReason::new(code);
                tracing::debug!(%hwnd, code, reason = reason.describe(), "control disconnected");
                (self.on_disconnect)(reason);
            }
            AxEvent::FatalError(code) => tracing::error!(%hwnd, code, "control fatal error"),
            AxEvent::Warning(code) => tracing::warn!(%hwnd, code, "control warning"),
            AxEvent::LogonError(code) => tracing::warn!(%hwnd, code, "remote logon error"),
            AxEvent::Other(dispid) => tracing::trace!(%hwnd, dispid, "control event ignored"),
        }
    }
}

impl IDispatch_Impl for RdpEventSink_Impl {
    fn GetTypeInfoCount(&self) -> windows::core::Result<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> windows::core::Result<ITypeInfo> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        _rgsznames: *const PCWSTR,
        _cnames: u32,
        _lcid: u32,
        _rgdispid: *mut i32,
    ) -> windows::core::Result<()> {
        Err(Error::from(DISP_E_UNKNOWNNAME))
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        _wflags: DISPATCH_FLAGS,
        pdispparams: *const DISPPARAMS,
        _pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> windows::core::Result<()> {
        // A panic must never unwind into the control.
        let delivered = catch_unwind(AssertUnwindSafe(|| {
            let event = unsafe { AxEvent::decode(dispidmember, pdispparams) };
            self.deliver(event);
        }));
        if delivered.is_err() {
            tracing::error!(hwnd = %self.window, dispid = dispidmember, "panic stopped at the event sink");
            return Err(Error::from(E_FAIL));
        }
        Ok(())
    }
}

/// Argument `index` in declaration order; DISPPARAMS stores them reversed.
unsafe fn i32_arg(params: *const DISPPARAMS, index: u32) -> Option<i32> {
    let params = params.as_ref()?;
    if index >= params.cArgs || params.rgvarg.is_null() {
        return None;
    }
    let arg = &*params.rgvarg.add((params.cArgs - 1 - index) as usize);
    (arg.Anonymous.Anonymous.vt == VT_I4).then(|| arg.Anonymous.Anonymous.Anonymous.lVal)
}
