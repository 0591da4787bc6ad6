/// Hand-declared pieces of the MsTscAx control's COM surface.
///
/// The `windows` crate ships no metadata for the RDP client control, so the
/// non-scriptable interfaces are declared here with their full vtable layout.
/// Everything else goes through `IDispatch` by name.
use windows::core::{IUnknown, Interface, BSTR, GUID, HRESULT};
use windows::Win32::Foundation::{HWND, VARIANT_FALSE, VARIANT_TRUE};
use windows_core::IUnknown_Vtbl;

/// Event dispinterface the control fires through its connection point.
pub const DIID_IMSTSC_AX_EVENTS: GUID = GUID::from_u128(0x336d5562_efa8_482e_8cb3_c5c0fc7a7db6);

/// MsRdpClient NotSafeForScripting classes, newest first.
pub const RDP_CLIENT_CLSIDS: [(&str, GUID); 3] = [
    (
        "MsRdpClient10NotSafeForScripting",
        GUID::from_u128(0xa0c63c30_f08d_4ab4_907c_34905d770c7d),
    ),
    (
        "MsRdpClient9NotSafeForScripting",
        GUID::from_u128(0x8b918b82_7985_4c24_89df_c33ad2bbfbcd),
    ),
    (
        "MsRdpClient8NotSafeForScripting",
        GUID::from_u128(0xa3bc03a0_041d_42e3_ad22_882b7865c9c5),
    ),
];

// IMsTscAxEvents DISPIDs.
pub const DISPID_CONNECTING: i32 = 1;
pub const DISPID_CONNECTED: i32 = 2;
pub const DISPID_LOGIN_COMPLETE: i32 = 3;
pub const DISPID_DISCONNECTED: i32 = 4;
pub const DISPID_FATAL_ERROR: i32 = 10;
pub const DISPID_WARNING: i32 = 11;
pub const DISPID_LOGON_ERROR: i32 = 22;

/// Write-only secret properties. Only the first and last slots are called.
#[windows::core::interface("c1e6743a-41c1-4a74-832a-0dd06c1c7a0e")]
pub unsafe trait IMsTscNonScriptable: IUnknown {
    fn put_clear_text_password(&self, password: &BSTR) -> HRESULT;
    fn _put_portable_password(&self) -> HRESULT;
    fn _get_portable_password(&self) -> HRESULT;
    fn _put_portable_salt(&self) -> HRESULT;
    fn _get_portable_salt(&self) -> HRESULT;
    fn _put_binary_password(&self) -> HRESULT;
    fn _get_binary_password(&self) -> HRESULT;
    fn _put_binary_salt(&self) -> HRESULT;
    fn _get_binary_salt(&self) -> HRESULT;
    fn reset_password(&self) -> HRESULT;
}

/// IMsTscNonScriptable (10) → IMsRdpClientNonScriptable (2) →
/// IMsRdpClientNonScriptable2 (2) → IMsRdpClientNonScriptable3 (20).
///
/// Placeholders keep the vtable offsets of the methods that are called.
#[windows::core::interface("b3378d90-0728-45c7-8ed7-b6159fb92219")]
pub unsafe trait IMsRdpClientNonScriptable3: IUnknown {
    fn _ns_0(&self) -> HRESULT;
    fn _ns_1(&self) -> HRESULT;
    fn _ns_2(&self) -> HRESULT;
    fn _ns_3(&self) -> HRESULT;
    fn _ns_4(&self) -> HRESULT;
    fn _ns_5(&self) -> HRESULT;
    fn _ns_6(&self) -> HRESULT;
    fn _ns_7(&self) -> HRESULT;
    fn _ns_8(&self) -> HRESULT;
    fn _ns_9(&self) -> HRESULT;

    fn _notify_redirect_device_change(&self) -> HRESULT;
    fn _send_keys(&self) -> HRESULT;

    fn put_ui_parent_window_handle(&self, hwnd: isize) -> HRESULT;
    fn _get_ui_parent_window_handle(&self) -> HRESULT;

    fn put_show_redirection_warning_dialog(&self, value: i16) -> HRESULT;
    fn _get_show_redirection_warning_dialog(&self) -> HRESULT;
    fn put_prompt_for_credentials(&self, value: i16) -> HRESULT;
    fn _get_prompt_for_credentials(&self) -> HRESULT;
    fn _put_negotiate_security_layer(&self) -> HRESULT;
    fn _get_negotiate_security_layer(&self) -> HRESULT;
    fn _put_enable_cred_ssp_support(&self) -> HRESULT;
    fn _get_enable_cred_ssp_support(&self) -> HRESULT;
    fn _ns3_0(&self) -> HRESULT;
    fn _ns3_1(&self) -> HRESULT;
    fn _ns3_2(&self) -> HRESULT;
    fn _ns3_3(&self) -> HRESULT;
    fn _ns3_4(&self) -> HRESULT;
    fn _ns3_5(&self) -> HRESULT;
    fn _ns3_6(&self) -> HRESULT;
    fn _ns3_7(&self) -> HRESULT;
    fn _ns3_8(&self) -> HRESULT;
    fn _ns3_9(&self) -> HRESULT;
    fn _ns3_10(&self) -> HRESULT;
    fn _ns3_11(&self) -> HRESULT;
}

pub unsafe fn set_clear_text_password(control: &IUnknown, password: &str) -> windows::core::Result<()> {
    let non_scriptable: IMsTscNonScriptable = control.cast()?;
    let secret = BSTR::from(password);
    non_scriptable.put_clear_text_password(&secret).ok()
}

pub unsafe fn reset_password(control: &IUnknown) -> windows::core::Result<()> {
    let non_scriptable: IMsTscNonScriptable = control.cast()?;
    non_scriptable.reset_password().ok()
}

/// Sets PromptForCredentials through IMsRdpClientNonScriptable3 and parents
/// the control's dialogs to `host`.
pub unsafe fn set_prompt_for_credentials(
    control: &IUnknown,
    host: HWND,
    prompt: bool,
) -> windows::core::Result<()> {
    let ns3: IMsRdpClientNonScriptable3 = control.cast()?;

    let hr = ns3.put_ui_parent_window_handle(host.0 as isize);
    if hr.is_err() {
        tracing::debug!(hresult = format!("{:#010X}", hr.0 as u32), "UIParentWindowHandle rejected");
    }
    let hr = ns3.put_show_redirection_warning_dialog(VARIANT_FALSE.0);
    if hr.is_err() {
        tracing::debug!(hresult = format!("{:#010X}", hr.0 as u32), "ShowRedirectionWarningDialog rejected");
    }

    let value = if prompt { VARIANT_TRUE } else { VARIANT_FALSE };
    ns3.put_prompt_for_credentials(value.0).ok()
}
