//! The slice of the RDP client control's automation surface that sessions use.
//!
//! The control is late-bound: which properties exist depends on the installed
//! client version. Adapters translate a missing property into `false` rather
//! than an error.

use std::fmt;
use std::sync::Arc;

use crate::error::{AutomationError, SessionError};
use crate::platform::WindowId;

/// Settings objects, newest first.
pub const ADVANCED_SETTINGS_VERSIONS: [&str; 9] = [
    "AdvancedSettings9",
    "AdvancedSettings8",
    "AdvancedSettings7",
    "AdvancedSettings6",
    "AdvancedSettings5",
    "AdvancedSettings4",
    "AdvancedSettings3",
    "AdvancedSettings2",
    "AdvancedSettings",
];

pub const SECURED_SETTINGS_VERSIONS: [&str; 3] =
    ["SecuredSettings3", "SecuredSettings2", "SecuredSettings"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i32),
    Str(String),
}

impl OptionValue {
    /// `true`/`false`, then integer, then string.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Ok(value) = raw.parse::<i32>() {
            Self::Int(value)
        } else {
            Self::Str(raw.to_string())
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Why a session ended. `code` is the control's disconnect reason; connect
/// failures use [`DisconnectReason::CONNECT_FAILED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub code: i32,
    pub detail: Option<String>,
}

impl DisconnectReason {
    pub const CONNECT_FAILED: i32 = -1;

    pub fn new(code: i32) -> Self {
        Self { code, detail: None }
    }

    pub fn connect_failed(detail: impl Into<String>) -> Self {
        Self {
            code: Self::CONNECT_FAILED,
            detail: Some(detail.into()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self.code {
            Self::CONNECT_FAILED => "connect call failed",
            1 => "local disconnect",
            2 => "remote disconnect by user",
            3 => "remote disconnect by server",
            260 => "DNS lookup failed",
            264 => "connection timed out",
            516 => "unable to establish a connection",
            772 | 1028 => "connection lost",
            2308 => "socket closed",
            2825 => "authentication failed",
            3335 => "account locked out",
            _ => "unclassified",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.describe())?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Receives disconnect notifications, possibly on a foreign thread.
pub type DisconnectSink = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Operations on a bound RDP client control.
pub trait RdpAutomation {
    fn set_server(&mut self, host: &str) -> Result<(), AutomationError>;

    fn set_user_name(&mut self, username: &str) -> Result<(), AutomationError>;

    fn set_domain(&mut self, domain: &str) -> Result<(), AutomationError>;

    fn set_desktop_size(&mut self, width: i32, height: i32) -> Result<(), AutomationError>;

    /// Applies a property on the newest advanced-settings object available,
    /// or on the control itself when the settings object lacks it.
    fn set_advanced_option(&mut self, name: &str, value: &OptionValue) -> bool;

    /// Applies a property on the newest secured-settings object available.
    fn set_secured_option(&mut self, name: &str, value: &OptionValue) -> bool;

    fn set_prompt_for_credentials(&mut self, prompt: bool) -> bool;

    /// Writes the password through the non-scriptable interface.
    fn set_clear_text_password(&mut self, password: &str) -> Result<(), AutomationError>;

    fn reset_password(&mut self);

    fn connect(&mut self) -> Result<(), AutomationError>;

    fn disconnect(&mut self) -> Result<(), AutomationError>;

    /// Dynamic resolution change on a live session.
    fn update_session_display(&mut self, width: i32, height: i32) -> Result<(), AutomationError>;

    fn subscribe_disconnected(&mut self, sink: DisconnectSink) -> Result<(), AutomationError>;

    fn unsubscribe(&mut self);

    /// Tears down the control. Nothing may be called afterwards.
    fn release(&mut self);
}

/// Resolves the automation object for a native window.
pub trait AutomationBinder {
    fn bind(&self, window: WindowId) -> Result<Box<dyn RdpAutomation>, SessionError>;
}

/// Returns the first name in `names` that `resolve` accepts.
pub fn probe_versions<T, E: fmt::Display>(
    names: &[&'static str],
    mut resolve: impl FnMut(&str) -> Result<T, E>,
) -> Option<(&'static str, T)> {
    for name in names {
        match resolve(name) {
            Ok(found) => return Some((name, found)),
            Err(error) => tracing::trace!(name, %error, "settings version unavailable"),
        }
    }
    None
}
