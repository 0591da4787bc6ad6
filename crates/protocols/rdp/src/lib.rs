//! Embedded RDP sessions: native child windows hosting the Remote Desktop
//! client control, their lifecycle across tab containers, and the launch
//! sequence that ties them to stored profiles and credentials.
//!
//! Everything that touches a window or the control runs on one UI thread.
//! Other threads reach it through [`UiDispatcher`].

mod automation;
mod controller;
mod dispatcher;
mod embed;
mod error;
mod geometry;
mod host;
mod launcher;
mod options;
mod platform;
mod status;

#[cfg(windows)]
mod com_interfaces;
#[cfg(windows)]
mod dispatch_helpers;
#[cfg(windows)]
mod event_sink;
#[cfg(windows)]
mod msrdp;
#[cfg(windows)]
mod site;
#[cfg(windows)]
pub mod ui_loop;
#[cfg(windows)]
pub mod win32;

#[cfg(not(windows))]
mod unsupported;

pub use automation::{
    probe_versions, AutomationBinder, DisconnectReason, DisconnectSink, OptionValue,
    RdpAutomation, ADVANCED_SETTINGS_VERSIONS, SECURED_SETTINGS_VERSIONS,
};
pub use controller::{SessionController, SessionState};
pub use dispatcher::{channel, DispatchQueue, QueueStatus, UiDispatcher, Waker};
pub use embed::{NativeWindowEmbed, ReadySignal};
pub use error::{AutomationError, SessionError};
pub use geometry::{to_layout, to_physical, LayoutRect, PixelRect, BASE_DPI};
pub use host::{
    ContainerDirectory, ContainerEntry, ContainerFactory, ContainerWindow, DisplayHandle,
    SessionHost, StartOutcome, TabId, TabSlot,
};
pub use launcher::{LaunchOrchestrator, LaunchOutcome, LaunchSettings};
pub use options::{
    advanced_settings, color_depth, extra_settings, performance_flags, secured_settings,
    ConnectParams, SettingEntry,
};
pub use platform::{LayoutSource, WindowId, WindowPlatform};
pub use status::ConnectionStatus;

#[cfg(windows)]
pub use msrdp::MsRdpBinder;
#[cfg(windows)]
pub use win32::Win32Platform;

#[cfg(not(windows))]
pub use unsupported::{UnsupportedBinder, UnsupportedPlatform};
