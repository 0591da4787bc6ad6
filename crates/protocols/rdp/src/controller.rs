use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use uuid::Uuid;

use crate::automation::{
    AutomationBinder, DisconnectReason, DisconnectSink, OptionValue, RdpAutomation,
};
use crate::error::{AutomationError, SessionError};
use crate::options::{self, ConnectParams, SettingEntry};
use crate::platform::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Bound,
    Connecting,
    Connected,
    /// Terminal. A new session needs a new controller.
    Disconnected,
}

impl SessionState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Bound | Self::Connecting | Self::Connected)
    }
}

/// Drives one RDP client control bound to one native window.
///
/// Not `Send`: every call happens on the UI thread that created it.
pub struct SessionController {
    connection_id: Uuid,
    state: SessionState,
    automation: Option<Box<dyn RdpAutomation>>,
    window: Option<WindowId>,
    sink: Option<DisconnectSink>,
    applied_size: Option<(i32, i32)>,
    disposed: bool,
}

impl SessionController {
    pub fn new(connection_id: Uuid) -> Self {
        Self {
            connection_id,
            state: SessionState::Unbound,
            automation: None,
            window: None,
            sink: None,
            applied_size: None,
            disposed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn window(&self) -> Option<WindowId> {
        self.window
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Resolves the control behind `window` and subscribes to its disconnect
    /// notification. Only the first call does anything.
    pub fn bind(
        &mut self,
        window: WindowId,
        binder: &dyn AutomationBinder,
        on_disconnect: DisconnectSink,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Unbound || self.disposed {
            return Ok(());
        }

        let mut automation = binder.bind(window)?;
        let sink = guarded_sink(self.connection_id, on_disconnect);

        if let Err(error) = automation.subscribe_disconnected(Arc::clone(&sink)) {
            automation.release();
            return Err(SessionError::Binding(format!(
                "disconnect notification unavailable: {error}"
            )));
        }

        tracing::debug!(connection_id = %self.connection_id, hwnd = %window, "automation object bound");
        self.automation = Some(automation);
        self.window = Some(window);
        self.sink = Some(sink);
        self.state = SessionState::Bound;
        Ok(())
    }

    /// Configures the control and issues Connect.
    ///
    /// Failures end the session: the control is disconnected, the state moves
    /// to `Disconnected` and the disconnect sink hears about it.
    pub fn connect(&mut self, params: &ConnectParams) -> Result<(), SessionError> {
        match self.state {
            SessionState::Unbound | SessionState::Connecting | SessionState::Connected => {
                return Ok(())
            }
            SessionState::Disconnected => {
                return Err(SessionError::Connect("session already ended".into()))
            }
            SessionState::Bound => {}
        }
        let Some(automation) = self.automation.as_mut() else {
            return Ok(());
        };

        self.state = SessionState::Connecting;
        tracing::info!(
            connection_id = %self.connection_id,
            host = %params.host,
            port = params.port,
            width = params.desktop_width,
            height = params.desktop_height,
            prompt = params.prompt_for_credentials(),
            "connecting rdp session"
        );

        let result = configure_and_connect(automation.as_mut(), params, self.connection_id);
        // Cleared whether or not Connect succeeded.
        automation.reset_password();

        match result {
            Ok(()) => {
                self.state = SessionState::Connected;
                self.applied_size = Some((params.desktop_width, params.desktop_height));
                tracing::info!(connection_id = %self.connection_id, "rdp connect issued");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    hresult = format!("{:#010X}", error.hresult),
                    %error,
                    "rdp connect failed"
                );
                if let Err(disconnect_error) = automation.disconnect() {
                    tracing::debug!(%disconnect_error, "best-effort disconnect after failed connect");
                }
                automation.reset_password();
                self.state = SessionState::Disconnected;

                if let Some(sink) = &self.sink {
                    sink(DisconnectReason::connect_failed(error.to_string()));
                }
                Err(SessionError::Connect(error.to_string()))
            }
        }
    }

    /// Resizes the remote desktop. Ignored unless connected.
    pub fn update_display(&mut self, width: i32, height: i32) {
        if self.state != SessionState::Connected || width <= 0 || height <= 0 {
            return;
        }
        if self.applied_size == Some((width, height)) {
            return;
        }
        let Some(automation) = self.automation.as_mut() else {
            return;
        };

        match automation.update_session_display(width, height) {
            Ok(()) => {
                tracing::debug!(connection_id = %self.connection_id, width, height, "session display updated");
            }
            Err(error) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    %error,
                    "dynamic resolution unavailable; setting static desktop size"
                );
                if let Err(error) = automation.set_desktop_size(width, height) {
                    tracing::debug!(connection_id = %self.connection_id, %error, "static desktop size rejected");
                }
            }
        }
        self.applied_size = Some((width, height));
    }

    pub fn disconnect(&mut self) {
        let Some(automation) = self.automation.as_mut() else {
            self.state = SessionState::Disconnected;
            return;
        };

        automation.reset_password();
        if matches!(self.state, SessionState::Connecting | SessionState::Connected) {
            if let Err(error) = automation.disconnect() {
                tracing::debug!(connection_id = %self.connection_id, %error, "disconnect call failed");
            }
        }
        automation.reset_password();
        self.state = SessionState::Disconnected;
    }

    /// Unsubscribes, disconnects and releases the control. Safe to repeat.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(automation) = self.automation.as_mut() {
            automation.unsubscribe();
        }
        self.disconnect();

        if let Some(mut automation) = self.automation.take() {
            automation.release();
        }
        self.sink = None;
        tracing::debug!(connection_id = %self.connection_id, "session controller disposed");
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn configure_and_connect(
    automation: &mut dyn RdpAutomation,
    params: &ConnectParams,
    connection_id: Uuid,
) -> Result<(), AutomationError> {
    automation.set_server(params.host.trim())?;
    if !params.username.trim().is_empty() {
        automation.set_user_name(params.username.trim())?;
    }
    if let Some(domain) = params.domain.as_deref().filter(|d| !d.trim().is_empty()) {
        automation.set_domain(domain.trim())?;
    }

    // Captured by the control only at connect time.
    automation.set_desktop_size(params.desktop_width, params.desktop_height)?;

    for entry in options::advanced_settings(params.port, &params.options) {
        apply_setting(automation, &entry, connection_id, SettingsKind::Advanced);
    }
    for entry in options::secured_settings() {
        apply_setting(automation, &entry, connection_id, SettingsKind::Secured);
    }
    let depth = options::color_depth(&params.options);
    if !automation.set_advanced_option("ColorDepth", &OptionValue::Int(depth)) {
        tracing::debug!(%connection_id, depth, "color depth not applied");
    }

    let prompt = params.prompt_for_credentials();
    if !automation.set_prompt_for_credentials(prompt) {
        tracing::debug!(%connection_id, prompt, "prompt-for-credentials not applied");
    }

    if !prompt {
        if let Some(password) = params.password.as_ref().filter(|p| !p.is_empty()) {
            automation.set_clear_text_password(password)?;
        }
    }

    automation.connect()
}

#[derive(Clone, Copy)]
enum SettingsKind {
    Advanced,
    Secured,
}

fn apply_setting(
    automation: &mut dyn RdpAutomation,
    entry: &SettingEntry,
    connection_id: Uuid,
    kind: SettingsKind,
) {
    let mut apply = |name: &str| match kind {
        SettingsKind::Advanced => automation.set_advanced_option(name, &entry.value),
        SettingsKind::Secured => automation.set_secured_option(name, &entry.value),
    };

    if apply(&entry.name) {
        return;
    }
    if let Some(fallback) = entry.fallback {
        if apply(fallback) {
            return;
        }
    }
    tracing::debug!(%connection_id, name = %entry.name, value = %entry.value, "setting not supported by this client");
}

/// Wraps a subscriber so that nothing it does unwinds into the caller.
fn guarded_sink(connection_id: Uuid, sink: DisconnectSink) -> DisconnectSink {
    Arc::new(move |reason: DisconnectReason| {
        if catch_unwind(AssertUnwindSafe(|| sink(reason))).is_err() {
            tracing::error!(%connection_id, "disconnect subscriber panicked");
        }
    })
}
