use std::sync::Arc;
use std::time::Duration;

use rdssh_bridge::{HostBridge, OpenRdpRequest};
use rdssh_domain::{
    split_user_and_domain, ConnectionProfile, CredentialRecord, Protocol, RDP_DEFAULT_PORT,
};
use rdssh_secrets::CredentialService;
use uuid::Uuid;

use crate::dispatcher::UiDispatcher;
use crate::embed::ReadySignal;
use crate::error::SessionError;
use crate::host::{SessionHost, StartOutcome};
use crate::options::ConnectParams;
use crate::status::ConnectionStatus;

#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Desktop size used when the hosting area has not been laid out yet.
    pub default_width: i32,
    pub default_height: i32,
    pub ready_timeout: Duration,
    /// Try the standalone host process before hosting in-process.
    pub prefer_host_process: bool,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            default_width: 1280,
            default_height: 720,
            ready_timeout: Duration::from_secs(10),
            prefer_host_process: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new session was created and Connect was issued.
    Connected,
    /// The profile already had a session; it was brought to the front.
    Focused,
    /// The standalone host process accepted the launch.
    HandedOff,
}

/// Sequences a launch across the vault, the UI thread and the session host.
#[derive(Clone)]
pub struct LaunchOrchestrator {
    ui: UiDispatcher<SessionHost>,
    credentials: CredentialService,
    status: ConnectionStatus,
    bridge: Option<Arc<dyn HostBridge>>,
    settings: LaunchSettings,
}

impl LaunchOrchestrator {
    pub fn new(
        ui: UiDispatcher<SessionHost>,
        credentials: CredentialService,
        status: ConnectionStatus,
    ) -> Self {
        Self {
            ui,
            credentials,
            status,
            bridge: None,
            settings: LaunchSettings::default(),
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn HostBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_settings(mut self, settings: LaunchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Opens (or focuses) the embedded session for an RDP profile.
    ///
    /// Any failure leaves no session behind and clears the profile's
    /// connected flag.
    pub async fn launch(&self, profile: &ConnectionProfile) -> Result<LaunchOutcome, SessionError> {
        if profile.protocol != Protocol::Rdp {
            return Err(SessionError::UnsupportedProtocol(profile.protocol));
        }

        let result = self.launch_rdp(profile).await;
        match &result {
            Ok(outcome) => {
                tracing::info!(connection_id = %profile.id, ?outcome, "launch finished");
            }
            Err(error) => {
                tracing::warn!(connection_id = %profile.id, %error, "launch failed");
                self.status.set(profile.id, false);
            }
        }
        result
    }

    async fn launch_rdp(&self, profile: &ConnectionProfile) -> Result<LaunchOutcome, SessionError> {
        let id = profile.id;
        let credential = self.resolve_credential(profile)?;

        let raw_user = if credential.username.trim().is_empty() {
            profile.username.as_deref().unwrap_or_default()
        } else {
            credential.username.as_str()
        };
        let explicit_domain = credential
            .domain
            .as_deref()
            .or(profile.domain.as_deref());
        let (username, domain) = split_user_and_domain(raw_user, explicit_domain);

        if self.settings.prefer_host_process {
            // An embedded session always wins over a second window in the host process.
            let open = self
                .ui
                .call(move |host: &mut SessionHost| host.focus_if_open(id))
                .await?;
            if open {
                return Ok(LaunchOutcome::Focused);
            }
            if self
                .hand_off(profile, &username, domain.clone(), credential.id)
                .await
            {
                return Ok(LaunchOutcome::HandedOff);
            }
        }

        let title = profile.title().to_string();
        let outcome = self
            .ui
            .call(move |host: &mut SessionHost| host.start_or_focus(id, &title))
            .await??;
        let ready = match outcome {
            StartOutcome::Focused => return Ok(LaunchOutcome::Focused),
            StartOutcome::Started(ready) => ready,
        };

        let params = ConnectParams {
            host: profile.hostname.trim().to_string(),
            port: profile.effective_port(),
            username,
            domain,
            password: Some(credential.secret),
            desktop_width: self.settings.default_width,
            desktop_height: self.settings.default_height,
            options: profile.rdp.clone(),
            prompt_override: None,
        };

        if let Err(error) = self.connect_when_ready(id, ready, params).await {
            self.abort(id);
            return Err(error);
        }
        Ok(LaunchOutcome::Connected)
    }

    async fn connect_when_ready(
        &self,
        id: Uuid,
        ready: ReadySignal,
        params: ConnectParams,
    ) -> Result<(), SessionError> {
        // The window is created by a later pass of the UI loop; only this task waits.
        let window = tokio::time::timeout(self.settings.ready_timeout, ready.wait())
            .await
            .ok()
            .flatten()
            .ok_or(SessionError::WindowNotReady(id))?;
        tracing::debug!(connection_id = %id, hwnd = %window, "session window ready");

        self.ui
            .call(move |host: &mut SessionHost| host.connect_session(id, params))
            .await?
    }

    fn resolve_credential(&self, profile: &ConnectionProfile) -> Result<CredentialRecord, SessionError> {
        let credential_id = profile
            .credential_id
            .ok_or(SessionError::MissingCredential(profile.id))?;

        self.credentials
            .resolve(credential_id)
            .map_err(|error| SessionError::Vault(format!("{error:#}")))?
            .ok_or(SessionError::CredentialNotFound(credential_id))
    }

    async fn hand_off(
        &self,
        profile: &ConnectionProfile,
        username: &str,
        domain: Option<String>,
        credential_id: Uuid,
    ) -> bool {
        let Some(bridge) = self.bridge.as_ref() else {
            return false;
        };
        let credential_key = match self.credentials.target_for(credential_id) {
            Ok(Some(target)) => target,
            Ok(None) => return false,
            Err(error) => {
                tracing::warn!(connection_id = %profile.id, error = %format!("{error:#}"), "credential key lookup failed");
                return false;
            }
        };

        let port = profile.effective_port();
        let server = if port == RDP_DEFAULT_PORT {
            profile.hostname.trim().to_string()
        } else {
            format!("{}:{port}", profile.hostname.trim())
        };

        let request = OpenRdpRequest::new(profile.title(), server, username, domain, credential_key);
        let accepted = bridge.open_rdp(&request).await;
        if !accepted {
            tracing::info!(connection_id = %profile.id, "host process unavailable; hosting in-process");
        }
        accepted
    }

    fn abort(&self, id: Uuid) {
        if !self.ui.post(move |host: &mut SessionHost| host.abort_launch(id)) {
            tracing::debug!(connection_id = %id, "ui thread gone before launch cleanup");
        }
        self.status.set(id, false);
    }
}
