use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rdssh_bridge::PipeBridge;
use rdssh_protocol_rdp::{
    ConnectionStatus, ContainerDirectory, LaunchOrchestrator, LaunchSettings, SessionHost,
    UiDispatcher,
};
use rdssh_secrets::{platform_vault, CredentialService, CredentialVault};
use rdssh_storage::ConnectionStore;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub store: ConnectionStore,
    pub credentials: CredentialService,
    pub status: ConnectionStatus,
    pub containers: ContainerDirectory,
}

impl AppState {
    pub async fn new(data_dir: PathBuf, config: AppConfig) -> Result<Self> {
        Self::with_vault(data_dir, config, platform_vault()).await
    }

    pub async fn with_vault(
        data_dir: PathBuf,
        config: AppConfig,
        vault: Arc<dyn CredentialVault>,
    ) -> Result<Self> {
        let store = ConnectionStore::open(&data_dir)
            .await
            .with_context(|| format!("opening connection store in {}", data_dir.display()))?;

        Ok(Self {
            config,
            data_dir,
            store,
            credentials: CredentialService::new(vault),
            status: ConnectionStatus::new(),
            containers: ContainerDirectory::new(),
        })
    }

    /// Launch orchestrator bound to the UI thread behind `ui`.
    pub fn launcher(&self, ui: UiDispatcher<SessionHost>) -> LaunchOrchestrator {
        let bridge_config = &self.config.bridge;
        let settings = LaunchSettings {
            default_width: self.config.display.default_width,
            default_height: self.config.display.default_height,
            prefer_host_process: bridge_config.prefer_host_process,
            ..LaunchSettings::default()
        };

        let launcher = LaunchOrchestrator::new(ui, self.credentials.clone(), self.status.clone())
            .with_settings(settings);
        if !bridge_config.prefer_host_process {
            return launcher;
        }

        let bridge = PipeBridge::new(
            bridge_config.pipe_name.clone(),
            bridge_config.host_executable_path(),
            bridge_config.connect_timeout(),
        );
        launcher.with_bridge(Arc::new(bridge))
    }
}
