//! Operations behind the CLI and the shell's activation path.

use anyhow::{anyhow, Context, Result};
use rdssh_domain::{ConnectionProfile, CredentialSummary, Protocol};
use rdssh_protocol_rdp::{LaunchOrchestrator, LaunchOutcome};
use rdssh_protocol_ssh::SshLaunchConfig;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launched {
    Rdp(LaunchOutcome),
    /// Process id of the terminal, when the OS reported one.
    Ssh(Option<u32>),
}

pub async fn connection_list(state: &AppState) -> Vec<ConnectionProfile> {
    state.store.list().await
}

pub async fn connection_upsert(state: &AppState, profile: ConnectionProfile) -> Result<()> {
    if let Some(credential_id) = profile.credential_id {
        let known = state
            .credentials
            .target_for(credential_id)
            .context("checking credential reference")?
            .is_some();
        if !known {
            return Err(anyhow!("credential {credential_id} does not exist"));
        }
    }
    state.store.upsert(profile).await
}

pub async fn connection_remove(state: &AppState, id: Uuid) -> Result<bool> {
    state.store.remove(id).await
}

/// Rewrites the connection file and its search index from the loaded list.
pub async fn index_write(state: &AppState) -> Result<()> {
    state.store.save().await
}

pub fn credential_add(
    state: &AppState,
    username: &str,
    domain: Option<&str>,
    secret: &str,
) -> Result<CredentialSummary> {
    state.credentials.store(username, domain, secret)
}

pub fn credential_list(state: &AppState) -> Result<Vec<CredentialSummary>> {
    state.credentials.list()
}

pub fn credential_remove(state: &AppState, id: Uuid) -> Result<bool> {
    state.credentials.remove(id)
}

/// Opens a stored connection with the launcher for its protocol.
pub async fn connection_launch(
    state: &AppState,
    launcher: &LaunchOrchestrator,
    id: Uuid,
) -> Result<Launched> {
    let profile = state
        .store
        .get(id)
        .await
        .ok_or_else(|| anyhow!("connection {id} not found"))?;

    match profile.protocol {
        Protocol::Rdp => Ok(Launched::Rdp(launcher.launch(&profile).await?)),
        Protocol::Ssh => ssh_launch(state, &profile).await.map(Launched::Ssh),
    }
}

/// Starts `ssh` in the configured terminal. The profile reads as connected
/// only while the spawn is in flight.
pub async fn ssh_launch(state: &AppState, profile: &ConnectionProfile) -> Result<Option<u32>> {
    let config = SshLaunchConfig {
        terminal: state.config.ssh.terminal.clone(),
        host: profile.hostname.trim().to_string(),
        port: profile.effective_port(),
        username: profile.username.clone(),
    };

    state.status.set(profile.id, true);
    let result = rdssh_protocol_ssh::launch(&config).await;
    state.status.set(profile.id, false);

    match &result {
        Ok(pid) => tracing::info!(connection_id = %profile.id, ?pid, "ssh terminal started"),
        Err(error) => {
            tracing::warn!(connection_id = %profile.id, error = %format!("{error:#}"), "ssh launch failed")
        }
    }
    result
}
