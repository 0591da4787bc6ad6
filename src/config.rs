//! Application settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "settings.json";
pub const DATA_DIR_ENV: &str = "RDSSH_DATA_DIR";
const DATA_DIR_NAME: &str = "RDSSH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub display: DisplayConfig,
    pub bridge: BridgeConfig,
    pub ssh: SshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

/// Desktop size used until a session's tab has been laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub default_width: i32,
    pub default_height: i32,
}

/// Handoff to the standalone RDP host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub prefer_host_process: bool,
    pub pipe_name: String,
    pub connect_timeout_ms: u64,
    /// Empty means the default executable next to this one.
    pub host_executable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Terminal that runs `ssh`; empty runs it directly.
    pub terminal: String,
}

// ── Defaults ──

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_width: 1280,
            default_height: 720,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            prefer_host_process: false,
            pipe_name: rdssh_bridge::DEFAULT_PIPE_NAME.into(),
            connect_timeout_ms: rdssh_bridge::DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            host_executable: String::new(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            terminal: rdssh_protocol_ssh::DEFAULT_TERMINAL.into(),
        }
    }
}

// ── Loading ──

impl AppConfig {
    /// Reads the settings file. A missing file is `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| format!("reading {}", path.display()))
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .with_context(|| format!("parsing {}", path.display()))
    }
}

impl BridgeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn host_executable_path(&self) -> PathBuf {
        if !self.host_executable.trim().is_empty() {
            return PathBuf::from(self.host_executable.trim());
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join(rdssh_bridge::DEFAULT_HOST_EXECUTABLE)
    }
}

/// `RDSSH_DATA_DIR` if set, else the per-user local data directory.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .ok_or_else(|| anyhow!("no local data directory for this user"))
}
