//! Hands an RDP launch off to the standalone host process over a named pipe.
//!
//! The wire format is one JSON object per line in each direction: the client
//! writes an [`OpenRdpRequest`], the host answers `{"ok":true}` or
//! `{"error":"..."}`. Secrets never cross the pipe; the host resolves the
//! password itself from the credential key.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

pub const DEFAULT_PIPE_NAME: &str = "RDSSH.RdpHost.Pipe";
pub const DEFAULT_HOST_EXECUTABLE: &str = "RDSSH.RdpHost.exe";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct OpenRdpRequest {
    pub command: String,
    pub title: String,
    pub server: String,
    pub username: String,
    pub domain: Option<String>,
    pub credential_key: String,
}

impl OpenRdpRequest {
    pub const COMMAND: &'static str = "OpenRdp";

    pub fn new(
        title: impl Into<String>,
        server: impl Into<String>,
        username: impl Into<String>,
        domain: Option<String>,
        credential_key: impl Into<String>,
    ) -> Self {
        Self {
            command: Self::COMMAND.to_string(),
            title: title.into(),
            server: server.into(),
            username: username.into(),
            domain,
            credential_key: credential_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("timed out after {0:?} waiting for the host process")]
    Timeout(Duration),
    #[error("pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed host response: {0}")]
    Malformed(String),
    #[error("host rejected the request: {0}")]
    Rejected(String),
    #[error("host closed the pipe without answering")]
    Closed,
    #[error("host process unavailable: {0}")]
    HostUnavailable(String),
}

/// Hand-off to an out-of-process RDP host.
///
/// `false` means the caller should fall back to the in-process path.
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn open_rdp(&self, request: &OpenRdpRequest) -> bool;
}

/// Writes one request line and reads one response line.
pub async fn exchange<S>(stream: &mut S, request: &OpenRdpRequest) -> Result<(), BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload =
        serde_json::to_vec(request).map_err(|err| BridgeError::Malformed(err.to_string()))?;
    payload.push(b'\n');

    let mut stream = BufReader::new(stream);
    stream.write_all(&payload).await?;
    stream.flush().await?;

    let mut line = String::new();
    let read = stream.read_line(&mut line).await?;
    if read == 0 || line.trim().is_empty() {
        return Err(BridgeError::Closed);
    }

    parse_response(line.trim())
}

fn parse_response(line: &str) -> Result<(), BridgeError> {
    let response: HostResponse = serde_json::from_str(line)
        .map_err(|err| BridgeError::Malformed(format!("{err}: {line}")))?;

    if response.ok == Some(true) {
        return Ok(());
    }
    Err(BridgeError::Rejected(
        response
            .error
            .unwrap_or_else(|| "host declined without a reason".to_string()),
    ))
}

/// Named-pipe client that starts the host executable on demand.
#[derive(Debug, Clone)]
pub struct PipeBridge {
    pipe_name: String,
    host_executable: PathBuf,
    connect_timeout: Duration,
}

impl PipeBridge {
    pub fn new(
        pipe_name: impl Into<String>,
        host_executable: impl Into<PathBuf>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            pipe_name: pipe_name.into(),
            host_executable: host_executable.into(),
            connect_timeout,
        }
    }

    pub fn pipe_path(&self) -> String {
        format!(r"\\.\pipe\{}", self.pipe_name)
    }

    pub async fn send(&self, request: &OpenRdpRequest) -> Result<(), BridgeError> {
        let deadline = tokio::time::Instant::now() + self.connect_timeout;
        let mut pipe = self.connect(deadline).await?;

        tokio::time::timeout_at(deadline, exchange(&mut pipe, request))
            .await
            .map_err(|_| BridgeError::Timeout(self.connect_timeout))?
    }

    #[cfg(windows)]
    async fn connect(
        &self,
        deadline: tokio::time::Instant,
    ) -> Result<tokio::net::windows::named_pipe::NamedPipeClient, BridgeError> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let pipe_path = self.pipe_path();
        let mut spawned = false;
        let mut attempt = 0_u32;

        loop {
            match ClientOptions::new().open(&pipe_path) {
                Ok(client) => {
                    tracing::info!(pipe = %pipe_path, attempt, "connected to host pipe");
                    return Ok(client);
                }
                Err(error) => match PipeOpenError::classify(&error) {
                    PipeOpenError::Absent if !spawned => {
                        spawned = true;
                        if let Err(spawn_error) = self.spawn_host() {
                            // A host started elsewhere may still create the pipe.
                            tracing::warn!(pipe = %pipe_path, error = %spawn_error, "could not start rdp host");
                        }
                    }
                    PipeOpenError::Absent | PipeOpenError::Busy => {
                        tracing::trace!(pipe = %pipe_path, attempt, %error, "host pipe not ready");
                    }
                    PipeOpenError::Other => {
                        tracing::debug!(pipe = %pipe_path, attempt, %error, "host pipe open failed");
                    }
                },
            }

            attempt += 1;
            if tokio::time::Instant::now() + CONNECT_RETRY_INTERVAL > deadline {
                return Err(BridgeError::Timeout(self.connect_timeout));
            }
            tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
        }
    }

    #[cfg(not(windows))]
    async fn connect(&self, _deadline: tokio::time::Instant) -> Result<tokio::io::DuplexStream, BridgeError> {
        Err(BridgeError::HostUnavailable(
            "named-pipe handoff is only supported on Windows".to_string(),
        ))
    }

    #[cfg(windows)]
    fn spawn_host(&self) -> Result<(), BridgeError> {
        if !self.host_executable.is_file() {
            return Err(BridgeError::HostUnavailable(format!(
                "{} not found",
                self.host_executable.display()
            )));
        }

        let mut command = tokio::process::Command::new(&self.host_executable);
        if let Some(dir) = self.host_executable.parent() {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .map_err(|err| BridgeError::HostUnavailable(err.to_string()))?;
        tracing::info!(
            executable = %self.host_executable.display(),
            pid = child.id(),
            "started rdp host process"
        );
        Ok(())
    }
}

#[async_trait]
impl HostBridge for PipeBridge {
    async fn open_rdp(&self, request: &OpenRdpRequest) -> bool {
        match self.send(request).await {
            Ok(()) => {
                tracing::info!(server = %request.server, "rdp launch handed off to host process");
                true
            }
            Err(error) => {
                tracing::warn!(server = %request.server, %error, "rdp host handoff failed");
                false
            }
        }
    }
}

/// Why a client could not open the host pipe.
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipeOpenError {
    /// No server instance exists: the host is not running.
    Absent,
    /// Every server instance is taken; the host is up.
    Busy,
    Other,
}

impl PipeOpenError {
    const ERROR_FILE_NOT_FOUND: i32 = 2;
    const ERROR_PIPE_BUSY: i32 = 231;

    fn classify(error: &std::io::Error) -> Self {
        match error.raw_os_error() {
            Some(Self::ERROR_FILE_NOT_FOUND) => Self::Absent,
            Some(Self::ERROR_PIPE_BUSY) => Self::Busy,
            _ => Self::Other,
        }
    }
}
