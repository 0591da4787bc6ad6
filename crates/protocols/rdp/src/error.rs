use rdssh_domain::Protocol;
use uuid::Uuid;

// ── Session errors ──

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("native window error: {0}")]
    Platform(String),

    #[error("automation binding failed: {0}")]
    Binding(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connection {0} has no credential assigned")]
    MissingCredential(Uuid),

    #[error("credential {0} not found in the vault")]
    CredentialNotFound(Uuid),

    #[error("credential vault error: {0}")]
    Vault(String),

    #[error("{0} connections are not hosted in-process")]
    UnsupportedProtocol(Protocol),

    #[error("no session for connection {0}")]
    NotFound(Uuid),

    #[error("moving session failed: {0}")]
    Dock(String),

    #[error("UI thread is no longer running")]
    UiThreadGone,

    #[error("native window for connection {0} never became ready")]
    WindowNotReady(Uuid),
}

// ── Automation errors ──

/// A failed late-bound call on the automation object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (hresult {hresult:#010X})")]
pub struct AutomationError {
    pub hresult: u32,
    pub message: String,
}

impl AutomationError {
    pub const E_FAIL: u32 = 0x8000_4005;

    pub fn new(hresult: u32, message: impl Into<String>) -> Self {
        Self {
            hresult,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Self::E_FAIL, message)
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for AutomationError {
    fn from(error: windows::core::Error) -> Self {
        Self {
            hresult: error.code().0 as u32,
            message: error.message(),
        }
    }
}
