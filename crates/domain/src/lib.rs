use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

pub const RDP_DEFAULT_PORT: u16 = 3389;
pub const SSH_DEFAULT_PORT: u16 = 22;

/// Prefix shared by every credential this application writes to the OS vault.
pub const CREDENTIAL_PREFIX: &str = "RDSSH\\";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Rdp,
    Ssh,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Rdp => RDP_DEFAULT_PORT,
            Self::Ssh => SSH_DEFAULT_PORT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rdp => "RDP",
            Self::Ssh => "SSH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("rdp") {
            Some(Self::Rdp)
        } else if value.eq_ignore_ascii_case("ssh") {
            Some(Self::Ssh)
        } else {
            None
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PerformancePreset {
    #[default]
    Auto,
    Low,
    Medium,
    High,
}

/// Protocol-specific options of an RDP profile.
///
/// Every field carries a serde default so connection files written by older
/// releases keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RdpOptions {
    pub ignore_cert: bool,
    pub tls_legacy: bool,
    pub clipboard: bool,
    pub admin_mode: bool,
    pub load_balance_info: Option<String>,
    pub extra_args: Option<String>,
    pub font_smoothing: bool,
    pub disable_animations: bool,
    pub bitmap_cache: bool,
    pub performance_preset: PerformancePreset,
}

impl Default for RdpOptions {
    fn default() -> Self {
        Self {
            ignore_cert: false,
            tls_legacy: false,
            clipboard: true,
            admin_mode: false,
            load_balance_info: None,
            extra_args: None,
            font_smoothing: true,
            disable_animations: false,
            bitmap_cache: true,
            performance_preset: PerformancePreset::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: Uuid,
    pub protocol: Protocol,
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential_id: Option<Uuid>,
    #[serde(default)]
    pub rdp: RdpOptions,
}

impl ConnectionProfile {
    pub fn new(protocol: Protocol, hostname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol,
            hostname: hostname.into(),
            port: None,
            display_name: String::new(),
            domain: None,
            username: None,
            credential_id: None,
            rdp: RdpOptions::default(),
        }
    }

    /// Display label, falling back to the hostname.
    pub fn title(&self) -> &str {
        if self.display_name.trim().is_empty() {
            self.hostname.trim()
        } else {
            self.display_name.trim()
        }
    }

    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) if port > 0 => port,
            _ => self.protocol.default_port(),
        }
    }
}

/// Vault key of a stored credential: `RDSSH\<label>|<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub id: Uuid,
    pub label: String,
}

impl CredentialKey {
    pub fn new(id: Uuid, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    pub fn target(&self) -> String {
        format!("{CREDENTIAL_PREFIX}{}|{}", self.label, self.id)
    }

    pub fn parse(target: &str) -> Option<Self> {
        let rest = target.strip_prefix(CREDENTIAL_PREFIX)?;
        let (label, id) = rest.rsplit_once('|')?;
        let id = Uuid::parse_str(id).ok()?;
        Some(Self::new(id, label))
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target())
    }
}

/// A credential resolved from the vault. The secret is wiped on drop.
#[derive(Clone)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub username: String,
    pub domain: Option<String>,
    pub secret: Zeroizing<String>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Public credential listing, without the secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub id: Uuid,
    pub username: String,
    pub domain: Option<String>,
}

/// Secrets-free projection of the connection store for launcher integrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIndexFile {
    pub version: u32,
    pub generated_utc: DateTime<Utc>,
    pub connections: Vec<ConnectionIndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIndexEntry {
    pub id: Uuid,
    pub title: String,
    pub hostname: String,
    pub protocol: Protocol,
    pub port: u16,
}

impl From<&ConnectionProfile> for ConnectionIndexEntry {
    fn from(profile: &ConnectionProfile) -> Self {
        Self {
            id: profile.id,
            title: profile.title().to_string(),
            hostname: profile.hostname.clone(),
            protocol: profile.protocol,
            port: profile.effective_port(),
        }
    }
}

impl ConnectionIndexFile {
    pub const VERSION: u32 = 1;

    pub fn from_profiles(profiles: &[ConnectionProfile]) -> Self {
        Self {
            version: Self::VERSION,
            generated_utc: Utc::now(),
            connections: profiles.iter().map(ConnectionIndexEntry::from).collect(),
        }
    }
}

/// Splits `DOMAIN\user` and `user@domain` forms.
///
/// An explicit, non-blank `domain` wins over the one embedded in the user name.
pub fn split_user_and_domain(user: &str, domain: Option<&str>) -> (String, Option<String>) {
    let user = user.trim();
    let explicit = domain
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    if let Some((d, u)) = user.split_once('\\') {
        if !d.is_empty() && !u.is_empty() {
            return (u.to_string(), explicit.or_else(|| Some(d.to_string())));
        }
    }

    if let Some((u, d)) = user.split_once('@') {
        if !u.is_empty() && !d.is_empty() {
            return (u.to_string(), explicit.or_else(|| Some(d.to_string())));
        }
    }

    (user.to_string(), explicit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_files_default_protocol_options() {
        let json = r#"{"id":"5f2b6a8e-3c1d-4e7f-9a0b-1c2d3e4f5a6b","protocol":"rdp","hostname":"srv1"}"#;
        let profile: ConnectionProfile = serde_json::from_str(json).expect("profile parses");

        assert!(profile.rdp.clipboard);
        assert!(!profile.rdp.ignore_cert);
        assert!(profile.rdp.bitmap_cache);
        assert_eq!(profile.rdp.performance_preset, PerformancePreset::Auto);
        assert_eq!(profile.effective_port(), 3389);
        assert_eq!(profile.title(), "srv1");
    }

    #[test]
    fn credential_key_round_trips_through_target() {
        let key = CredentialKey::new(Uuid::new_v4(), "alice");
        let parsed = CredentialKey::parse(&key.target()).expect("key parses");
        assert_eq!(parsed, key);
        assert!(CredentialKey::parse("OTHER\\alice|x").is_none());
    }

    #[test]
    fn splits_backslash_and_upn_forms() {
        assert_eq!(
            split_user_and_domain("CORP\\alice", None),
            ("alice".into(), Some("CORP".into()))
        );
        assert_eq!(
            split_user_and_domain("alice@corp.local", Some("  ")),
            ("alice".into(), Some("corp.local".into()))
        );
        assert_eq!(
            split_user_and_domain("CORP\\alice", Some("OTHER")),
            ("alice".into(), Some("OTHER".into()))
        );
        assert_eq!(split_user_and_domain(" bob ", None), ("bob".into(), None));
    }
}
