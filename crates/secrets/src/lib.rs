use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use rdssh_domain::{
    CredentialKey, CredentialRecord, CredentialSummary, CREDENTIAL_PREFIX,
};
use uuid::Uuid;
use zeroize::Zeroizing;

#[cfg(windows)]
mod wincred;

#[cfg(windows)]
pub use wincred::WindowsCredentialVault;

/// What the vault returns for a key. The secret is wiped on drop.
pub struct StoredCredential {
    pub username: String,
    pub secret: Zeroizing<String>,
    pub comment: Option<String>,
}

/// Enumeration entry: everything but the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEntry {
    pub target: String,
    pub username: String,
    pub comment: Option<String>,
}

/// OS-level key/value secret storage.
///
/// `enumerate` only returns entries whose target starts with this
/// application's prefix.
pub trait CredentialVault: Send + Sync {
    fn write(&self, target: &str, username: &str, secret: &str, comment: Option<&str>) -> Result<()>;
    fn read(&self, target: &str) -> Result<Option<StoredCredential>>;
    fn delete(&self, target: &str) -> Result<bool>;
    fn enumerate(&self) -> Result<Vec<VaultEntry>>;
}

/// Process-local vault used off Windows and by tests.
#[derive(Default, Clone)]
pub struct MemoryVault {
    entries: Arc<Mutex<BTreeMap<String, MemoryEntry>>>,
}

struct MemoryEntry {
    username: String,
    secret: Zeroizing<String>,
    comment: Option<String>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialVault for MemoryVault {
    fn write(&self, target: &str, username: &str, secret: &str, comment: Option<&str>) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("vault mutex poisoned"))?;
        guard.insert(
            target.to_string(),
            MemoryEntry {
                username: username.to_string(),
                secret: Zeroizing::new(secret.to_string()),
                comment: comment.map(str::to_string),
            },
        );
        Ok(())
    }

    fn read(&self, target: &str) -> Result<Option<StoredCredential>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("vault mutex poisoned"))?;
        Ok(guard.get(target).map(|entry| StoredCredential {
            username: entry.username.clone(),
            secret: entry.secret.clone(),
            comment: entry.comment.clone(),
        }))
    }

    fn delete(&self, target: &str) -> Result<bool> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("vault mutex poisoned"))?;
        Ok(guard.remove(target).is_some())
    }

    fn enumerate(&self) -> Result<Vec<VaultEntry>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("vault mutex poisoned"))?;
        Ok(guard
            .iter()
            .filter(|(target, _)| target.starts_with(CREDENTIAL_PREFIX))
            .map(|(target, entry)| VaultEntry {
                target: target.clone(),
                username: entry.username.clone(),
                comment: entry.comment.clone(),
            })
            .collect())
    }
}

/// The vault the current platform offers.
pub fn platform_vault() -> Arc<dyn CredentialVault> {
    #[cfg(windows)]
    {
        Arc::new(WindowsCredentialVault)
    }
    #[cfg(not(windows))]
    {
        tracing::warn!("no OS credential vault on this platform; credentials live in memory only");
        Arc::new(MemoryVault::new())
    }
}

/// Credential CRUD keyed by stable ids on top of a [`CredentialVault`].
#[derive(Clone)]
pub struct CredentialService {
    vault: Arc<dyn CredentialVault>,
}

impl CredentialService {
    pub fn new(vault: Arc<dyn CredentialVault>) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &Arc<dyn CredentialVault> {
        &self.vault
    }

    pub fn store(&self, username: &str, domain: Option<&str>, secret: &str) -> Result<CredentialSummary> {
        self.write_record(Uuid::new_v4(), username, domain, secret)
    }

    /// Rewrites an existing credential under the same id. The key embeds the
    /// username, so a rename deletes the old entry.
    pub fn update(
        &self,
        id: Uuid,
        username: &str,
        domain: Option<&str>,
        secret: &str,
    ) -> Result<CredentialSummary> {
        let previous = self.find_key(id)?;
        let summary = self.write_record(id, username, domain, secret)?;

        if let Some(previous) = previous {
            if previous.target() != CredentialKey::new(id, username.trim()).target() {
                self.vault
                    .delete(&previous.target())
                    .with_context(|| format!("deleting renamed credential {id}"))?;
            }
        }
        Ok(summary)
    }

    pub fn resolve(&self, id: Uuid) -> Result<Option<CredentialRecord>> {
        let Some(key) = self.find_key(id)? else {
            return Ok(None);
        };

        let stored = self
            .vault
            .read(&key.target())
            .with_context(|| format!("reading credential {id}"))?;

        Ok(stored.map(|stored| CredentialRecord {
            id,
            username: stored.username,
            domain: stored.comment.filter(|d| !d.trim().is_empty()),
            secret: stored.secret,
        }))
    }

    pub fn list(&self) -> Result<Vec<CredentialSummary>> {
        let entries = self.vault.enumerate().context("enumerating credentials")?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let key = CredentialKey::parse(&entry.target)?;
                Some(CredentialSummary {
                    id: key.id,
                    username: entry.username,
                    domain: entry.comment.filter(|d| !d.trim().is_empty()),
                })
            })
            .collect())
    }

    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let Some(key) = self.find_key(id)? else {
            return Ok(false);
        };
        self.vault
            .delete(&key.target())
            .with_context(|| format!("deleting credential {id}"))
    }

    /// The vault target for a credential id, if stored.
    pub fn target_for(&self, id: Uuid) -> Result<Option<String>> {
        Ok(self.find_key(id)?.map(|key| key.target()))
    }

    fn find_key(&self, id: Uuid) -> Result<Option<CredentialKey>> {
        let entries = self.vault.enumerate().context("enumerating credentials")?;
        Ok(entries
            .iter()
            .filter_map(|entry| CredentialKey::parse(&entry.target))
            .find(|key| key.id == id))
    }

    fn write_record(
        &self,
        id: Uuid,
        username: &str,
        domain: Option<&str>,
        secret: &str,
    ) -> Result<CredentialSummary> {
        let username = username.trim();
        if username.is_empty() {
            return Err(anyhow!("credential username cannot be empty"));
        }
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());

        let key = CredentialKey::new(id, username);
        self.vault
            .write(&key.target(), username, secret, domain)
            .with_context(|| format!("writing credential {id}"))?;
        tracing::info!(credential_id = %id, "credential stored");

        Ok(CredentialSummary {
            id,
            username: username.to_string(),
            domain: domain.map(str::to_string),
        })
    }
}
