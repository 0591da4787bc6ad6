use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rdssh_domain::{ConnectionIndexFile, ConnectionProfile};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const CONNECTIONS_FILE: &str = "connections.json";
pub const INDEX_FILE: &str = "connections.index.json";

/// Ordered list of connection profiles persisted as JSON.
#[derive(Clone)]
pub struct ConnectionStore {
    file_path: PathBuf,
    index_path: PathBuf,
    profiles: Arc<RwLock<Vec<ConnectionProfile>>>,
}

impl ConnectionStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            file_path: base_dir.join(CONNECTIONS_FILE),
            index_path: base_dir.join(INDEX_FILE),
            profiles: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Opens the store and reads whatever is on disk.
    pub async fn open(base_dir: &Path) -> Result<Self> {
        let store = Self::new(base_dir);
        store.load().await?;
        Ok(store)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Replaces the in-memory list with the file contents. A missing or empty
    /// file yields an empty list.
    pub async fn load(&self) -> Result<()> {
        let exists = tokio::fs::try_exists(&self.file_path)
            .await
            .context("checking connection file existence")?;

        let loaded = if exists {
            let bytes = tokio::fs::read(&self.file_path)
                .await
                .with_context(|| format!("reading connection file {}", self.file_path.display()))?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                Vec::new()
            } else {
                serde_json::from_slice::<Vec<ConnectionProfile>>(&bytes)
                    .with_context(|| format!("parsing connection file {}", self.file_path.display()))?
            }
        } else {
            Vec::new()
        };

        tracing::info!(count = loaded.len(), path = %self.file_path.display(), "connections loaded");
        *self.profiles.write().await = loaded;
        Ok(())
    }

    pub async fn list(&self) -> Vec<ConnectionProfile> {
        self.profiles.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<ConnectionProfile> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|profile| profile.id == id)
            .cloned()
    }

    /// Replaces the profile with the same id in place, or appends it.
    pub async fn upsert(&self, profile: ConnectionProfile) -> Result<()> {
        if profile.hostname.trim().is_empty() {
            return Err(anyhow!("connection {} has no hostname", profile.id));
        }

        let mut profiles = self.profiles.write().await;
        let mut updated = profiles.clone();
        match updated.iter_mut().find(|existing| existing.id == profile.id) {
            Some(existing) => *existing = profile,
            None => updated.push(profile),
        }

        self.persist(&updated).await?;
        *profiles = updated;
        Ok(())
    }

    /// Removes a profile; returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut profiles = self.profiles.write().await;
        let mut updated = profiles.clone();
        updated.retain(|profile| profile.id != id);
        if updated.len() == profiles.len() {
            return Ok(false);
        }

        self.persist(&updated).await?;
        *profiles = updated;
        Ok(true)
    }

    /// Writes the store and then the search index, each atomically.
    pub async fn save(&self) -> Result<()> {
        let profiles = self.profiles.read().await;
        self.persist(&profiles).await
    }

    // The in-memory list only changes after this succeeds.
    async fn persist(&self, profiles: &[ConnectionProfile]) -> Result<()> {
        let payload =
            serde_json::to_vec_pretty(profiles).context("serializing connection list")?;
        write_atomic(&self.file_path, &payload).await?;

        let index = ConnectionIndexFile::from_profiles(profiles);
        let payload = serde_json::to_vec_pretty(&index).context("serializing search index")?;
        write_atomic(&self.index_path, &payload).await?;

        tracing::debug!(count = profiles.len(), "connections saved");
        Ok(())
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let mut tmp_name = path
        .file_name()
        .ok_or_else(|| anyhow!("invalid target path {}", path.display()))?
        .to_os_string();
    tmp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("writing temp file {}", tmp_path.display()))?;

    if let Err(error) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(error).with_context(|| format!("replacing {}", path.display()));
    }

    Ok(())
}
