//! JSON file snapshot store.
//!
//! Three blobs per replica id under the data directory: `users_<id>.json`,
//! `messages_<id>.json`, `settings_<id>.json`. Missing blobs are created
//! with defaults on first load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{SnapshotStore, StorageError};
use crate::state::{Lanes, Settings, Snapshot, User};

pub struct JsonStore {
    users_path: PathBuf,
    messages_path: PathBuf,
    settings_path: PathBuf,
}

impl JsonStore {
    pub fn new(data_dir: impl AsRef<Path>, replica_id: usize) -> Self {
        let dir = data_dir.as_ref();
        Self {
            users_path: dir.join(format!("users_{replica_id}.json")),
            messages_path: dir.join(format!("messages_{replica_id}.json")),
            settings_path: dir.join(format!("settings_{replica_id}.json")),
        }
    }

    async fn write_blob<T: serde::Serialize>(
        path: &Path,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn read_blob<T>(path: &Path, default: T) -> Result<T, StorageError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Creating snapshot blob");
                Self::write_blob(path, &default).await?;
                Ok(default)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonStore {
    async fn save(
        &self,
        users: &HashMap<String, User>,
        lanes: &Lanes,
        settings: &Settings,
    ) -> Result<(), StorageError> {
        Self::write_blob(&self.users_path, users).await?;
        Self::write_blob(&self.messages_path, lanes).await?;
        Self::write_blob(&self.settings_path, settings).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, StorageError> {
        if let Some(dir) = self.users_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let users = Self::read_blob(&self.users_path, HashMap::new()).await?;
        let messages = Self::read_blob(&self.messages_path, Lanes::default()).await?;
        let settings = Self::read_blob(&self.settings_path, Settings::default()).await?;
        Ok(Snapshot {
            users,
            messages,
            settings,
        })
    }
}
