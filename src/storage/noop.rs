//! No-op snapshot store.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{SnapshotStore, StorageError};
use crate::state::{Lanes, Settings, Snapshot, User};

/// Discards every save and loads an empty snapshot. Used by tests and by
/// replicas running without a data directory.
pub struct NullStore;

#[async_trait]
impl SnapshotStore for NullStore {
    async fn save(
        &self,
        _users: &HashMap<String, User>,
        _lanes: &Lanes,
        _settings: &Settings,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, StorageError> {
        Ok(Snapshot::default())
    }
}
