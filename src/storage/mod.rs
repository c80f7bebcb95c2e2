//! Persistence driver abstraction.
//!
//! The state machine persists a full snapshot after every accepted
//! mutation. The driver stores the triple verbatim; the session-reset rule
//! on load belongs to the state machine, not the driver.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::state::{Lanes, Settings, Snapshot, User};

pub mod json;
pub mod noop;

pub use json::JsonStore;
pub use noop::NullStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write the full `{users, messages, settings}` triple.
    async fn save(
        &self,
        users: &HashMap<String, User>,
        lanes: &Lanes,
        settings: &Settings,
    ) -> Result<(), StorageError>;

    /// Read the triple back, creating defaults where nothing is stored yet.
    async fn load(&self) -> Result<Snapshot, StorageError>;
}
