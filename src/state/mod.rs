//! Replica state: accounts, message lanes, settings, and the mutation core.

mod machine;
mod message;
mod settings;
mod user;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use machine::{ChatState, replicates};
pub use message::{Lanes, StoredMessage};
pub use settings::Settings;
pub use user::User;

/// The `{users, messages, settings}` triple, persisted per mutation and
/// transferred whole in `set_database` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: HashMap<String, User>,
    pub messages: Lanes,
    pub settings: Settings,
}
