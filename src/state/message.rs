//! Messages and the two delivery lanes.

use serde::{Deserialize, Serialize};

/// One chat message. Ids are assigned from the settings counter and are
/// unique within a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub sender: String,
    pub receiver: String,
    pub message: String,
}

/// The two ordered delivery lanes.
///
/// `undelivered` holds messages sent while the receiver was offline; a
/// drain moves them to `delivered` in lane order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lanes {
    pub undelivered: Vec<StoredMessage>,
    pub delivered: Vec<StoredMessage>,
}

impl Lanes {
    /// Buffered-message count for one receiver.
    pub fn undelivered_count_for(&self, username: &str) -> u64 {
        self.undelivered
            .iter()
            .filter(|m| m.receiver == username)
            .count() as u64
    }

    /// Remove every message the account sent or received, in both lanes.
    pub fn purge_account(&mut self, username: &str) {
        self.undelivered
            .retain(|m| m.sender != username && m.receiver != username);
        self.delivered
            .retain(|m| m.sender != username && m.receiver != username);
    }
}
