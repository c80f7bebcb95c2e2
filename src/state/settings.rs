//! The persisted settings blob.

use serde::{Deserialize, Serialize};

/// Per-replica settings. `counter` is the sole source of message ids; the
/// endpoint fields record the launch-time listen addresses and ride along
/// in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub counter: u64,
    pub host: String,
    pub port: u16,
    pub host_json: String,
    pub port_json: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            counter: 0,
            host: "127.0.0.1".to_string(),
            port: 54400,
            host_json: "127.0.0.1".to_string(),
            port_json: 54444,
        }
    }
}
