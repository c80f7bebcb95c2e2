//! Replica-channel frames.
//!
//! The peer vocabulary is disjoint from the client one: liveness pings,
//! leader announcements, replicated-command delivery, and full-snapshot
//! transfer. `distribute_update` nests a client-mutation envelope verbatim;
//! the snapshot frames carry the `{users, messages, settings}` triple as
//! free-form JSON so this crate stays ignorant of the server's state types.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

/// A frame on the replica channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum PeerFrame {
    /// Liveness probe; no payload, no reply.
    Ping,
    /// Informational leader announcement.
    InternalUpdate {
        /// Endpoint string of the announced leader.
        leader: String,
    },
    /// A replicated client mutation, nested as its original envelope.
    DistributeUpdate(Envelope),
    /// Request for a full snapshot; carries the requester's peer endpoint
    /// so the reply can be routed over the dialed-back connection.
    GetDatabase {
        /// Requester's peer host.
        host: String,
        /// Requester's peer port.
        port: u16,
    },
    /// Full snapshot transfer: the `{users, messages, settings}` triple.
    SetDatabase(Value),
}

/// The replica-channel command vocabulary.
const COMMANDS: &[&str] = &[
    "ping",
    "internal_update",
    "distribute_update",
    "get_database",
    "set_database",
];

impl PeerFrame {
    /// Typed view of a replica-channel envelope.
    pub fn from_envelope(env: &Envelope) -> Result<Self> {
        if !COMMANDS.contains(&env.command.as_str()) {
            return Err(ProtocolError::UnknownCommand(env.command.clone()));
        }
        // `ping` arrives with no data field at all; adjacently-tagged unit
        // variants accept the resulting null.
        let tagged = json!({ "command": env.command, "data": env.data });
        Ok(serde_json::from_value(tagged)?)
    }

    /// Encode into a wire envelope.
    pub fn to_envelope(&self) -> Envelope {
        let (command, data): (&str, Value) = match self {
            Self::Ping => ("ping", Value::Null),
            Self::InternalUpdate { leader } => ("internal_update", json!({"leader": leader})),
            Self::DistributeUpdate(inner) => (
                "distribute_update",
                json!({
                    "version": inner.version,
                    "command": inner.command,
                    "data": inner.data,
                }),
            ),
            Self::GetDatabase { host, port } => {
                ("get_database", json!({"host": host, "port": port}))
            }
            Self::SetDatabase(snapshot) => ("set_database", snapshot.clone()),
        };
        Envelope::new(command, data)
    }

    /// Wire command word, for logging and metrics labels.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::InternalUpdate { .. } => "internal_update",
            Self::DistributeUpdate(_) => "distribute_update",
            Self::GetDatabase { .. } => "get_database",
            Self::SetDatabase(_) => "set_database",
        }
    }
}
