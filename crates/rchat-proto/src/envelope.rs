//! The `{version, command, data}` envelope shared by both channels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// The protocol version this library speaks.
pub const PROTOCOL_VERSION: i64 = 0;

/// One wire unit: a versioned command with a free-form JSON payload.
///
/// The envelope is deliberately untyped; [`crate::ClientRequest`],
/// [`crate::Reply`] and [`crate::PeerFrame`] provide the typed views. The
/// two-stage decode lets a reader check the version before it commits to a
/// vocabulary, and lets `distribute_update` relay a nested envelope without
/// re-interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version; anything but [`PROTOCOL_VERSION`] is rejected.
    pub version: i64,
    /// Command word; selects the payload schema.
    pub command: String,
    /// Command payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build a current-version envelope.
    pub fn new(command: impl Into<String>, data: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command: command.into(),
            data,
        }
    }

    /// Parse one frame body (the bytes between NUL terminators).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to the JSON form that goes on the wire (without the
    /// trailing NUL; the codec appends it).
    pub fn to_json(&self) -> String {
        // Serialization of (i64, String, Value) cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Reject envelopes from a different protocol version.
    pub fn check_version(&self) -> Result<()> {
        if self.version == PROTOCOL_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedVersion(self.version))
        }
    }
}
