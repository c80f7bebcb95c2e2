//! Server replies on the client channel.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

/// One message as listed in a `messages` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    /// Replica-unique message id.
    pub id: u64,
    /// Sending account.
    pub sender: String,
    /// Message body.
    pub message: String,
}

/// A reply on the client channel. Exactly one is written per request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum Reply {
    /// Successful create/login; carries the unread-message count.
    Login {
        /// Account now logged in.
        username: String,
        /// Buffered messages awaiting this account.
        undeliv_messages: u64,
    },
    /// Successful logout or account deletion.
    Logout {},
    /// Home-screen refresh with the unread-message count.
    RefreshHome {
        /// Buffered messages awaiting the requester.
        undeliv_messages: u64,
    },
    /// Usernames matching a search.
    UserList {
        /// Matching usernames; order unspecified.
        user_list: Vec<String>,
    },
    /// Listed or drained messages.
    Messages {
        /// Messages in lane order.
        messages: Vec<DeliveredMessage>,
    },
    /// Any failure, as a human-readable string.
    Error {
        /// What went wrong.
        error: String,
    },
}

/// The reply command vocabulary.
const COMMANDS: &[&str] = &[
    "login",
    "logout",
    "refresh_home",
    "user_list",
    "messages",
    "error",
];

impl Reply {
    /// Typed view of a reply envelope (used by clients).
    pub fn from_envelope(env: &Envelope) -> Result<Self> {
        if !COMMANDS.contains(&env.command.as_str()) {
            return Err(ProtocolError::UnknownCommand(env.command.clone()));
        }
        let tagged = json!({ "command": env.command, "data": env.data });
        Ok(serde_json::from_value(tagged)?)
    }

    /// Encode into a wire envelope.
    pub fn to_envelope(&self) -> Envelope {
        let (command, data): (&str, Value) = match self {
            Self::Login {
                username,
                undeliv_messages,
            } => (
                "login",
                json!({"username": username, "undeliv_messages": undeliv_messages}),
            ),
            Self::Logout {} => ("logout", json!({})),
            Self::RefreshHome { undeliv_messages } => {
                ("refresh_home", json!({"undeliv_messages": undeliv_messages}))
            }
            Self::UserList { user_list } => ("user_list", json!({"user_list": user_list})),
            Self::Messages { messages } => ("messages", json!({"messages": messages})),
            Self::Error { error } => ("error", json!({"error": error})),
        };
        Envelope::new(command, data)
    }

    /// Build an error reply.
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { error: text.into() }
    }
}
