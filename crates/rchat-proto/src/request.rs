//! Client-channel requests.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

/// A request on the client channel.
///
/// Field names follow the wire schema exactly, so the derive handles the
/// `data` payload; see [`ClientRequest::from_envelope`] for the dispatch
/// path from a raw [`Envelope`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Create an account and log it in.
    Create {
        /// Requested account name.
        username: String,
        /// Opaque password string.
        password: String,
    },
    /// Authenticate an existing account.
    Login {
        /// Account name.
        username: String,
        /// Opaque password string.
        password: String,
    },
    /// End the account's session.
    Logout {
        /// Account name.
        username: String,
    },
    /// List usernames matching a shell-style glob.
    Search {
        /// Glob pattern; empty behaves as `*`.
        search: String,
    },
    /// Delete an account and purge its message history.
    DeleteAcct {
        /// Account name.
        username: String,
    },
    /// Send a message to another account.
    SendMsg {
        /// Sending account.
        sender: String,
        /// Receiving account.
        recipient: String,
        /// Opaque message body.
        message: String,
    },
    /// Drain up to `num_messages` buffered messages into the mailbox.
    GetUndelivered {
        /// Receiving account.
        username: String,
        /// Maximum messages to drain.
        num_messages: u64,
    },
    /// Read up to `num_messages` mailbox entries.
    GetDelivered {
        /// Receiving account.
        username: String,
        /// Maximum messages to list.
        num_messages: u64,
    },
    /// Refresh the unread-message counter.
    RefreshHome {
        /// Account name.
        username: String,
    },
    /// Delete mailbox entries by id.
    DeleteMsg {
        /// Owning account.
        current_user: String,
        /// Comma-separated message ids.
        delete_ids: String,
    },
}

/// The client-channel command vocabulary.
const COMMANDS: &[&str] = &[
    "create",
    "login",
    "logout",
    "search",
    "delete_acct",
    "send_msg",
    "get_undelivered",
    "get_delivered",
    "refresh_home",
    "delete_msg",
];

impl ClientRequest {
    /// Typed view of an envelope's command + data.
    ///
    /// Distinguishes an unknown command word from a known command with a bad
    /// payload so the server can log and reply accordingly.
    pub fn from_envelope(env: &Envelope) -> Result<Self> {
        if !COMMANDS.contains(&env.command.as_str()) {
            return Err(ProtocolError::UnknownCommand(env.command.clone()));
        }
        let tagged = json!({ "command": env.command, "data": env.data });
        Ok(serde_json::from_value(tagged)?)
    }

    /// Encode back into an envelope (used by clients and by the replicator,
    /// which nests the mutation envelope inside `distribute_update`).
    pub fn to_envelope(&self) -> Envelope {
        let (command, data): (&str, Value) = match self {
            Self::Create { username, password } => {
                ("create", json!({"username": username, "password": password}))
            }
            Self::Login { username, password } => {
                ("login", json!({"username": username, "password": password}))
            }
            Self::Logout { username } => ("logout", json!({"username": username})),
            Self::Search { search } => ("search", json!({"search": search})),
            Self::DeleteAcct { username } => ("delete_acct", json!({"username": username})),
            Self::SendMsg {
                sender,
                recipient,
                message,
            } => (
                "send_msg",
                json!({"sender": sender, "recipient": recipient, "message": message}),
            ),
            Self::GetUndelivered {
                username,
                num_messages,
            } => (
                "get_undelivered",
                json!({"username": username, "num_messages": num_messages}),
            ),
            Self::GetDelivered {
                username,
                num_messages,
            } => (
                "get_delivered",
                json!({"username": username, "num_messages": num_messages}),
            ),
            Self::RefreshHome { username } => ("refresh_home", json!({"username": username})),
            Self::DeleteMsg {
                current_user,
                delete_ids,
            } => (
                "delete_msg",
                json!({"current_user": current_user, "delete_ids": delete_ids}),
            ),
        };
        Envelope::new(command, data)
    }

    /// Wire command word, for logging and metrics labels.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Login { .. } => "login",
            Self::Logout { .. } => "logout",
            Self::Search { .. } => "search",
            Self::DeleteAcct { .. } => "delete_acct",
            Self::SendMsg { .. } => "send_msg",
            Self::GetUndelivered { .. } => "get_undelivered",
            Self::GetDelivered { .. } => "get_delivered",
            Self::RefreshHome { .. } => "refresh_home",
            Self::DeleteMsg { .. } => "delete_msg",
        }
    }
}
