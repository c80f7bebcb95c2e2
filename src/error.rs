//! Unified error handling for rchatd.
//!
//! Every client-visible failure is a [`HandlerError`]; the display string is
//! the exact text that goes into the `error` reply, and `error_code()`
//! provides static labels for metrics.

use rchat_proto::Reply;
use thiserror::Error;

/// Errors that can occur while handling a client request.
///
/// Validation errors never mutate state and are never replicated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Username must be alphanumeric")]
    UsernameNotAlphanumeric,

    #[error("Username already exists")]
    UsernameExists,

    #[error("Password cannot be empty")]
    EmptyPassword,

    #[error("Username does not exist")]
    UnknownUser,

    #[error("User already logged in")]
    AlreadyLoggedIn,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Receiver does not exist")]
    UnknownReceiver,

    #[error("Account does not exist")]
    UnknownAccount,

    #[error("No undelivered messages")]
    NoUndelivered,

    #[error("No delivered messages")]
    NoDelivered,

    #[error("Invalid search pattern")]
    BadSearchPattern,

    #[error("Unsupported protocol version")]
    UnsupportedVersion,

    #[error("Malformed request")]
    Malformed,

    #[error("Unknown command")]
    UnknownCommand,

    /// The snapshot write failed after the mutation was applied. The
    /// in-memory state stands; the next successful mutation re-snapshots.
    #[error("Internal server error")]
    Persistence,
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UsernameNotAlphanumeric => "username_not_alphanumeric",
            Self::UsernameExists => "username_exists",
            Self::EmptyPassword => "empty_password",
            Self::UnknownUser => "unknown_user",
            Self::AlreadyLoggedIn => "already_logged_in",
            Self::IncorrectPassword => "incorrect_password",
            Self::UnknownReceiver => "unknown_receiver",
            Self::UnknownAccount => "unknown_account",
            Self::NoUndelivered => "no_undelivered",
            Self::NoDelivered => "no_delivered",
            Self::BadSearchPattern => "bad_search_pattern",
            Self::UnsupportedVersion => "unsupported_version",
            Self::Malformed => "malformed",
            Self::UnknownCommand => "unknown_command",
            Self::Persistence => "persistence",
        }
    }

    /// Convert to the client-visible error reply.
    pub fn to_reply(&self) -> Reply {
        Reply::error(self.to_string())
    }
}

/// Result type for client-request handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(HandlerError::UnknownUser.error_code(), "unknown_user");
        assert_eq!(
            HandlerError::UnsupportedVersion.error_code(),
            "unsupported_version"
        );
    }

    #[test]
    fn reply_text_matches_wire_contract() {
        assert_eq!(
            HandlerError::UnsupportedVersion.to_reply(),
            Reply::error("Unsupported protocol version")
        );
        assert_eq!(
            HandlerError::NoUndelivered.to_reply(),
            Reply::error("No undelivered messages")
        );
    }
}
