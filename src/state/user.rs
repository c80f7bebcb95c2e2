//! User account records.

use serde::{Deserialize, Serialize};

/// One account.
///
/// The password is an opaque string compared byte-exact; hashing it is a
/// separate design. At most one live session exists per user on a replica,
/// identified by the `host:port` of the owning client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub password: String,
    pub logged_in: bool,
    #[serde(default)]
    pub session_addr: Option<String>,
}

impl User {
    /// A freshly created account, logged in from `session`.
    pub fn new(password: String, session: Option<String>) -> Self {
        Self {
            password,
            logged_in: true,
            session_addr: session,
        }
    }

    /// Bind a live session.
    pub fn begin_session(&mut self, session: Option<String>) {
        self.logged_in = true;
        self.session_addr = session;
    }

    /// Drop the live session, if any.
    pub fn end_session(&mut self) {
        self.logged_in = false;
        self.session_addr = None;
    }
}
