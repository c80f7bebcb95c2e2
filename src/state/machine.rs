//! The chat state machine.
//!
//! Operations come in two flavors. `apply_local` is driven by a client
//! request: it validates, mutates, persists, and returns the reply plus
//! whether the command should be broadcast to peers. `apply_replicated` is
//! driven by a peer-delivered command: no validation, no reply, no
//! re-broadcast. Both funnel into the same private mutation core, and every
//! accepted mutation writes a full snapshot before the operation completes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glob::Pattern;
use rchat_proto::{ClientRequest, DeliveredMessage, Reply};
use tracing::warn;

use crate::error::{HandlerError, HandlerResult};
use crate::metrics;
use crate::state::{Lanes, Settings, Snapshot, StoredMessage, User};
use crate::storage::SnapshotStore;

/// Whether an accepted command must also be applied by peers.
///
/// Reads stay local. `get_undelivered` replicates because the drain moves
/// messages between lanes; `get_delivered` does not because it reads only.
pub fn replicates(req: &ClientRequest) -> bool {
    matches!(
        req,
        ClientRequest::Create { .. }
            | ClientRequest::Login { .. }
            | ClientRequest::Logout { .. }
            | ClientRequest::DeleteAcct { .. }
            | ClientRequest::SendMsg { .. }
            | ClientRequest::DeleteMsg { .. }
            | ClientRequest::GetUndelivered { .. }
    )
}

/// What a locally dispatched operation produced.
struct Outcome {
    reply: Reply,
    mutated: bool,
}

impl Outcome {
    fn read(reply: Reply) -> Self {
        Self {
            reply,
            mutated: false,
        }
    }

    fn write(reply: Reply) -> Self {
        Self {
            reply,
            mutated: true,
        }
    }
}

/// The authoritative in-memory database of one replica.
///
/// Exclusively owns the user table, both lanes, and the id counter. All
/// access is serialized by the replica-wide lock in [`crate::replica::Replica`].
pub struct ChatState {
    users: HashMap<String, User>,
    lanes: Lanes,
    settings: Settings,
    store: Arc<dyn SnapshotStore>,
}

impl ChatState {
    /// Boot from a loaded snapshot.
    ///
    /// Sessions do not survive restart: every user is reset to logged-out
    /// before the machine serves traffic.
    pub fn from_disk(mut snapshot: Snapshot, store: Arc<dyn SnapshotStore>) -> Self {
        for user in snapshot.users.values_mut() {
            user.end_session();
        }
        Self {
            users: snapshot.users,
            lanes: snapshot.messages,
            settings: snapshot.settings,
            store,
        }
    }

    /// Record the launch-time listen addresses in the settings blob.
    pub fn set_listen_addrs(&mut self, host: &str, client_port: u16, peer_port: u16) {
        self.settings.host = host.to_string();
        self.settings.port = client_port;
        self.settings.host_json = host.to_string();
        self.settings.port_json = peer_port;
    }

    /// Clone the full `{users, messages, settings}` triple.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            users: self.users.clone(),
            messages: self.lanes.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Overwrite local state with a leader snapshot and persist it.
    pub async fn install_snapshot(&mut self, snapshot: Snapshot) {
        self.users = snapshot.users;
        self.lanes = snapshot.messages;
        self.settings = snapshot.settings;
        if let Err(e) = self.persist().await {
            warn!(error = %e, "Snapshot write failed after state transfer");
        }
    }

    /// Write the current state through the persistence driver.
    pub async fn persist(&self) -> Result<(), crate::storage::StorageError> {
        self.store
            .save(&self.users, &self.lanes, &self.settings)
            .await?;
        metrics::SNAPSHOTS_SAVED.inc();
        Ok(())
    }

    /// Origin-apply: validate, mutate, persist.
    ///
    /// Returns the reply for the client and whether the request should be
    /// handed to the replicator. `origin` is the `host:port` of the client
    /// connection and becomes the session address on create/login.
    pub async fn apply_local(&mut self, req: &ClientRequest, origin: &str) -> (Reply, bool) {
        match self.dispatch_local(req, origin) {
            Ok(outcome) => {
                if outcome.mutated {
                    if let Err(e) = self.persist().await {
                        warn!(error = %e, command = req.command(), "Snapshot write failed");
                        // The in-memory mutation stands and still replicates;
                        // the next successful mutation re-snapshots.
                        return (HandlerError::Persistence.to_reply(), replicates(req));
                    }
                }
                (outcome.reply, outcome.mutated && replicates(req))
            }
            Err(err) => {
                metrics::HANDLER_ERRORS
                    .with_label_values(&[err.error_code()])
                    .inc();
                (err.to_reply(), false)
            }
        }
    }

    /// Replica-apply: skip validation, skip reply, skip re-broadcast.
    pub async fn apply_replicated(&mut self, req: &ClientRequest) {
        match req {
            ClientRequest::Create { username, password } => {
                self.create_user(username, password, None);
            }
            ClientRequest::Login { username, .. } => {
                if let Some(user) = self.users.get_mut(username.as_str()) {
                    user.begin_session(None);
                }
            }
            ClientRequest::Logout { username } => {
                if let Some(user) = self.users.get_mut(username.as_str()) {
                    user.end_session();
                }
            }
            ClientRequest::DeleteAcct { username } => {
                self.users.remove(username.as_str());
                self.lanes.purge_account(username);
            }
            ClientRequest::SendMsg {
                sender,
                recipient,
                message,
            } => {
                self.enqueue_message(sender, recipient, message);
            }
            ClientRequest::DeleteMsg {
                current_user,
                delete_ids,
            } => {
                self.delete_messages(current_user, delete_ids);
            }
            ClientRequest::GetUndelivered {
                username,
                num_messages,
            } => {
                self.drain_undelivered(username, *num_messages);
            }
            other => {
                warn!(command = other.command(), "Ignoring non-replicable command from peer");
                return;
            }
        }
        metrics::REPLICATED_APPLIED
            .with_label_values(&[req.command()])
            .inc();
        if let Err(e) = self.persist().await {
            warn!(error = %e, command = req.command(), "Snapshot write failed on replica-apply");
        }
    }

    fn dispatch_local(&mut self, req: &ClientRequest, origin: &str) -> HandlerResult<Outcome> {
        match req {
            ClientRequest::Create { username, password } => self.create(username, password, origin),
            ClientRequest::Login { username, password } => self.login(username, password, origin),
            ClientRequest::Logout { username } => self.logout(username),
            ClientRequest::Search { search } => self.search(search),
            ClientRequest::DeleteAcct { username } => self.delete_account(username),
            ClientRequest::SendMsg {
                sender,
                recipient,
                message,
            } => self.send_message(sender, recipient, message),
            ClientRequest::GetUndelivered {
                username,
                num_messages,
            } => self.get_undelivered(username, *num_messages),
            ClientRequest::GetDelivered {
                username,
                num_messages,
            } => self.get_delivered(username, *num_messages),
            ClientRequest::RefreshHome { username } => Ok(Outcome::read(Reply::RefreshHome {
                undeliv_messages: self.lanes.undelivered_count_for(username),
            })),
            ClientRequest::DeleteMsg {
                current_user,
                delete_ids,
            } => {
                self.delete_messages(current_user, delete_ids);
                Ok(Outcome::write(Reply::RefreshHome {
                    undeliv_messages: self.lanes.undelivered_count_for(current_user),
                }))
            }
        }
    }

    fn create(&mut self, username: &str, password: &str, origin: &str) -> HandlerResult<Outcome> {
        let username = username.trim();
        let password = password.trim();
        if username.is_empty() || !username.chars().all(char::is_alphanumeric) {
            return Err(HandlerError::UsernameNotAlphanumeric);
        }
        if self.users.contains_key(username) {
            return Err(HandlerError::UsernameExists);
        }
        if password.is_empty() {
            return Err(HandlerError::EmptyPassword);
        }
        self.create_user(username, password, Some(origin.to_string()));
        Ok(Outcome::write(Reply::Login {
            username: username.to_string(),
            undeliv_messages: 0,
        }))
    }

    fn login(&mut self, username: &str, password: &str, origin: &str) -> HandlerResult<Outcome> {
        let user = self.users.get(username).ok_or(HandlerError::UnknownUser)?;
        if user.logged_in {
            return Err(HandlerError::AlreadyLoggedIn);
        }
        if user.password != password {
            return Err(HandlerError::IncorrectPassword);
        }
        let undeliv_messages = self.lanes.undelivered_count_for(username);
        if let Some(user) = self.users.get_mut(username) {
            user.begin_session(Some(origin.to_string()));
        }
        Ok(Outcome::write(Reply::Login {
            username: username.to_string(),
            undeliv_messages,
        }))
    }

    fn logout(&mut self, username: &str) -> HandlerResult<Outcome> {
        let user = self
            .users
            .get_mut(username)
            .ok_or(HandlerError::UnknownUser)?;
        user.end_session();
        Ok(Outcome::write(Reply::Logout {}))
    }

    fn search(&self, pattern: &str) -> HandlerResult<Outcome> {
        let pattern = if pattern.is_empty() { "*" } else { pattern };
        let matcher = Pattern::new(pattern).map_err(|_| HandlerError::BadSearchPattern)?;
        let user_list = self
            .users
            .keys()
            .filter(|name| matcher.matches(name))
            .cloned()
            .collect();
        Ok(Outcome::read(Reply::UserList { user_list }))
    }

    fn delete_account(&mut self, username: &str) -> HandlerResult<Outcome> {
        if self.users.remove(username).is_none() {
            return Err(HandlerError::UnknownAccount);
        }
        self.lanes.purge_account(username);
        Ok(Outcome::write(Reply::Logout {}))
    }

    fn send_message(
        &mut self,
        sender: &str,
        recipient: &str,
        message: &str,
    ) -> HandlerResult<Outcome> {
        if !self.users.contains_key(recipient) {
            return Err(HandlerError::UnknownReceiver);
        }
        self.enqueue_message(sender, recipient, message);
        Ok(Outcome::write(Reply::RefreshHome {
            undeliv_messages: self.lanes.undelivered_count_for(sender),
        }))
    }

    fn get_undelivered(&mut self, username: &str, num_messages: u64) -> HandlerResult<Outcome> {
        if num_messages == 0 {
            return Ok(Outcome::read(Reply::Messages {
                messages: Vec::new(),
            }));
        }
        let messages = self.drain_undelivered(username, num_messages);
        if messages.is_empty() {
            return Err(HandlerError::NoUndelivered);
        }
        Ok(Outcome::write(Reply::Messages { messages }))
    }

    fn get_delivered(&self, username: &str, num_messages: u64) -> HandlerResult<Outcome> {
        let messages: Vec<DeliveredMessage> = self
            .lanes
            .delivered
            .iter()
            .filter(|m| m.receiver == username)
            .take(num_messages as usize)
            .map(|m| DeliveredMessage {
                id: m.id,
                sender: m.sender.clone(),
                message: m.message.clone(),
            })
            .collect();
        if num_messages > 0 && messages.is_empty() {
            return Err(HandlerError::NoDelivered);
        }
        Ok(Outcome::read(Reply::Messages { messages }))
    }

    // ------------------------------------------------------------------
    // Shared mutation core (origin-apply and replica-apply)
    // ------------------------------------------------------------------

    fn create_user(&mut self, username: &str, password: &str, session: Option<String>) {
        self.users.insert(
            username.trim().to_string(),
            User::new(password.trim().to_string(), session),
        );
    }

    /// Assign the next id and append to the lane matching the receiver's
    /// presence. An unknown receiver (possible on replica-apply when
    /// commands race account deletion) buffers as undelivered.
    fn enqueue_message(&mut self, sender: &str, recipient: &str, message: &str) {
        self.settings.counter += 1;
        // An embedded NUL would collide with frame terminators downstream.
        let body = message.replace('\0', "NULL");
        let msg = StoredMessage {
            id: self.settings.counter,
            sender: sender.to_string(),
            receiver: recipient.to_string(),
            message: body,
        };
        let online = self
            .users
            .get(recipient)
            .map(|u| u.logged_in)
            .unwrap_or(false);
        if online {
            self.lanes.delivered.push(msg);
        } else {
            self.lanes.undelivered.push(msg);
        }
    }

    /// Move up to `quota` of the user's buffered messages into the mailbox,
    /// preserving lane order on both sides.
    fn drain_undelivered(&mut self, username: &str, mut quota: u64) -> Vec<DeliveredMessage> {
        let mut drained = Vec::new();
        let mut kept = Vec::with_capacity(self.lanes.undelivered.len());
        for msg in std::mem::take(&mut self.lanes.undelivered) {
            if quota > 0 && msg.receiver == username {
                quota -= 1;
                drained.push(DeliveredMessage {
                    id: msg.id,
                    sender: msg.sender.clone(),
                    message: msg.message.clone(),
                });
                self.lanes.delivered.push(msg);
            } else {
                kept.push(msg);
            }
        }
        self.lanes.undelivered = kept;
        drained
    }

    /// Remove mailbox entries owned by `username` whose id is listed.
    /// Foreign ids and unparsable tokens match nothing.
    fn delete_messages(&mut self, username: &str, delete_ids: &str) {
        let ids: HashSet<u64> = delete_ids
            .split(',')
            .filter_map(|tok| tok.trim().parse().ok())
            .collect();
        self.lanes
            .delivered
            .retain(|m| !(ids.contains(&m.id) && m.receiver == username));
    }

    /// Force-logout whichever user owns a session on `endpoint`.
    ///
    /// Called when a client connection drops without a logout. Returns the
    /// username so the caller can replicate the logout.
    pub async fn logout_session(&mut self, endpoint: &str) -> Option<String> {
        let username = self
            .users
            .iter()
            .find(|(_, u)| u.session_addr.as_deref() == Some(endpoint))
            .map(|(name, _)| name.clone())?;
        if let Some(user) = self.users.get_mut(&username) {
            user.end_session();
        }
        if let Err(e) = self.persist().await {
            warn!(error = %e, "Snapshot write failed after session drop");
        }
        Some(username)
    }

    // Test and introspection helpers.

    /// Buffered-message count for one receiver.
    pub fn undelivered_count_for(&self, username: &str) -> u64 {
        self.lanes.undelivered_count_for(username)
    }

    /// Look up a user record.
    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    /// Current id counter.
    pub fn counter(&self) -> u64 {
        self.settings.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NullStore;

    fn fresh() -> ChatState {
        ChatState::from_disk(Snapshot::default(), Arc::new(NullStore))
    }

    async fn create(state: &mut ChatState, name: &str) {
        let (reply, _) = state
            .apply_local(
                &ClientRequest::Create {
                    username: name.into(),
                    password: "pw".into(),
                },
                "127.0.0.1:9000",
            )
            .await;
        assert!(matches!(reply, Reply::Login { .. }), "create failed: {reply:?}");
    }

    async fn logout(state: &mut ChatState, name: &str) {
        let (reply, _) = state
            .apply_local(
                &ClientRequest::Logout {
                    username: name.into(),
                },
                "127.0.0.1:9000",
            )
            .await;
        assert_eq!(reply, Reply::Logout {});
    }

    async fn send(state: &mut ChatState, from: &str, to: &str, body: &str) -> Reply {
        state
            .apply_local(
                &ClientRequest::SendMsg {
                    sender: from.into(),
                    recipient: to.into(),
                    message: body.into(),
                },
                "127.0.0.1:9000",
            )
            .await
            .0
    }

    #[tokio::test]
    async fn create_auto_logs_in() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        let user = state.user("alice").unwrap();
        assert!(user.logged_in);
        assert_eq!(user.session_addr.as_deref(), Some("127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn create_validation() {
        let mut state = fresh();
        let bad = [
            ("al ice", "pw", HandlerError::UsernameNotAlphanumeric),
            ("", "pw", HandlerError::UsernameNotAlphanumeric),
            ("alice", "   ", HandlerError::EmptyPassword),
        ];
        for (name, pw, err) in bad {
            let (reply, replicate) = state
                .apply_local(
                    &ClientRequest::Create {
                        username: name.into(),
                        password: pw.into(),
                    },
                    "c",
                )
                .await;
            assert_eq!(reply, err.to_reply());
            assert!(!replicate);
        }

        create(&mut state, "alice").await;
        let (reply, _) = state
            .apply_local(
                &ClientRequest::Create {
                    username: "alice".into(),
                    password: "other".into(),
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::UsernameExists.to_reply());
    }

    #[tokio::test]
    async fn login_error_precedence() {
        let mut state = fresh();
        create(&mut state, "alice").await;

        // Still logged in from create.
        let (reply, _) = state
            .apply_local(
                &ClientRequest::Login {
                    username: "alice".into(),
                    password: "wrong".into(),
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::AlreadyLoggedIn.to_reply());

        logout(&mut state, "alice").await;
        let (reply, _) = state
            .apply_local(
                &ClientRequest::Login {
                    username: "alice".into(),
                    password: "wrong".into(),
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::IncorrectPassword.to_reply());

        let (reply, _) = state
            .apply_local(
                &ClientRequest::Login {
                    username: "nobody".into(),
                    password: "pw".into(),
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::UnknownUser.to_reply());
    }

    #[tokio::test]
    async fn offline_delivery_and_drain_once() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        logout(&mut state, "bob").await;

        let reply = send(&mut state, "alice", "bob", "hi").await;
        assert_eq!(reply, Reply::RefreshHome { undeliv_messages: 0 });
        assert_eq!(state.undelivered_count_for("bob"), 1);

        // Login reply carries the buffered count.
        let (reply, _) = state
            .apply_local(
                &ClientRequest::Login {
                    username: "bob".into(),
                    password: "pw".into(),
                },
                "c",
            )
            .await;
        assert_eq!(
            reply,
            Reply::Login {
                username: "bob".into(),
                undeliv_messages: 1
            }
        );

        let (reply, replicate) = state
            .apply_local(
                &ClientRequest::GetUndelivered {
                    username: "bob".into(),
                    num_messages: 5,
                },
                "c",
            )
            .await;
        assert!(replicate, "a drain mutates and must replicate");
        assert_eq!(
            reply,
            Reply::Messages {
                messages: vec![DeliveredMessage {
                    id: 1,
                    sender: "alice".into(),
                    message: "hi".into(),
                }]
            }
        );
        assert_eq!(state.undelivered_count_for("bob"), 0);

        // A second drain finds nothing.
        let (reply, replicate) = state
            .apply_local(
                &ClientRequest::GetUndelivered {
                    username: "bob".into(),
                    num_messages: 5,
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::NoUndelivered.to_reply());
        assert!(!replicate);
    }

    #[tokio::test]
    async fn online_delivery_skips_the_buffer() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;

        send(&mut state, "alice", "bob", "hi").await;
        assert_eq!(state.undelivered_count_for("bob"), 0);
        let (reply, _) = state
            .apply_local(
                &ClientRequest::GetDelivered {
                    username: "bob".into(),
                    num_messages: 5,
                },
                "c",
            )
            .await;
        assert_eq!(
            reply,
            Reply::Messages {
                messages: vec![DeliveredMessage {
                    id: 1,
                    sender: "alice".into(),
                    message: "hi".into(),
                }]
            }
        );
    }

    #[tokio::test]
    async fn send_to_unknown_receiver_is_rejected_without_id_burn() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        let reply = send(&mut state, "alice", "ghost", "hi").await;
        assert_eq!(reply, HandlerError::UnknownReceiver.to_reply());
        assert_eq!(state.counter(), 0);
    }

    #[tokio::test]
    async fn empty_body_and_nul_normalization() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;

        send(&mut state, "alice", "bob", "").await;
        send(&mut state, "alice", "bob", "a\0b").await;
        let (reply, _) = state
            .apply_local(
                &ClientRequest::GetDelivered {
                    username: "bob".into(),
                    num_messages: 10,
                },
                "c",
            )
            .await;
        match reply {
            Reply::Messages { messages } => {
                assert_eq!(messages[0].message, "");
                assert_eq!(messages[1].message, "aNULLb");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn drain_zero_is_an_empty_read() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        logout(&mut state, "bob").await;
        send(&mut state, "alice", "bob", "hi").await;

        let (reply, replicate) = state
            .apply_local(
                &ClientRequest::GetUndelivered {
                    username: "bob".into(),
                    num_messages: 0,
                },
                "c",
            )
            .await;
        assert_eq!(reply, Reply::Messages { messages: vec![] });
        assert!(!replicate);
        assert_eq!(state.undelivered_count_for("bob"), 1);
    }

    #[tokio::test]
    async fn drain_respects_quota_and_order() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        logout(&mut state, "bob").await;
        for body in ["one", "two", "three"] {
            send(&mut state, "alice", "bob", body).await;
        }

        let (reply, _) = state
            .apply_local(
                &ClientRequest::GetUndelivered {
                    username: "bob".into(),
                    num_messages: 2,
                },
                "c",
            )
            .await;
        match reply {
            Reply::Messages { messages } => {
                let bodies: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
                assert_eq!(bodies, vec!["one", "two"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(state.undelivered_count_for("bob"), 1);
    }

    #[tokio::test]
    async fn delete_messages_is_scoped_and_idempotent() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        send(&mut state, "alice", "bob", "for bob").await; // id 1, delivered
        send(&mut state, "bob", "alice", "for alice").await; // id 2, delivered

        // bob cannot delete alice's mailbox entry.
        let del = ClientRequest::DeleteMsg {
            current_user: "bob".into(),
            delete_ids: "1,2,junk".into(),
        };
        state.apply_local(&del, "c").await;
        let (reply, _) = state
            .apply_local(
                &ClientRequest::GetDelivered {
                    username: "alice".into(),
                    num_messages: 5,
                },
                "c",
            )
            .await;
        assert!(matches!(reply, Reply::Messages { ref messages } if messages.len() == 1));

        // Applying the same delete again is a no-op.
        state.apply_local(&del, "c").await;
        let (reply, _) = state
            .apply_local(
                &ClientRequest::GetDelivered {
                    username: "bob".into(),
                    num_messages: 5,
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::NoDelivered.to_reply());
    }

    #[tokio::test]
    async fn delete_account_purges_history() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        send(&mut state, "alice", "bob", "hi").await;

        let (reply, replicate) = state
            .apply_local(
                &ClientRequest::DeleteAcct {
                    username: "alice".into(),
                },
                "c",
            )
            .await;
        assert_eq!(reply, Reply::Logout {});
        assert!(replicate);
        assert!(state.user("alice").is_none());
        let (reply, _) = state
            .apply_local(
                &ClientRequest::GetDelivered {
                    username: "bob".into(),
                    num_messages: 5,
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::NoDelivered.to_reply());

        let (reply, _) = state
            .apply_local(
                &ClientRequest::DeleteAcct {
                    username: "alice".into(),
                },
                "c",
            )
            .await;
        assert_eq!(reply, HandlerError::UnknownAccount.to_reply());
    }

    #[tokio::test]
    async fn search_globs() {
        let mut state = fresh();
        for name in ["alice", "alicia", "bob"] {
            create(&mut state, name).await;
        }
        let cases = [
            ("ali*", vec!["alice", "alicia"]),
            ("", vec!["alice", "alicia", "bob"]),
            ("?ob", vec!["bob"]),
            ("alic[ei]*", vec!["alice", "alicia"]),
            ("zzz", vec![]),
        ];
        for (pattern, expected) in cases {
            let (reply, _) = state
                .apply_local(
                    &ClientRequest::Search {
                        search: pattern.into(),
                    },
                    "c",
                )
                .await;
            match reply {
                Reply::UserList { mut user_list } => {
                    user_list.sort();
                    assert_eq!(user_list, expected, "pattern {pattern:?}");
                }
                other => panic!("unexpected reply: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn session_drop_force_logs_out() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        assert_eq!(
            state.logout_session("127.0.0.1:9000").await.as_deref(),
            Some("alice")
        );
        let user = state.user("alice").unwrap();
        assert!(!user.logged_in);
        assert!(user.session_addr.is_none());
        assert!(state.logout_session("127.0.0.1:9000").await.is_none());
    }

    #[tokio::test]
    async fn replica_apply_mirrors_mutations_without_replies() {
        let mut origin = fresh();
        let mut follower = fresh();

        let ops = vec![
            ClientRequest::Create {
                username: "alice".into(),
                password: "pw".into(),
            },
            ClientRequest::Create {
                username: "bob".into(),
                password: "pw".into(),
            },
            ClientRequest::Logout {
                username: "bob".into(),
            },
            ClientRequest::SendMsg {
                sender: "alice".into(),
                recipient: "bob".into(),
                message: "hi".into(),
            },
        ];
        for op in &ops {
            let (_, replicate) = origin.apply_local(op, "127.0.0.1:9000").await;
            assert!(replicate);
            follower.apply_replicated(op).await;
        }

        assert_eq!(follower.counter(), origin.counter());
        assert_eq!(
            follower.undelivered_count_for("bob"),
            origin.undelivered_count_for("bob")
        );
        // Replicated sessions carry no client endpoint.
        assert!(follower.user("alice").unwrap().logged_in);
        assert!(follower.user("alice").unwrap().session_addr.is_none());

        // The drain replicates too, converging the lanes.
        let drain = ClientRequest::GetUndelivered {
            username: "bob".into(),
            num_messages: 1,
        };
        origin.apply_local(&drain, "c").await;
        follower.apply_replicated(&drain).await;
        assert_eq!(follower.undelivered_count_for("bob"), 0);
        assert_eq!(follower.snapshot().messages, origin.snapshot().messages);
    }

    #[tokio::test]
    async fn replica_apply_ignores_reads() {
        let mut state = fresh();
        state
            .apply_replicated(&ClientRequest::Search { search: "*".into() })
            .await;
        state
            .apply_replicated(&ClientRequest::GetDelivered {
                username: "bob".into(),
                num_messages: 1,
            })
            .await;
        assert_eq!(state.counter(), 0);
    }

    #[tokio::test]
    async fn snapshot_reload_resets_sessions_only() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        logout(&mut state, "bob").await;
        send(&mut state, "alice", "bob", "hi").await;

        let snapshot = state.snapshot();
        let reloaded = ChatState::from_disk(snapshot.clone(), Arc::new(NullStore));
        assert!(!reloaded.user("alice").unwrap().logged_in);
        assert!(reloaded.user("alice").unwrap().session_addr.is_none());
        assert_eq!(reloaded.counter(), state.counter());
        assert_eq!(reloaded.snapshot().messages, snapshot.messages);
    }

    #[tokio::test]
    async fn message_ids_stay_unique_and_bounded_by_counter() {
        let mut state = fresh();
        create(&mut state, "alice").await;
        create(&mut state, "bob").await;
        for _ in 0..5 {
            send(&mut state, "alice", "bob", "x").await;
        }
        let snapshot = state.snapshot();
        let mut seen = HashSet::new();
        for m in snapshot
            .messages
            .delivered
            .iter()
            .chain(snapshot.messages.undelivered.iter())
        {
            assert!(m.id <= state.counter());
            assert!(seen.insert(m.id), "duplicate id {}", m.id);
        }
    }
}
