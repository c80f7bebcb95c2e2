//! One replica: the state machine behind its writer lock, both network
//! endpoints, and the sync machinery, wired together with a broadcast
//! shutdown channel.

use std::sync::Arc;

use anyhow::Context;
use rchat_proto::{ClientRequest, Envelope, ProtocolError, Reply};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use crate::config::ReplicaConfig;
use crate::error::HandlerError;
use crate::metrics;
use crate::network::Gateway;
use crate::state::{ChatState, Snapshot};
use crate::storage::SnapshotStore;
use crate::sync::{Replicator, SyncManager};

/// One server process's worth of chat service: state, client endpoint,
/// peer endpoint, replication.
///
/// The state machine and the persistence write sit behind a single async
/// mutex, so no two operations interleave their mutations and every
/// snapshot reflects the state at the instant a mutation completed.
pub struct Replica {
    config: ReplicaConfig,
    state: Mutex<ChatState>,
    sync: SyncManager,
    replicator: Replicator,
    shutdown_tx: broadcast::Sender<()>,
}

impl Replica {
    /// Load the persisted snapshot and assemble the replica. Does not bind
    /// any sockets yet; see [`Replica::serve`].
    pub async fn new(
        config: ReplicaConfig,
        store: Arc<dyn SnapshotStore>,
    ) -> anyhow::Result<Arc<Self>> {
        let snapshot = store
            .load()
            .await
            .with_context(|| format!("replica {}: failed to load snapshot", config.id))?;
        let mut state = ChatState::from_disk(snapshot, store);
        state.set_listen_addrs(&config.host, config.client_port, config.peer_port);

        let (shutdown_tx, _) = broadcast::channel(8);
        let sync = SyncManager::new(
            config.host.clone(),
            config.peer_port,
            config.peer_space.clone(),
            shutdown_tx.clone(),
        );
        let replicator = sync.replicator();

        Ok(Arc::new(Self {
            config,
            state: Mutex::new(state),
            sync,
            replicator,
            shutdown_tx,
        }))
    }

    pub fn id(&self) -> usize {
        self.config.id
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }

    /// Bind both listeners and spawn the serving tasks. Bind failures are
    /// fatal to the launcher (non-zero exit).
    pub async fn serve(self: Arc<Self>) -> anyhow::Result<()> {
        let client_addr = format!("{}:{}", self.config.host, self.config.client_port);
        let gateway = Gateway::bind(&client_addr, Arc::clone(&self))
            .await
            .with_context(|| format!("failed to bind client listener on {client_addr}"))?;

        let peer_addr = format!("{}:{}", self.config.host, self.config.peer_port);
        let peer_listener = TcpListener::bind(&peer_addr)
            .await
            .with_context(|| format!("failed to bind peer listener on {peer_addr}"))?;
        info!(
            replica = self.config.id,
            client = %client_addr,
            peer = %peer_addr,
            "Replica listening"
        );

        tokio::spawn({
            let shutdown = self.shutdown_tx.subscribe();
            gateway.run(shutdown)
        });
        self.sync.start_inbound(Arc::clone(&self), peer_listener);
        self.sync.start_sweep(Arc::clone(&self));
        Ok(())
    }

    /// A receiver on the replica-wide shutdown channel.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Decode and dispatch one client frame; returns the reply and, for
    /// accepted mutations, the request to hand to the replicator.
    pub async fn handle_client_frame(
        &self,
        frame: &[u8],
        origin: &str,
    ) -> (Reply, Option<ClientRequest>) {
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                return (HandlerError::Malformed.to_reply(), None);
            }
        };
        if envelope.check_version().is_err() {
            return (HandlerError::UnsupportedVersion.to_reply(), None);
        }
        let req = match ClientRequest::from_envelope(&envelope) {
            Ok(req) => req,
            Err(ProtocolError::UnknownCommand(command)) => {
                warn!(%command, "No valid command");
                return (HandlerError::UnknownCommand.to_reply(), None);
            }
            Err(e) => {
                warn!(command = %envelope.command, error = %e, "Malformed request payload");
                return (HandlerError::Malformed.to_reply(), None);
            }
        };
        metrics::CLIENT_COMMANDS
            .with_label_values(&[req.command()])
            .inc();
        let (reply, replicate) = self.state.lock().await.apply_local(&req, origin).await;
        (reply, replicate.then_some(req))
    }

    /// Fire-and-forget fan-out of an accepted mutation.
    pub fn replicate(&self, req: &ClientRequest) {
        self.replicator.broadcast(req);
    }

    /// Apply a peer-delivered mutation (replica-apply mode).
    pub async fn apply_replicated(&self, req: &ClientRequest) {
        self.state.lock().await.apply_replicated(req).await;
    }

    /// Force-logout whichever user session is bound to a dropped client
    /// connection; returns the username for replication.
    pub async fn force_logout_session(&self, endpoint: &str) -> Option<String> {
        self.state.lock().await.logout_session(endpoint).await
    }

    /// Clone the full state triple (serves `get_database`).
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.snapshot()
    }

    /// Overwrite state from a leader snapshot and mark the bootstrap done.
    pub async fn install_snapshot(&self, snapshot: Snapshot) {
        self.state.lock().await.install_snapshot(snapshot).await;
        self.sync.membership.lock().mark_loaded();
        info!(replica = self.config.id, "Snapshot installed from leader");
    }

    /// Stop serving, then write the final snapshot.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.state.lock().await.persist().await {
            warn!(replica = self.config.id, error = %e, "Final snapshot failed");
        }
        info!(replica = self.config.id, "Replica stopped");
    }
}
