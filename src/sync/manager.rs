//! Manages peer connections: the inbound listener, outgoing dialers, and
//! the periodic liveness/election/bootstrap sweep.
//!
//! Every replica dials every configured peer address and *sends* on those
//! outgoing links; whatever arrives - on the inbound listener or on an
//! outgoing link's read pump - is handled by [`PeerFrameHandler`]. A
//! snapshot reply therefore comes back over the serving replica's own
//! outgoing link to the requester, not over the connection the request
//! arrived on.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rchat_proto::{Envelope, FrameCodec, PeerFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::replica::Replica;
use crate::sync::{Endpoint, MembershipView, PeerFrameHandler, Replicator};

/// Liveness/election/bootstrap cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// Outgoing dial deadline; missed dials retry on the next sweep.
const DIAL_TIMEOUT: Duration = Duration::from_secs(1);
/// Write deadline on a peer link; exceeding it drops the connection.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-link send queue depth.
const LINK_QUEUE: usize = 256;

/// One outgoing peer connection's send queue.
#[derive(Clone)]
pub struct PeerLink {
    pub tx: mpsc::Sender<Envelope>,
}

/// Manages replica-to-replica connections and the membership view.
#[derive(Clone)]
pub struct SyncManager {
    self_host: String,
    self_port: u16,
    self_endpoint: Endpoint,
    /// Configured peer address space (host x port-range product).
    configured: Arc<Vec<Endpoint>>,
    /// Live outgoing links, keyed by peer endpoint.
    pub links: Arc<DashMap<Endpoint, PeerLink>>,
    /// Dials currently in flight, so sweeps don't double-connect.
    dialing: Arc<DashSet<Endpoint>>,
    pub membership: Arc<Mutex<MembershipView>>,
    /// Replica-wide shutdown signal; every spawned task watches it so a
    /// stopped replica releases its sockets promptly.
    shutdown: broadcast::Sender<()>,
}

impl SyncManager {
    pub fn new(
        self_host: String,
        self_port: u16,
        configured: Vec<Endpoint>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        let self_endpoint = Endpoint::new(&self_host, self_port);
        Self {
            self_host,
            self_port,
            self_endpoint: self_endpoint.clone(),
            configured: Arc::new(configured),
            links: Arc::new(DashMap::new()),
            dialing: Arc::new(DashSet::new()),
            membership: Arc::new(Mutex::new(MembershipView::new(self_endpoint))),
            shutdown,
        }
    }

    pub fn self_endpoint(&self) -> &Endpoint {
        &self.self_endpoint
    }

    /// A replicator sharing this manager's link table.
    pub fn replicator(&self) -> Replicator {
        Replicator::new(Arc::clone(&self.links))
    }

    /// Accept inbound peer connections and pump their frames until
    /// shutdown. Each connection is read-only from our side.
    pub fn start_inbound(&self, replica: Arc<Replica>, listener: TcpListener) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut shutdown = manager.shutdown.subscribe();
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                debug!(peer = %addr, "Inbound peer connection");
                                let handler = PeerFrameHandler::new(Arc::clone(&replica));
                                let mut conn_shutdown = manager.shutdown.subscribe();
                                tokio::spawn(async move {
                                    let mut framed = Framed::new(stream, FrameCodec::new());
                                    loop {
                                        tokio::select! {
                                            frame = framed.next() => match frame {
                                                Some(Ok(frame)) => handler.handle_bytes(&frame).await,
                                                Some(Err(e)) => {
                                                    warn!(peer = %addr, error = %e, "Peer read error");
                                                    break;
                                                }
                                                None => break,
                                            },
                                            _ = conn_shutdown.recv() => break,
                                        }
                                    }
                                    debug!(peer = %addr, "Inbound peer connection closed");
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to accept peer connection");
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    /// Spawn the periodic liveness/reconnect/election/bootstrap sweep.
    pub fn start_sweep(&self, replica: Arc<Replica>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut shutdown = manager.shutdown.subscribe();
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => manager.sweep(&replica).await,
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    async fn sweep(&self, replica: &Arc<Replica>) {
        // 1. Liveness: ping every link; a closed or backed-up queue means
        //    the link task is gone or wedged.
        let ping = PeerFrame::Ping.to_envelope();
        let mut dead = Vec::new();
        for entry in self.links.iter() {
            if entry.value().tx.try_send(ping.clone()).is_err() {
                dead.push(entry.key().clone());
            }
        }
        for endpoint in dead {
            info!(peer = %endpoint, "Peer link lost");
            self.links.remove(&endpoint);
        }

        // 2. Reconnect: dial every configured address that is neither self
        //    nor already connected.
        for endpoint in self.configured.iter() {
            if *endpoint == self.self_endpoint
                || self.links.contains_key(endpoint)
                || self.dialing.contains(endpoint)
            {
                continue;
            }
            self.connect_to_peer(Arc::clone(replica), endpoint.clone());
        }

        // 3. Leader check over the refreshed reachable set.
        let reachable: BTreeSet<Endpoint> =
            self.links.iter().map(|e| e.key().clone()).collect();
        metrics::PEER_LINKS.set(reachable.len() as i64);
        let (elected, bootstrap_from) = {
            let mut membership = self.membership.lock();
            let elected = membership.observe(reachable);
            (elected, membership.needs_snapshot())
        };
        if let Some(leader) = elected {
            info!(leader = %leader, "Leader elected");
            metrics::LEADER_ELECTIONS.inc();
            let announce = PeerFrame::InternalUpdate {
                leader: leader.as_str().to_string(),
            }
            .to_envelope();
            for entry in self.links.iter() {
                let _ = entry.value().tx.try_send(announce.clone());
            }
        }

        // 4. Snapshot bootstrap from the current leader. Re-sent every
        //    sweep until a set_database lands.
        if let Some(leader) = bootstrap_from {
            if let Some(link) = self.links.get(&leader) {
                debug!(leader = %leader, "Requesting snapshot");
                let request = PeerFrame::GetDatabase {
                    host: self.self_host.clone(),
                    port: self.self_port,
                }
                .to_envelope();
                let _ = link.tx.try_send(request);
            }
        }
    }

    /// Dial one peer in the background. On success the link registers
    /// itself and runs until either side fails; failures retry on the next
    /// sweep.
    fn connect_to_peer(&self, replica: Arc<Replica>, endpoint: Endpoint) {
        if !self.dialing.insert(endpoint.clone()) {
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            let dialed =
                tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(endpoint.as_str())).await;
            manager.dialing.remove(&endpoint);
            let stream = match dialed {
                Ok(Ok(stream)) => stream,
                // Quiet: most configured addresses are simply not running.
                _ => return,
            };
            info!(peer = %endpoint, "Peer link established");
            let (tx, rx) = mpsc::channel(LINK_QUEUE);
            manager.links.insert(endpoint.clone(), PeerLink { tx });
            manager.run_link(replica, endpoint, stream, rx).await;
        });
    }

    /// Drive one outgoing link: drain the send queue and pump inbound
    /// frames (a peer replies to our requests over this same socket only
    /// rarely; mostly the read side just detects EOF).
    async fn run_link(
        &self,
        replica: Arc<Replica>,
        endpoint: Endpoint,
        stream: TcpStream,
        mut rx: mpsc::Receiver<Envelope>,
    ) {
        let mut shutdown = self.shutdown.subscribe();
        let mut framed = Framed::new(stream, FrameCodec::new());
        let handler = PeerFrameHandler::new(replica);
        loop {
            tokio::select! {
                queued = rx.recv() => match queued {
                    Some(envelope) => {
                        match tokio::time::timeout(WRITE_TIMEOUT, framed.send(envelope)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                warn!(peer = %endpoint, error = %e, "Peer write error");
                                break;
                            }
                            Err(_) => {
                                warn!(peer = %endpoint, "Peer write timed out");
                                break;
                            }
                        }
                    }
                    // The sweep reaped this link.
                    None => break,
                },
                frame = framed.next() => match frame {
                    Some(Ok(bytes)) => handler.handle_bytes(&bytes).await,
                    Some(Err(e)) => {
                        warn!(peer = %endpoint, error = %e, "Peer read error");
                        break;
                    }
                    None => {
                        info!(peer = %endpoint, "Peer closed connection");
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }
        self.links.remove(&endpoint);
    }
}
