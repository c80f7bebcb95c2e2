//! Best-effort fan-out of accepted mutations to every reachable peer.

use std::sync::Arc;

use dashmap::DashMap;
use rchat_proto::{ClientRequest, PeerFrame};
use tracing::warn;

use crate::metrics;
use crate::sync::{Endpoint, PeerLink};

/// Thin adapter over the peer links: wraps an accepted mutation in
/// `distribute_update` and queues it on every link. No acknowledgement and
/// no cross-peer ordering; each link's queue is FIFO, and a full or closed
/// queue is dropped here and reaped by the next liveness sweep.
#[derive(Clone)]
pub struct Replicator {
    links: Arc<DashMap<Endpoint, PeerLink>>,
}

impl Replicator {
    pub fn new(links: Arc<DashMap<Endpoint, PeerLink>>) -> Self {
        Self { links }
    }

    /// Queue `req` for delivery to every currently reachable peer.
    pub fn broadcast(&self, req: &ClientRequest) {
        let envelope = PeerFrame::DistributeUpdate(req.to_envelope()).to_envelope();
        for entry in self.links.iter() {
            if let Err(e) = entry.value().tx.try_send(envelope.clone()) {
                warn!(peer = %entry.key(), error = %e, "Dropped replicated command");
            }
        }
        metrics::REPLICATED_SENT
            .with_label_values(&[req.command()])
            .inc();
    }
}
