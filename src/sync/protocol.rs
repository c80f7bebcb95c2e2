//! Replica-channel frame handling.
//!
//! Drift tolerance: a peer speaking a newer vocabulary must not take this
//! replica down, so every failure path here logs and returns.

use std::sync::Arc;

use rchat_proto::{ClientRequest, Envelope, PeerFrame};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::replica::Replica;
use crate::state::{Snapshot, replicates};
use crate::sync::Endpoint;

/// Handles frames arriving on the replica channel, whether over the
/// inbound listener or an outgoing link's read pump.
pub struct PeerFrameHandler {
    replica: Arc<Replica>,
}

impl PeerFrameHandler {
    pub fn new(replica: Arc<Replica>) -> Self {
        Self { replica }
    }

    /// Decode one raw frame and dispatch it.
    pub async fn handle_bytes(&self, bytes: &[u8]) {
        let envelope = match Envelope::parse(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Malformed peer frame");
                return;
            }
        };
        if envelope.check_version().is_err() {
            warn!(version = envelope.version, "Peer frame from unsupported version");
            return;
        }
        match PeerFrame::from_envelope(&envelope) {
            Ok(frame) => self.handle(frame).await,
            Err(e) => warn!(error = %e, "Unhandled peer frame"),
        }
    }

    /// Dispatch one decoded frame.
    pub async fn handle(&self, frame: PeerFrame) {
        metrics::PEER_FRAMES
            .with_label_values(&[frame.command()])
            .inc();
        match frame {
            PeerFrame::Ping => {}

            PeerFrame::InternalUpdate { leader } => {
                debug!(leader = %leader, "Leader announcement");
                self.replica
                    .sync()
                    .membership
                    .lock()
                    .set_leader(Endpoint::from(leader));
            }

            PeerFrame::DistributeUpdate(inner) => {
                if inner.check_version().is_err() {
                    warn!(version = inner.version, "Replicated command from unsupported version");
                    return;
                }
                match ClientRequest::from_envelope(&inner) {
                    Ok(req) if replicates(&req) => {
                        self.replica.apply_replicated(&req).await;
                    }
                    Ok(req) => {
                        // Reads have no business on the replica channel.
                        warn!(command = req.command(), "Refusing to replica-apply a read");
                    }
                    Err(e) => warn!(error = %e, "Bad replicated command"),
                }
            }

            PeerFrame::GetDatabase { host, port } => {
                let requester = Endpoint::new(&host, port);
                let snapshot = self.replica.snapshot().await;
                let payload = match serde_json::to_value(&snapshot) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Snapshot serialization failed");
                        return;
                    }
                };
                // The reply rides our own outgoing link to the requester.
                match self.replica.sync().links.get(&requester) {
                    Some(link) => {
                        info!(peer = %requester, "Serving snapshot");
                        let _ = link
                            .tx
                            .try_send(PeerFrame::SetDatabase(payload).to_envelope());
                    }
                    None => warn!(peer = %requester, "No link to snapshot requester"),
                }
            }

            PeerFrame::SetDatabase(payload) => match serde_json::from_value::<Snapshot>(payload) {
                Ok(snapshot) => self.replica.install_snapshot(snapshot).await,
                Err(e) => warn!(error = %e, "Bad snapshot payload"),
            },
        }
    }
}
