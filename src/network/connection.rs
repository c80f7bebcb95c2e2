//! Connection - handles an individual client connection.
//!
//! Each connection runs in its own task: a `Framed` loop over the NUL
//! envelope codec, one reply written per decoded request. The connection's
//! peer `host:port` doubles as the session identity; when the socket drops
//! without a logout, whichever user session is bound to it is force-logged
//! out and the logout is replicated.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rchat_proto::{ClientRequest, FrameCodec};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::metrics;
use crate::replica::Replica;

/// A client connection handler.
pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    replica: Arc<Replica>,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr, replica: Arc<Replica>) -> Self {
        Self {
            stream,
            addr,
            replica,
        }
    }

    /// Run the connection read loop until EOF, reset, server shutdown, or a
    /// fatal frame error. Malformed frames are answered and skipped; the
    /// codec has already advanced past them.
    #[instrument(skip(self, shutdown), fields(replica = self.replica.id(), addr = %self.addr), name = "client")]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let endpoint = self.addr.to_string();
        let mut framed = Framed::new(self.stream, FrameCodec::new());
        metrics::CLIENT_CONNECTIONS.inc();
        debug!("Client connected");

        loop {
            tokio::select! {
                incoming = framed.next() => match incoming {
                    Some(Ok(frame)) => {
                        let (reply, broadcast) =
                            self.replica.handle_client_frame(&frame, &endpoint).await;
                        if let Err(e) = framed.send(reply.to_envelope()).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                        // Reply first, then fan out (fire-and-forget).
                        if let Some(req) = broadcast {
                            self.replica.replicate(&req);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                    None => {
                        debug!("Client disconnected");
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        metrics::CLIENT_CONNECTIONS.dec();

        if let Some(username) = self.replica.force_logout_session(&endpoint).await {
            info!(user = %username, "Session dropped without logout");
            self.replica.replicate(&ClientRequest::Logout { username });
        }
    }
}
