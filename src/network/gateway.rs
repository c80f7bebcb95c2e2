//! Gateway - TCP listener that accepts incoming client connections.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::network::Connection;
use crate::replica::Replica;

/// The Gateway accepts incoming TCP connections and spawns a handler task
/// per client.
pub struct Gateway {
    listener: TcpListener,
    replica: Arc<Replica>,
}

impl Gateway {
    /// Bind the gateway to the replica's client address.
    pub async fn bind(addr: &str, replica: Arc<Replica>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Gateway listening");
        Ok(Self { listener, replica })
    }

    /// Accept connections until shutdown. In-flight handlers finish their
    /// current operation on their own tasks.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let replica = Arc::clone(&self.replica);
                            let shutdown = replica.subscribe_shutdown();
                            tokio::spawn(async move {
                                Connection::new(stream, addr, replica).run(shutdown).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Gateway stopping");
                    break;
                }
            }
        }
    }
}
