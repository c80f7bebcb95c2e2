//! Test replica management.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use rchatd::config::ReplicaConfig;
use rchatd::replica::Replica;
use rchatd::storage::{NullStore, SnapshotStore};
use rchatd::sync::Endpoint;

/// Spawn one in-process replica bound on 127.0.0.1.
///
/// `peer_ports` is the configured peer address space (the replica's own
/// peer port is excluded from dialing automatically).
pub async fn spawn_replica(
    id: usize,
    client_port: u16,
    peer_port: u16,
    peer_ports: &[u16],
    store: Arc<dyn SnapshotStore>,
) -> anyhow::Result<Arc<Replica>> {
    let config = ReplicaConfig {
        id,
        host: "127.0.0.1".to_string(),
        client_port,
        peer_port,
        peer_space: peer_ports
            .iter()
            .map(|port| Endpoint::new("127.0.0.1", *port))
            .collect(),
        data_dir: PathBuf::from("."),
    };
    let replica = Replica::new(config, store).await?;
    Arc::clone(&replica).serve().await?;
    Ok(replica)
}

/// Spawn a standalone replica with no peers and no persistence.
pub async fn spawn_single(client_port: u16, peer_port: u16) -> anyhow::Result<Arc<Replica>> {
    spawn_replica(0, client_port, peer_port, &[peer_port], Arc::new(NullStore)).await
}
