//! Prometheus metrics collection for rchatd.
//!
//! Tracks client traffic, handler failures, replication volume, and cluster
//! health, exposed on an HTTP endpoint for scraping.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Client requests dispatched, by command word.
    pub static ref CLIENT_COMMANDS: IntCounterVec = IntCounterVec::new(
        Opts::new("chat_client_commands_total", "Client commands dispatched"),
        &["command"]
    ).unwrap();

    /// Client requests rejected, by error code.
    pub static ref HANDLER_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("chat_handler_errors_total", "Client commands rejected"),
        &["code"]
    ).unwrap();

    /// Mutations broadcast to peers, by command word.
    pub static ref REPLICATED_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("chat_replicated_sent_total", "Mutations broadcast to peers"),
        &["command"]
    ).unwrap();

    /// Peer-delivered mutations applied, by command word.
    pub static ref REPLICATED_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("chat_replicated_applied_total", "Peer mutations applied"),
        &["command"]
    ).unwrap();

    /// Frames handled on the replica channel, by command word.
    pub static ref PEER_FRAMES: IntCounterVec = IntCounterVec::new(
        Opts::new("chat_peer_frames_total", "Replica-channel frames handled"),
        &["command"]
    ).unwrap();

    /// Snapshot writes through the persistence driver.
    pub static ref SNAPSHOTS_SAVED: IntCounter = IntCounter::new(
        "chat_snapshots_saved_total",
        "Snapshot writes"
    ).unwrap();

    /// Leader elections observed by the sweep.
    pub static ref LEADER_ELECTIONS: IntCounter = IntCounter::new(
        "chat_leader_elections_total",
        "Leader elections"
    ).unwrap();

    /// Currently connected clients.
    pub static ref CLIENT_CONNECTIONS: IntGauge = IntGauge::new(
        "chat_client_connections",
        "Currently connected clients"
    ).unwrap();

    /// Currently reachable peer links.
    pub static ref PEER_LINKS: IntGauge = IntGauge::new(
        "chat_peer_links",
        "Currently reachable peer links"
    ).unwrap();
}

/// Register all metrics. Call once at startup, before serving traffic.
pub fn init() {
    REGISTRY.register(Box::new(CLIENT_COMMANDS.clone())).unwrap();
    REGISTRY.register(Box::new(HANDLER_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(REPLICATED_SENT.clone())).unwrap();
    REGISTRY
        .register(Box::new(REPLICATED_APPLIED.clone()))
        .unwrap();
    REGISTRY.register(Box::new(PEER_FRAMES.clone())).unwrap();
    REGISTRY.register(Box::new(SNAPSHOTS_SAVED.clone())).unwrap();
    REGISTRY
        .register(Box::new(LEADER_ELECTIONS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CLIENT_CONNECTIONS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(PEER_LINKS.clone())).unwrap();
}

/// Gather all metrics in Prometheus text format for the `/metrics` route.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
