//! Membership view and deterministic leader election.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `host:port` string, used both as a connection target and as the
/// identity for election. Ordering is plain lexicographic string order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self(format!("{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Elect the lexicographically smallest endpoint among self and peers.
pub fn elect<'a>(self_endpoint: &'a Endpoint, peers: &'a BTreeSet<Endpoint>) -> Endpoint {
    peers
        .iter()
        .chain(std::iter::once(self_endpoint))
        .min()
        .cloned()
        .unwrap_or_else(|| self_endpoint.clone())
}

/// What this replica currently believes about the cluster.
///
/// Refreshed on every liveness sweep. `loaded_database` stays false until a
/// snapshot from the current leader has been applied; a leader change
/// resets it so the replica re-bootstraps.
#[derive(Debug)]
pub struct MembershipView {
    self_endpoint: Endpoint,
    peers: BTreeSet<Endpoint>,
    leader: Option<Endpoint>,
    loaded_database: bool,
}

impl MembershipView {
    pub fn new(self_endpoint: Endpoint) -> Self {
        Self {
            self_endpoint,
            peers: BTreeSet::new(),
            leader: None,
            loaded_database: false,
        }
    }

    pub fn self_endpoint(&self) -> &Endpoint {
        &self.self_endpoint
    }

    pub fn leader(&self) -> Option<&Endpoint> {
        self.leader.as_ref()
    }

    pub fn loaded_database(&self) -> bool {
        self.loaded_database
    }

    /// A leader snapshot has been applied.
    pub fn mark_loaded(&mut self) {
        self.loaded_database = true;
    }

    /// Accept an informational leader announcement from a peer.
    pub fn set_leader(&mut self, leader: Endpoint) {
        self.leader = Some(leader);
    }

    /// Refresh the reachable set and recompute the leader. On a leader
    /// change the loaded flag resets and the new leader is returned.
    pub fn observe(&mut self, reachable: BTreeSet<Endpoint>) -> Option<Endpoint> {
        self.peers = reachable;
        let elected = elect(&self.self_endpoint, &self.peers);
        if self.leader.as_ref() == Some(&elected) {
            return None;
        }
        self.leader = Some(elected.clone());
        self.loaded_database = false;
        Some(elected)
    }

    /// The leader to pull a snapshot from, when a bootstrap is pending.
    /// The leader itself never pulls.
    pub fn needs_snapshot(&self) -> Option<Endpoint> {
        if self.loaded_database {
            return None;
        }
        match &self.leader {
            Some(leader) if *leader != self.self_endpoint => Some(leader.clone()),
            _ => None,
        }
    }
}
