//! Replica-to-replica synchronization: membership, liveness sweeps, leader
//! election, command replication, and full-snapshot bootstrap.

mod manager;
mod membership;
mod protocol;
mod replicator;

pub use manager::{PeerLink, SyncManager};
pub use membership::{Endpoint, MembershipView, elect};
pub use protocol::PeerFrameHandler;
pub use replicator::Replicator;
