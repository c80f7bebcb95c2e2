//! Integration test common infrastructure.
//!
//! Spawns in-process replicas and drives them with envelope-speaking test
//! clients.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::spawn_replica;

use std::future::Future;
use std::time::Duration;

/// Poll `check` until it holds or the 15 s deadline passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
