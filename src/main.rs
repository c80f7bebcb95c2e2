//! rchatd launcher - hosts N replicas in one process.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use rchatd::config::LauncherArgs;
use rchatd::replica::Replica;
use rchatd::storage::JsonStore;
use rchatd::{http, metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = LauncherArgs::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    let configs = args.replica_configs()?;
    info!(
        replicas = configs.len(),
        host = %args.host,
        "Starting rchatd"
    );

    // Prometheus metrics are optional; port 0 disables the endpoint.
    if args.metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        let port = args.metrics_port;
        tokio::spawn(async move {
            http::run_http_server(port).await;
        });
    }

    // Bind failures here propagate out as a non-zero exit.
    let mut replicas = Vec::with_capacity(configs.len());
    for config in configs {
        let store = Arc::new(JsonStore::new(&config.data_dir, config.id));
        let replica = Replica::new(config, store).await?;
        Arc::clone(&replica).serve().await?;
        replicas.push(replica);
    }

    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT - initiating graceful shutdown"),
            _ = sigterm.recv() => info!("Received SIGTERM - initiating graceful shutdown"),
        }
    }

    for replica in &replicas {
        replica.shutdown().await;
    }
    // Give in-flight handlers a moment to finish their current operation.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    info!("All replicas stopped");

    Ok(())
}
