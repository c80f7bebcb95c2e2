//! HTTP server for the Prometheus metrics endpoint.
//!
//! One endpoint per process, shared by all replicas the launcher spawned.

use axum::{Router, routing::get};
use std::net::SocketAddr;

/// Handler for GET /metrics.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Serve `/metrics` on `0.0.0.0:port`. Long-running; spawn in the
/// background.
pub async fn run_http_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Metrics HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind metrics HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Metrics HTTP server error");
    }
}
