// Prometheus scrape endpoint for the quota engine
//
// `/metrics` renders the crate registry in text format; `/health` always
// answers 200 so a supervisor can tell the process is serving.

use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::metrics;

/// Router serving `/metrics` and `/health`
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

/// Register the quota collectors and serve the router on every interface
pub async fn start_metrics_server(port: u16) -> Result<()> {
    metrics::init().context("Failed to register quota metrics")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", addr))?;
    info!(%addr, "Serving quota metrics");

    axum::serve(listener, router())
        .await
        .context("Metrics server stopped")
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn render_metrics() -> (StatusCode, String) {
    metrics::gather_metrics().map_or_else(
        |e| {
            error!(error = %e, "Failed to render quota metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        },
        |text| (StatusCode::OK, text),
    )
}
