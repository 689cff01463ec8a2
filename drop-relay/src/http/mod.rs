//! HTTP endpoints for codedrop-relay.
//!
//! Hosts the WebSocket upgrade path alongside health and metrics endpoints.

pub mod health;
mod metrics;

use crate::protocol::{ws_handler, WsRelay};
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<WsRelay>) -> Router {
    let config = relay.config();
    let ws_path = normalize_path(&config.server.ws_path);

    let mut router = Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health::health_handler));
    if config.http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
