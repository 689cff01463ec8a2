//! Health check endpoint.

use crate::protocol::WsRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of open WebSocket connections.
    pub connections: usize,
    /// Slots open for claiming.
    pub free_slots: usize,
    /// Slots awaiting a receiver or paired.
    pub allocated_slots: usize,
    /// Slots with a transfer in progress.
    pub paired_slots: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(relay): Extension<Arc<WsRelay>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);
    let stats = relay.stats();

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: relay.active_connections(),
        free_slots: stats.free,
        allocated_slots: stats.allocated,
        paired_slots: stats.paired,
        uptime_seconds: uptime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::ChannelTransport;
    use drop_types::CODE_SPACE_SIZE;

    #[test]
    fn health_status_serializes() {
        let status = HealthStatus {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            connections: 42,
            free_slots: 100,
            allocated_slots: 3,
            paired_slots: 1,
            uptime_seconds: 3600,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"connections\":42"));
        assert!(json.contains("\"paired_slots\":1"));
    }

    #[tokio::test]
    async fn handler_reports_slot_counts() {
        let relay = Arc::new(WsRelay::new(
            Config::default(),
            Arc::new(ChannelTransport::new()),
        ));
        relay.pairing().claim(drop_types::ConnId::random()).unwrap();

        let Json(status) = health_handler(Extension(relay)).await;
        assert_eq!(status.status, "ok");
        assert_eq!(status.allocated_slots, 1);
        assert_eq!(status.free_slots, CODE_SPACE_SIZE - 1);
        assert_eq!(status.connections, 0);
    }
}
