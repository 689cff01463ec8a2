//! WebSocket upgrade handler.
//!
//! Accepts incoming connections on the configured path, subject to the
//! per-IP connection rate limit and the global connection cap.

use crate::server::SlotRelay;
use crate::session::Session;
use crate::transport::ChannelTransport;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ConnectInfo;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// The relay as hosted over WebSockets.
pub type WsRelay = SlotRelay<ChannelTransport>;

/// Upgrade handler for the relay's WebSocket path.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Extension(relay): Extension<Arc<WsRelay>>,
) -> Response {
    // Rate limit check: prevent connection flooding from a single address
    if let Err(e) = relay.rate_limits().check_connection(&remote.ip()) {
        tracing::warn!("Connection rate limited for {}: {}", remote, e);
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response();
    }

    // Reserve the place now so concurrent upgrades cannot overshoot the cap
    let Some(admission) = relay.try_admit() else {
        tracing::warn!(
            "Connection limit reached ({}), rejecting {}",
            relay.config().limits.max_connections,
            remote
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    relay.metrics().connections_total.fetch_add(1, Ordering::Relaxed);

    let max_message_size = relay.config().limits.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| Session::new(relay, remote, admission).run(socket))
}
