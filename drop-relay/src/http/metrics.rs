//! Prometheus metrics endpoint.

use crate::protocol::WsRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<WsRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

fn render(relay: &WsRelay) -> String {
    let m = relay.metrics();
    let stats = relay.stats();

    // Gauges
    let connections = relay.active_connections();
    let free = stats.free;
    let allocated = stats.allocated;
    let paired = stats.paired;

    // Counters
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let claims = m.claims_total.load(Ordering::Relaxed);
    let joins = m.joins_total.load(Ordering::Relaxed);
    let transmissions = m.transmissions_total.load(Ordering::Relaxed);
    let bytes = m.bytes_relayed.load(Ordering::Relaxed);
    let completions = m.completions_total.load(Ordering::Relaxed);
    let releases = m.disconnect_releases_total.load(Ordering::Relaxed);
    let reclaimed = m.reclaimed_total.load(Ordering::Relaxed);
    let exhausted = m.exhausted_total.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    format!(
        r#"# HELP codedrop_relay_connections_active Number of open WebSocket connections
# TYPE codedrop_relay_connections_active gauge
codedrop_relay_connections_active {connections}

# HELP codedrop_relay_slots_free Slots open for claiming
# TYPE codedrop_relay_slots_free gauge
codedrop_relay_slots_free {free}

# HELP codedrop_relay_slots_allocated Slots awaiting a receiver or paired
# TYPE codedrop_relay_slots_allocated gauge
codedrop_relay_slots_allocated {allocated}

# HELP codedrop_relay_slots_paired Slots with a transfer in progress
# TYPE codedrop_relay_slots_paired gauge
codedrop_relay_slots_paired {paired}

# HELP codedrop_relay_info Server information
# TYPE codedrop_relay_info gauge
codedrop_relay_info{{version="{version}"}} 1

# HELP codedrop_relay_connections_total Total connections accepted
# TYPE codedrop_relay_connections_total counter
codedrop_relay_connections_total {conns_total}

# HELP codedrop_relay_claims_total Total slots handed out
# TYPE codedrop_relay_claims_total counter
codedrop_relay_claims_total {claims}

# HELP codedrop_relay_joins_total Total receivers paired with a sender
# TYPE codedrop_relay_joins_total counter
codedrop_relay_joins_total {joins}

# HELP codedrop_relay_transmissions_total Total chunks forwarded
# TYPE codedrop_relay_transmissions_total counter
codedrop_relay_transmissions_total {transmissions}

# HELP codedrop_relay_bytes_relayed_total Total payload bytes forwarded
# TYPE codedrop_relay_bytes_relayed_total counter
codedrop_relay_bytes_relayed_total {bytes}

# HELP codedrop_relay_completions_total Total transfers confirmed by the receiver
# TYPE codedrop_relay_completions_total counter
codedrop_relay_completions_total {completions}

# HELP codedrop_relay_disconnect_releases_total Total slots freed because a participant left
# TYPE codedrop_relay_disconnect_releases_total counter
codedrop_relay_disconnect_releases_total {releases}

# HELP codedrop_relay_reclaimed_total Total idle slots freed by the reaper
# TYPE codedrop_relay_reclaimed_total counter
codedrop_relay_reclaimed_total {reclaimed}

# HELP codedrop_relay_exhausted_total Total claims that found no free slot
# TYPE codedrop_relay_exhausted_total counter
codedrop_relay_exhausted_total {exhausted}

# HELP codedrop_relay_rate_limit_hits_total Total rate limit rejections
# TYPE codedrop_relay_rate_limit_hits_total counter
codedrop_relay_rate_limit_hits_total {rate_limits}

# HELP codedrop_relay_errors_total Total servererror events sent
# TYPE codedrop_relay_errors_total counter
codedrop_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
