//! Prometheus metrics for server health.
//!
//! Exposed on a dedicated listener (`METRICS_BIND`) in Prometheus text
//! format. Counters are recorded at the WebSocket boundary; gauges are
//! refreshed wherever the current totals are already at hand.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))
}

/// A WebSocket connection was accepted.
pub fn ws_connections_total() {
    metrics::counter!("ws_connections_total").increment(1);
}

/// Current live WebSocket connections.
pub fn ws_connections_active(count: usize) {
    metrics::gauge!("ws_connections_active").set(count as f64);
}

/// An inbound WebSocket message was received.
pub fn ws_messages_received() {
    metrics::counter!("ws_messages_received").increment(1);
}

/// A WebSocket upgrade was rejected by the IP guard or origin policy.
pub fn ws_upgrades_rejected(reason: &'static str) {
    metrics::counter!("ws_upgrades_rejected", "reason" => reason).increment(1);
}

/// Current live rooms.
pub fn rooms_active(count: usize) {
    metrics::gauge!("rooms_active").set(count as f64);
}

/// Current rooms with a game in progress.
pub fn games_active(count: usize) {
    metrics::gauge!("games_active").set(count as f64);
}

/// Current users in the store.
pub fn users_active(count: usize) {
    metrics::gauge!("users_active").set(count as f64);
}
