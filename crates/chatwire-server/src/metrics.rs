//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder. Call once at startup.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connections torn down (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Status messages accepted by the channel (counter).
pub const STATUS_ENQUEUED_TOTAL: &str = "status_enqueued_total";
/// Status messages dropped (counter, labels: reason).
pub const STATUS_DROPPED_TOTAL: &str = "status_dropped_total";
/// Status frames handed to a connection (counter).
pub const STATUS_DELIVERED_TOTAL: &str = "status_delivered_total";
/// Agent frames sent to clients (counter, labels: kind).
pub const AGENT_FRAMES_TOTAL: &str = "agent_frames_total";
/// Relay tasks abandoned after the cancel timeout (counter).
pub const RELAY_CANCEL_TIMEOUTS_TOTAL: &str = "relay_cancel_timeouts_total";
