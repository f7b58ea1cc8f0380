//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle rendered by the `/metrics` endpoint. Call once at
/// startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections accepted total (counter, labels: workflow).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Connections rejected before the handshake (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections closed by the liveness monitor (counter).
pub const WS_LIVENESS_EVICTIONS_TOTAL: &str = "ws_liveness_evictions_total";
/// Inbound frames dropped as malformed or unknown (counter, labels: reason).
pub const FRAMES_DROPPED_TOTAL: &str = "frames_dropped_total";
/// Requests sent to devices (counter, labels: command).
pub const REQUESTS_TOTAL: &str = "requests_total";
/// Requests that failed (counter, labels: command, error_type).
pub const REQUEST_ERRORS_TOTAL: &str = "request_errors_total";
/// Request round-trip seconds (histogram, labels: command).
pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
/// Panics caught in workflow code (counter, labels: workflow, site).
pub const WORKFLOW_PANICS_TOTAL: &str = "workflow_panics_total";
