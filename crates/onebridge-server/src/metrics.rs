//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before any metric is recorded. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Transport connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Transport connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Bound peer identities (gauge).
pub const PEERS_ACTIVE: &str = "peers_active";
/// Peers superseded by a newer handshake (counter).
pub const PEERS_REPLACED_TOTAL: &str = "peers_replaced_total";
/// Failed handshakes (counter, labels: reason).
pub const HANDSHAKE_FAILURES_TOTAL: &str = "handshake_failures_total";
/// Inbound frames that failed to parse (counter, labels: reason).
pub const FRAMES_REJECTED_TOTAL: &str = "frames_rejected_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const OUTBOUND_DROPS_TOTAL: &str = "outbound_drops_total";
/// Correlated calls issued (counter, labels: action).
pub const CALLS_TOTAL: &str = "calls_total";
/// Correlated call completions (counter, labels: outcome).
pub const CALL_OUTCOMES_TOTAL: &str = "call_outcomes_total";
/// Correlated call latency (histogram).
pub const CALL_DURATION_SECONDS: &str = "call_duration_seconds";
/// Responses with no pending call (counter).
pub const UNMATCHED_RESPONSES_TOTAL: &str = "unmatched_responses_total";
/// Events handed to handlers (counter, labels: kind).
pub const EVENTS_DISPATCHED_TOTAL: &str = "events_dispatched_total";
/// Events dropped on a full dispatch queue (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
/// Handler invocations that failed or timed out (counter, labels: handler).
pub const HANDLER_ERRORS_TOTAL: &str = "handler_errors_total";
/// Handler run time (histogram, labels: handler).
pub const HANDLER_DURATION_SECONDS: &str = "handler_duration_seconds";
