//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Liveness report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"draining"` after shutdown was triggered.
    pub status: &'static str,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Bound bot identities.
    pub peers: usize,
    /// Correlated calls awaiting a response.
    pub pending_calls: usize,
}

/// Snapshot the counters into a response.
pub fn health_check(start_time: Instant, peers: usize, pending_calls: usize, draining: bool) -> HealthResponse {
    HealthResponse {
        status: if draining { "draining" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        peers,
        pending_calls,
    }
}
