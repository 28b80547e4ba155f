//! Access-token check on the WebSocket upgrade.

use axum::http::{HeaderMap, header};
use serde::Deserialize;

/// Query string accepted on the upgrade URL.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// `?access_token=...`
    pub access_token: Option<String>,
}

/// Token presented by the client: `Authorization: Bearer` first, then the
/// `access_token` query parameter.
pub fn extract_token(headers: &HeaderMap, query: &TokenQuery) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned);
    from_header.or_else(|| {
        query
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    })
}

/// Whether `presented` satisfies `expected`. No expected token admits anyone.
pub fn authorized(expected: Option<&str>, presented: Option<&str>) -> bool {
    match (expected, presented) {
        (None, _) => true,
        (Some(expected), Some(presented)) => constant_time_eq(expected.as_bytes(), presented.as_bytes()),
        (Some(_), None) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
