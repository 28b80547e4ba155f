//! Branded identifier newtypes.
//!
//! Peers are identified by the numeric `self_id` their runtime reports, and
//! correlated calls by a random UUID carried in the `echo` field. Keeping both
//! behind newtypes prevents passing a user id where a peer id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one connected bot instance (`self_id` on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(i64);

impl PeerId {
    /// Wrap a raw `self_id`.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw numeric identity.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for PeerId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation token joining an outbound request to its response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Echo(Uuid);

impl Echo {
    /// Generate a fresh random (v4) echo.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for Echo {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for Echo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_serializes_as_bare_number() {
        let id = PeerId::new(3_892_215_616);
        assert_eq!(serde_json::to_string(&id).unwrap(), "3892215616");
        let back: PeerId = serde_json::from_str("3892215616").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn peer_id_display() {
        assert_eq!(PeerId::from(42).to_string(), "42");
    }

    #[test]
    fn echo_random_is_unique() {
        let a = Echo::random();
        let b = Echo::random();
        assert_ne!(a, b);
    }

    #[test]
    fn echo_parses_hyphenated_uuid() {
        let echo: Echo = "7f1c4a9e-3b7d-4c39-9e0b-1d2f7a5e6c11".parse().unwrap();
        assert_eq!(echo.to_string(), "7f1c4a9e-3b7d-4c39-9e0b-1d2f7a5e6c11");
    }

    #[test]
    fn echo_rejects_garbage() {
        assert!("not-a-uuid".parse::<Echo>().is_err());
    }

    #[test]
    fn echo_serializes_as_string() {
        let echo = Echo::random();
        let json = serde_json::to_value(echo).unwrap();
        assert_eq!(json.as_str().unwrap(), echo.to_string());
    }
}
