//! Settings schema with compiled defaults.
//!
//! Every struct is `#[serde(default)]`, so a settings file only needs the
//! keys it overrides. Keys are camelCase on disk.

use onebridge_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Protocol timing and queue sizes.
    pub gateway: GatewayTuning,
    /// Log output.
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// WebSocket endpoint path.
    pub ws_path: String,
    /// Shared secret required on the upgrade request, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            access_token: None,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

/// Protocol timing and backpressure settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayTuning {
    /// How long a new connection may stay silent before its first frame.
    pub handshake_timeout_ms: u64,
    /// Default wait for a correlated response.
    pub call_timeout_ms: u64,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Parsed events buffered ahead of handler dispatch.
    pub event_queue_capacity: usize,
    /// Interval between WebSocket pings.
    pub ping_interval_secs: u64,
    /// Silence after which a connection is considered dead.
    pub pong_timeout_secs: u64,
    /// Fail a peer's in-flight calls as soon as its connection drops.
    pub abandon_calls_on_disconnect: bool,
}

impl Default for GatewayTuning {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 1_000,
            call_timeout_ms: 30_000,
            send_queue_capacity: 1024,
            event_queue_capacity: 1024,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            abandon_calls_on_disconnect: false,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output layout.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl GatewaySettings {
    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/', got `{}`",
                self.server.ws_path
            )));
        }
        let positive = [
            ("server.maxMessageSize", self.server.max_message_size as u64),
            ("gateway.handshakeTimeoutMs", self.gateway.handshake_timeout_ms),
            ("gateway.callTimeoutMs", self.gateway.call_timeout_ms),
            ("gateway.sendQueueCapacity", self.gateway.send_queue_capacity as u64),
            ("gateway.eventQueueCapacity", self.gateway.event_queue_capacity as u64),
            ("gateway.pingIntervalSecs", self.gateway.ping_interval_secs),
            ("gateway.pongTimeoutSecs", self.gateway.pong_timeout_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(SettingsError::InvalidValue(format!("{key} must be greater than zero")));
        }
        Ok(())
    }
}
