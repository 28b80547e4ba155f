//! Runtime configuration for the gateway.

use std::time::Duration;

use onebridge_settings::GatewaySettings;
use serde::{Deserialize, Serialize};

/// Resolved server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Token required on the upgrade request, if any.
    pub access_token: Option<String>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Handshake window in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Default correlated call timeout in milliseconds.
    pub call_timeout_ms: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Inbound event queue depth ahead of handlers.
    pub event_queue_capacity: usize,
    /// Ping interval in seconds.
    pub ping_interval_secs: u64,
    /// Silence after which a connection is dropped, in seconds.
    pub pong_timeout_secs: u64,
    /// Fail pending calls as soon as their peer's connection ends.
    pub abandon_calls_on_disconnect: bool,
}

impl ServerConfig {
    /// Handshake window.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Default call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Pong timeout.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/ws".into(),
            access_token: None,
            max_message_size: 16 * 1024 * 1024,
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

impl From<&GatewaySettings> for ServerConfig {
    fn from(settings: &GatewaySettings) -> Self {
        let server = &settings.server;
        let gateway = &settings.gateway;
        Self {
            host: server.host.clone(),
            port: server.port,
            ws_path: server.ws_path.clone(),
            access_token: server.access_token.clone(),
            max_message_size: server.max_message_size,
            handshake_timeout_ms: gateway.handshake_timeout_ms,
            call_timeout_ms: gateway.call_timeout_ms,
            send_queue_capacity: gateway.send_queue_capacity,
            event_queue_capacity: gateway.event_queue_capacity,
            ping_interval_secs: gateway.ping_interval_secs,
            pong_timeout_secs: gateway.pong_timeout_secs,
            abandon_calls_on_disconnect: gateway.abandon_calls_on_disconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_ephemeral_loopback() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.ws_path, "/ws");
    }

    #[test]
    fn duration_accessors() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.call_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.ping_interval(), Duration::from_secs(30));
        assert_eq!(cfg.pong_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let mut settings = GatewaySettings::default();
        settings.server.port = 6700;
        settings.server.access_token = Some("tok".into());
        settings.gateway.call_timeout_ms = 5_000;
        settings.gateway.abandon_calls_on_disconnect = true;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 6700);
        assert_eq!(cfg.access_token.as_deref(), Some("tok"));
        assert_eq!(cfg.call_timeout(), Duration::from_secs(5));
        assert!(cfg.abandon_calls_on_disconnect);
        assert_eq!(cfg.send_queue_capacity, settings.gateway.send_queue_capacity);
    }
}
