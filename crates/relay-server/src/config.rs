//! Server configuration.

use std::time::Duration;

use relay_core::protocol::DEFAULT_NAMESPACE;
use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the workflow server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Protocol namespace prefixed to frame type tags.
    pub namespace: String,
    /// Require an exact path match; never fall back to the default workflow
    /// for unknown paths.
    pub strict_paths: bool,
    /// Liveness probe interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Default request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Timeout for refreshing queries in milliseconds.
    pub refresh_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
}

impl ServerConfig {
    /// Liveness probe interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Default request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for refreshing queries.
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            namespace: DEFAULT_NAMESPACE.into(),
            strict_paths: false,
            heartbeat_interval_ms: 30_000,
            request_timeout_ms: 10_000,
            refresh_timeout_ms: 45_000,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 256,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            namespace: settings.namespace.clone(),
            strict_paths: settings.strict_paths,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            request_timeout_ms: settings.request_timeout_ms,
            refresh_timeout_ms: settings.refresh_timeout_ms,
            max_message_size: settings.max_message_size,
            send_queue_capacity: settings.send_queue_capacity.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.namespace, "wf_api");
        assert!(!cfg.strict_paths);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.refresh_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn bind_address_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9090,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_address(), "0.0.0.0:9090");
    }

    #[test]
    fn from_settings() {
        let settings = ServerSettings {
            strict_paths: true,
            namespace: String::new(),
            send_queue_capacity: 0,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert!(cfg.strict_paths);
        assert_eq!(cfg.namespace, "");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.send_queue_capacity, 1);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.namespace, cfg.namespace);
        assert_eq!(back.heartbeat_interval_ms, cfg.heartbeat_interval_ms);
    }
}
