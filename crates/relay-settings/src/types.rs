//! Settings schema.

use relay_core::logging::LogFormat;
use relay_core::protocol::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener, routing, and session timing.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener, routing, and session timing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port (`0` picks a free port).
    pub port: u16,
    /// Protocol namespace prefixed to every frame type tag.
    pub namespace: String,
    /// Reject connections whose path has no registered workflow, even when a
    /// default workflow exists.
    pub strict_paths: bool,
    /// Liveness probe interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Default request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Timeout for refreshing queries in milliseconds.
    pub refresh_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before senders wait.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            namespace: DEFAULT_NAMESPACE.to_string(),
            strict_paths: false,
            heartbeat_interval_ms: 30_000,
            request_timeout_ms: 10_000,
            refresh_timeout_ms: 45_000,
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
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

impl LoggingSettings {
    /// Install the global stderr subscriber. No-op if one is already set.
    pub fn init(&self) {
        relay_core::logging::init_subscriber(&self.level, self.format);
    }
}
