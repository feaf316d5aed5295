//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the echo
//! server and its client commands. All types derive Serde traits for
//! deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EchoConfig {
    /// Server side: listener, TLS, identity.
    pub server: ServerConfig,

    /// Client side: target, trust, subscription shape.
    pub client: ClientConfig,

    /// Log filter, format and throttling.
    pub logging: LoggingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Name reported in every pong. Resolved from the OS when unset.
    pub hostname: Option<String>,

    /// Interval between pushes on a subscription.
    pub subscribe_interval_ms: u64,
}

impl ServerConfig {
    pub fn subscribe_interval(&self) -> Duration {
        Duration::from_millis(self.subscribe_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            hostname: None,
            subscribe_interval_ms: 1000,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl TlsConfig {
    /// TLS is enabled only when both paths are present.
    pub fn from_paths(cert_path: &str, key_path: &str) -> Option<Self> {
        if cert_path.is_empty() || key_path.is_empty() {
            return None;
        }
        Some(Self {
            cert_path: cert_path.to_string(),
            key_path: key_path.to_string(),
        })
    }
}

/// Client configuration for the `ping` and `subscribe` commands.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address (e.g., "localhost:8080").
    pub target: String,

    /// CA certificate (PEM) used to verify the server.
    pub ca_cert_path: Option<String>,

    /// Skip certificate chain and host name verification.
    pub insecure_skip_verify: bool,

    /// Extra request metadata as `key=value` entries.
    pub metadata: Vec<String>,

    /// Wall-clock bound for one subscription.
    pub subscribe_duration_secs: u64,

    /// Parallel subscriptions against one target.
    pub concurrency: usize,

    /// Connect timeout for the client channel.
    pub connect_timeout_ms: u64,
}

impl ClientConfig {
    pub fn subscribe_duration(&self) -> Duration {
        Duration::from_secs(self.subscribe_duration_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: "localhost:8080".to_string(),
            ca_cert_path: None,
            insecure_skip_verify: false,
            metadata: Vec::new(),
            subscribe_duration_secs: 600,
            concurrency: 1,
            connect_timeout_ms: 5000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,

    /// Emit JSON lines instead of the pretty format.
    pub json: bool,

    /// Window of the throttle guarding high-frequency log events.
    pub throttle_window_ms: u64,

    /// Keep the last event of a window and log it when the window closes.
    pub throttle_trailing: bool,
}

impl LoggingConfig {
    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "grpc_echo=info,tower_http=info".to_string(),
            json: false,
            throttle_window_ms: 5000,
            throttle_trailing: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,

    /// Metrics listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Parse `key=value` metadata entries.
///
/// Splits at the first `=`, trims both sides and skips entries without a key.
pub fn parse_metadata(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
