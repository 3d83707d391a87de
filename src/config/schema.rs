//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a bridge server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::http::state::StateDefinition;

/// Root configuration for a bridge server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Engine and application settings exposed through introspection.
    #[serde(flatten)]
    pub settings: ServerSettings,

    /// Listeners bound at startup.
    pub connections: Vec<ConnectionConfig>,

    /// Cookie/state definitions registered at construction.
    pub states: BTreeMap<String, StateDefinition>,
}

/// Settings that stay attached to a running server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerSettings {
    /// Application-level metadata, opaque to the bridge.
    pub app: serde_json::Value,

    /// Diagnostic verbosity.
    pub debug: DebugConfig,

    /// Request body handling.
    pub payload: PayloadConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Which diagnostic events get surfaced at elevated log levels.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Master switch. When off, every diagnostic goes to `debug`.
    pub enabled: bool,

    /// Request event tags (e.g. "error", "implementation").
    pub request: Vec<String>,

    /// Server log tags.
    pub log: Vec<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request: vec!["implementation".to_string()],
            log: Vec::new(),
        }
    }
}

impl DebugConfig {
    /// Returns true if per-request failures should be logged loudly.
    pub fn reports_request_errors(&self) -> bool {
        self.enabled
            && self
                .request
                .iter()
                .any(|tag| tag == "error" || tag == "implementation")
    }

    /// Returns true if server log events with `tag` are enabled.
    pub fn logs(&self, tag: &str) -> bool {
        self.enabled && self.log.iter().any(|t| t == tag)
    }
}

/// Request payload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Maximum request body size in bytes.
    pub max_bytes: usize,

    /// Parse JSON and urlencoded bodies into structured payloads.
    pub parse: bool,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            parse: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a handler to produce a response head, in seconds.
    /// Zero disables the engine timeout.
    pub request_secs: u64,

    /// Graceful stop deadline in seconds.
    pub stop_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            stop_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "http_bridge=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Listener binding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host or interface address to bind.
    pub host: String,

    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,

    /// Free-form labels reported by introspection.
    pub labels: Vec<String>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            labels: Vec::new(),
            max_connections: 10_000,
        }
    }
}

impl ConnectionConfig {
    /// Shorthand for a listener on `host:port` with default limits.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}
