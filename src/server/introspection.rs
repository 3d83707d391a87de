//! Read-only server accessors for diagnostics and health reporting.

use serde::Serialize;
use serde_json::Value;

use crate::server::handle::ServerHandle;

/// Negotiated details of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub host: String,
    /// Bound port while started, configured port otherwise.
    pub port: u16,
    pub protocol: String,
    pub uri: String,
    pub labels: Vec<String>,
    /// Unix milliseconds.
    pub created: i64,
    /// Unix milliseconds; 0 while stopped.
    pub started: i64,
}

/// Point-in-time load metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSnapshot {
    /// Requests whose reply session is still alive.
    pub concurrent_requests: u64,
    pub requests_total: u64,
    pub replies_closed: u64,
    /// Unix milliseconds; `None` while stopped.
    pub started_at: Option<i64>,
    pub uptime_ms: u64,
}

impl ServerHandle {
    /// One entry per connection, whether or not the server is started.
    pub fn get_infos(&self) -> Vec<ConnectionInfo> {
        let started = self
            .running
            .as_ref()
            .map(|r| r.started.timestamp_millis())
            .unwrap_or(0);

        self.connections
            .iter()
            .map(|connection| {
                let port = connection
                    .bound
                    .map(|addr| addr.port())
                    .unwrap_or(connection.config.port);
                ConnectionInfo {
                    id: connection.id.to_string(),
                    host: connection.config.host.clone(),
                    port,
                    protocol: "http".to_string(),
                    uri: format!("http://{}:{}", connection.config.host, port),
                    labels: connection.config.labels.clone(),
                    created: connection.created.timestamp_millis(),
                    started,
                }
            })
            .collect()
    }

    pub fn get_load(&self) -> LoadSnapshot {
        let started = self.running.as_ref().map(|r| r.started);
        let uptime_ms = started
            .map(|at| (chrono::Utc::now() - at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        LoadSnapshot {
            concurrent_requests: self.tracker.in_flight(),
            requests_total: self.tracker.total(),
            replies_closed: self.tracker.closed(),
            started_at: started.map(|at| at.timestamp_millis()),
            uptime_ms,
        }
    }

    /// The settings the server was created with, as a JSON object.
    pub fn get_settings(&self) -> Value {
        serde_json::to_value(&*self.settings).unwrap_or(Value::Null)
    }

    /// Look up one setting by dotted key, e.g. `payload.max_bytes`.
    pub fn get_setting(&self, key: &str) -> Option<Value> {
        let settings = self.get_settings();
        key.split('.')
            .try_fold(&settings, |value, segment| value.get(segment))
            .cloned()
    }

    pub fn get_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Generic accessor over the other introspection views.
    pub fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "settings" => Some(self.get_settings()),
            "app" => Some(self.settings.app.clone()).filter(|app| !app.is_null()),
            "info" => serde_json::to_value(self.get_infos()).ok(),
            "load" => serde_json::to_value(self.get_load()).ok(),
            "version" => Some(Value::from(self.get_version())),
            "plugins" => Some(Value::from(self.plugins.clone())),
            "states" => Some(Value::from(self.context.states.names())),
            "routes" => serde_json::to_value(&self.routes).ok(),
            _ => None,
        }
    }
}
