//! Setup-time error types.
//!
//! Every server lifecycle operation returns one of these to its caller;
//! none of them are raised while serving requests.

use thiserror::Error;

use crate::config::ValidationIssue;
use crate::net::ListenerError;

/// Boxed error produced by plugin registration.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The server could not be constructed from its configuration.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("invalid server configuration: {}", join_issues(.0))]
    InvalidConfig(Vec<ValidationIssue>),
}

/// A plugin failed to register. Plugins before it stay registered.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin `{plugin}` failed to register: {source}")]
    Registration {
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("plugin `{0}` is already registered")]
    Duplicate(String),
}

impl PluginError {
    /// Name of the plugin that failed.
    pub fn plugin(&self) -> &str {
        match self {
            PluginError::Registration { plugin, .. } => plugin,
            PluginError::Duplicate(plugin) => plugin,
        }
    }
}

/// Listening could not begin. No listener is left open.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("no connections bound")]
    NoConnections,

    #[error("invalid route {method} {path}: {reason}")]
    InvalidRoute {
        method: String,
        path: String,
        reason: String,
    },

    #[error("route {method} {path} conflicts with {existing}")]
    RouteConflict {
        method: String,
        path: String,
        existing: String,
    },

    #[error(transparent)]
    Bind(#[from] ListenerError),
}

/// Listeners did not shut down cleanly.
#[derive(Debug, Error)]
pub enum StopError {
    #[error("listener failed while serving: {0}")]
    Listener(#[from] std::io::Error),

    #[error("serving task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
