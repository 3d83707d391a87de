//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, hosts present)
//! - Check state names are valid cookie names
//!
//! # Design Decisions
//! - Returns all validation issues, not just the first
//! - Validation is a pure function: ServerConfig → Result<(), Vec<ValidationIssue>>
//! - Runs before a server handle is constructed

use std::fmt;

use crate::config::schema::{ConnectionConfig, ServerConfig, ServerSettings};
use crate::http::state::is_valid_state_name;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a full configuration file.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = settings_issues(&config.settings);

    for (i, connection) in config.connections.iter().enumerate() {
        issues.extend(connection_issues(&format!("connections[{i}]"), connection));
    }

    for name in config.states.keys() {
        if !is_valid_state_name(name) {
            issues.push(ValidationIssue::new(
                format!("states.{name}"),
                "not a valid cookie name",
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn settings_issues(settings: &ServerSettings) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if !(settings.app.is_object() || settings.app.is_null()) {
        issues.push(ValidationIssue::new("app", "must be a table/object"));
    }

    if settings.payload.max_bytes == 0 {
        issues.push(ValidationIssue::new("payload.max_bytes", "must be greater than 0"));
    }

    if settings.timeouts.stop_secs == 0 {
        issues.push(ValidationIssue::new("timeouts.stop_secs", "must be greater than 0"));
    }

    let blank_tag = settings
        .debug
        .request
        .iter()
        .chain(settings.debug.log.iter())
        .any(|tag| tag.trim().is_empty());
    if blank_tag {
        issues.push(ValidationIssue::new("debug", "tags must not be blank"));
    }

    issues
}

fn connection_issues(field: &str, connection: &ConnectionConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if connection.host.trim().is_empty() {
        issues.push(ValidationIssue::new(format!("{field}.host"), "must not be empty"));
    }
    if connection.max_connections == 0 {
        issues.push(ValidationIssue::new(
            format!("{field}.max_connections"),
            "must be greater than 0",
        ));
    }
    issues
}
