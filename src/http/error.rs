//! Per-request error types.
//!
//! Nothing in here ever crosses into hyper: reply operations return these
//! to the handler task that issued them.

use thiserror::Error;

/// A response value rejected before it reached the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Cookie set without a matching `with_state` registration.
    #[error("state `{0}` is not registered")]
    UnknownState(String),

    #[error("`{0}` is not a valid cookie name")]
    InvalidStateName(String),

    #[error("invalid value for state `{name}`: {reason}")]
    InvalidStateValue { name: String, reason: String },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid status code {0}")]
    InvalidStatus(u16),
}

/// Errors raised by reply session operations.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The transport dropped the continuation or the body receiver.
    #[error("response stream closed by the transport")]
    StreamClosed,

    /// Status, headers and cookies are frozen once the head is flushed.
    #[error("response head already sent")]
    HeadersSent,

    #[error("static file replies need the static files plugin to be registered")]
    StaticFilesUnavailable,

    #[error("path `{0}` escapes the static files root")]
    Forbidden(String),
}

impl ReplyError {
    /// Returns true if the error ended the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplyError::StreamClosed)
    }
}
