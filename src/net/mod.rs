//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → axum::serve (HTTP/1.1 via hyper)
//!     → connection.rs (in-flight session tracking)
//!     → Hand off to the dispatch bridge
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Every listener of a server is bound before any of them serves

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, RequestGuard, RequestTracker};
pub use listener::{BoundedListener, ListenerError};
