//! HTTP bridge library.
//!
//! Serves HTTP through axum and hands every request to one async handler as
//! a plain [`NormalizedRequest`] value, together with a [`ReplySession`] the
//! handler builds the response through.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod server;

// Extensions
pub mod plugins;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use http::{NormalizedRequest, ReplySession};
pub use lifecycle::Shutdown;
pub use server::{RouteConfig, ServerHandle};
