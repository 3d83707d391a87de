//! Transport adapter: the server handle and its lifecycle.
//!
//! # Data Flow
//! ```text
//! ServerHandle::create(ServerConfig)
//!     → with_connection / with_route / with_state / with_plugins
//!     → on_request(handler)
//!     → start: route.rs validates and builds the router, listeners bind, serve
//!     → stop: shutdown signal, drain, release
//! ```
//!
//! introspection.rs adds read-only accessors over a live handle.

pub mod error;
pub mod handle;
pub mod introspection;
pub mod plugin;
pub mod route;

pub use error::{BoxError, InitializationError, PluginError, StartError, StopError};
pub use handle::ServerHandle;
pub use introspection::{ConnectionInfo, LoadSnapshot};
pub use plugin::{Plugin, PluginDescriptor};
pub use route::RouteConfig;
