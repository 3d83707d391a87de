//! HTTP bridge subsystem: everything between hyper and the request handler.
//!
//! # Data Flow
//! ```text
//! axum route
//!     → dispatch.rs (collect body, spawn the handler task)
//!     → request.rs (NormalizedRequest value; state.rs decodes cookies)
//!     → handler(ReplySession, NormalizedRequest)
//!     → reply.rs (status/header/cookie/body operations, fragment.rs values)
//!     → oneshot continuation + streamed body back to hyper
//! ```
//!
//! # Design Decisions
//! - The handler never sees hyper's request or response types
//! - Per-request errors (error.rs) stay inside the handler task

pub mod dispatch;
pub mod error;
pub mod fragment;
pub mod reply;
pub mod request;
pub mod state;

pub use dispatch::{HandlerSlot, RequestHandler};
pub use error::{ReplyError, ValidationError};
pub use fragment::{Cookie, CookieOptions, Header, HeaderOptions, Reply, ResponseFragment};
pub use reply::{ReplySession, SessionSnapshot, SessionState};
pub use request::{normalize, LiveRequest, NormalizedRequest};
pub use state::{SameSite, StateDefinition, StateEncoding, StateRegistry};
