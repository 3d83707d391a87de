//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start (server::ServerHandle::start):
//!     Validate routes → Bind every listener → Serve each with a ShutdownSignal
//!
//! stop (server::ServerHandle::stop):
//!     Trigger Shutdown → Listeners stop accepting → In-flight responses drain
//!     → Deadline reached: remaining serving tasks are aborted
//!
//! signals.rs:
//!     SIGTERM/SIGINT → binary calls stop
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
