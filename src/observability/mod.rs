//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch bridge, reply sessions, server lifecycle produce:
//!     → tracing events (request_id on every per-request event)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from `x-request-id` into every session event
//! - Metrics are cheap (atomic increments) and off until a recorder exists

pub mod logging;
pub mod metrics;
