//! Connection identifiers and in-flight request tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for introspection
//! - Count in-flight reply sessions and completed requests
//! - Feed load snapshots and the in-flight gauge

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a bound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicU64,
    total: AtomicU64,
    closed: AtomicU64,
}

/// Tracks reply sessions for load reporting.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    counters: Arc<Counters>,
}

impl RequestTracker {
    /// Create a new request tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new in-flight request. Returns a guard that decrements on drop.
    pub fn track(&self) -> RequestGuard {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_sessions_in_flight(in_flight);
        RequestGuard {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Requests whose reply session is still alive.
    pub fn in_flight(&self) -> u64 {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Requests dispatched since the server was created.
    pub fn total(&self) -> u64 {
        self.counters.total.load(Ordering::Relaxed)
    }

    /// Reply sessions that reached CLOSED.
    pub fn closed(&self) -> u64 {
        self.counters.closed.load(Ordering::Relaxed)
    }
}

/// Guard owned by a reply session.
#[derive(Debug)]
pub struct RequestGuard {
    counters: Arc<Counters>,
}

impl RequestGuard {
    /// Count the owning session as closed.
    pub fn mark_closed(&self) {
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let in_flight = self.counters.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_sessions_in_flight(in_flight);
    }
}
