//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): dispatched requests by method, status
//! - `bridge_request_duration_seconds` (histogram): time to response head
//! - `bridge_replies_closed_total` (counter): sessions that reached CLOSED
//! - `bridge_reply_bytes_total` (counter): body bytes written by sessions
//! - `bridge_sessions_in_flight` (gauge): live reply sessions
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a request whose response head left the dispatcher.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("bridge_requests_total", &labels).increment(1);
    metrics::histogram!("bridge_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record a session reaching CLOSED.
pub fn record_reply_closed(bytes_written: u64) {
    metrics::counter!("bridge_replies_closed_total").increment(1);
    metrics::counter!("bridge_reply_bytes_total").increment(bytes_written);
}

pub fn set_sessions_in_flight(count: u64) {
    metrics::gauge!("bridge_sessions_in_flight").set(count as f64);
}
