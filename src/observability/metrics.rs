//! Metrics collection and exposition.
//!
//! # Metrics
//! - `timeout_gate_requests_total` (counter): requests by outcome
//!   (`completed`, `timed_out`, `canceled`, `panicked`, `bypassed`)
//! - `timeout_gate_handler_duration_seconds` (histogram): time spent in the
//!   middleware, by outcome
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - The Prometheus exporter is optional and installed by the binary

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const REQUESTS_TOTAL: &str = "timeout_gate_requests_total";
pub const HANDLER_DURATION: &str = "timeout_gate_handler_duration_seconds";

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

/// Record how one request left the timeout middleware.
pub fn record_outcome(outcome: &'static str, elapsed: Duration) {
    metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(HANDLER_DURATION, "outcome" => outcome).record(elapsed.as_secs_f64());
}
