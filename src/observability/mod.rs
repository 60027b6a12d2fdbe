//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router + timeout middleware produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (outcome counters, handler latency histogram)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request context (method, path, timeout source) travels as log fields
//! - Metrics are cheap (atomic increments); without a recorder installed
//!   they are no-ops, so library users pay nothing

pub mod logging;
pub mod metrics;
