//! Resilience subsystem: handler timeouts.
//!
//! # Data Flow
//! ```text
//! Request
//!     → filter.rs (skip enforcement entirely?)
//!     → resolver.rs (route annotation > resolver > global default)
//!     → timeouts.rs (race handler vs. deadline)
//!         → writer.rs (shadow writer the handler writes into)
//!         → deadline.rs (cancellation handed to the handler)
//!     → commit, substitute, or re-raise
//! ```
//!
//! # Design Decisions
//! - Enforcement is opt-out per request: filters and zero durations bypass
//!   the race with no task, buffer or timer
//! - Exactly one of {handler output, timeout response} reaches the client
//! - All of it is composable router middleware

pub mod annotation;
pub mod deadline;
pub mod filter;
pub mod options;
pub mod pool;
pub mod resolver;
pub mod timeouts;
pub mod writer;

pub use annotation::{after, none, RouteTimeout};
pub use deadline::{CancelCause, CancelGuard, Cancellation};
pub use filter::{Filter, FilterChain, MatcherFilter};
pub use options::Options;
pub use pool::{Pool, PoolStats, Pooled};
pub use resolver::{resolve_deadline, DeadlineSource, ResolvedDeadline, Resolver};
pub use timeouts::{default_timeout_response, middleware, Outcome, Timeout};
pub use writer::TimeoutWriter;
