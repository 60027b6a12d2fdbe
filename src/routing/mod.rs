//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched route (handler + annotations) or 404
//!
//! Route Compilation (at startup):
//!     Router::handle(...) calls
//!     → RouteOption annotations applied
//!     → middleware chain wrapped around each handler
//!     → Freeze as immutable RouterService
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (exact or prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use matcher::{
    pattern_matcher, AndMatcher, HostMatcher, Matcher, MethodMatcher, PathMatcher,
    PathPrefixMatcher,
};
pub use router::{RouteInfo, RouteOption, Router, RouterService};
