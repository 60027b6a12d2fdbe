//! Route-level timeout annotations.

use std::time::Duration;

use crate::http::Context;
use crate::routing::RouteOption;

/// Per-route timeout override stored in the route's annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTimeout(pub Duration);

/// Give one route its own timeout instead of the global one.
pub fn after(dt: Duration) -> RouteOption {
    RouteOption::annotation(RouteTimeout(dt))
}

/// Disable the timeout for one route (long polls, uploads, SSE).
pub fn none() -> RouteOption {
    after(Duration::ZERO)
}

pub(crate) fn route_timeout(ctx: &Context) -> Option<Duration> {
    ctx.route()
        .and_then(|route| route.annotation::<RouteTimeout>())
        .map(|timeout| timeout.0)
}
