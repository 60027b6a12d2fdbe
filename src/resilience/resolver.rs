//! Deadline resolution.
//!
//! # Responsibilities
//! - Compute the effective deadline for one request
//! - Record where the duration came from
//!
//! # Design Decisions
//! - Priority: route annotation, then the configured resolver, then the
//!   global default; the first applicable source wins
//! - A zero duration at the winning step disables enforcement

use std::time::Duration;

use crate::http::Context;
use crate::resilience::annotation::route_timeout;

/// Computes a per-request timeout.
///
/// Returning `None` means "not applicable"; the global default is used.
pub trait Resolver: Send + Sync {
    fn resolve(&self, ctx: &Context) -> Option<Duration>;
}

impl<F> Resolver for F
where
    F: Fn(&Context) -> Option<Duration> + Send + Sync,
{
    fn resolve(&self, ctx: &Context) -> Option<Duration> {
        self(ctx)
    }
}

/// Which source supplied a [`ResolvedDeadline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineSource {
    Route,
    Resolver,
    Default,
}

impl DeadlineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadlineSource::Route => "route",
            DeadlineSource::Resolver => "resolver",
            DeadlineSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDeadline {
    pub duration: Duration,
    pub source: DeadlineSource,
}

impl ResolvedDeadline {
    /// A zero duration turns enforcement off for the request.
    pub fn is_disabled(&self) -> bool {
        self.duration.is_zero()
    }
}

/// Resolve the deadline for `ctx`.
pub fn resolve_deadline(
    ctx: &Context,
    resolver: Option<&dyn Resolver>,
    default: Duration,
) -> ResolvedDeadline {
    if let Some(duration) = route_timeout(ctx) {
        return ResolvedDeadline {
            duration,
            source: DeadlineSource::Route,
        };
    }

    if let Some(duration) = resolver.and_then(|r| r.resolve(ctx)) {
        return ResolvedDeadline {
            duration,
            source: DeadlineSource::Resolver,
        };
    }

    ResolvedDeadline {
        duration: default,
        source: DeadlineSource::Default,
    }
}
