//! Request filters that bypass timeout enforcement.
//!
//! Filters run on every request before anything else, so they should be
//! cheap and free of side effects.

use std::sync::Arc;

use crate::http::Context;
use crate::routing::Matcher;

/// Returns `true` to run the request without a deadline.
pub trait Filter: Send + Sync {
    fn skip(&self, ctx: &Context) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    fn skip(&self, ctx: &Context) -> bool {
        self(ctx)
    }
}

/// Skips every request the wrapped matcher accepts.
#[derive(Debug)]
pub struct MatcherFilter<M>(pub M);

impl<M: Matcher> Filter for MatcherFilter<M> {
    fn skip(&self, ctx: &Context) -> bool {
        self.0.matches(ctx.request())
    }
}

/// Ordered filters; the first one asking to skip wins.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn should_skip(&self, ctx: &Context) -> bool {
        self.filters.iter().any(|filter| filter.skip(ctx))
    }
}
