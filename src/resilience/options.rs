//! Named options for the timeout middleware.

use std::sync::Arc;

use crate::http::HandlerFn;
use crate::resilience::filter::{Filter, FilterChain};
use crate::resilience::resolver::Resolver;

/// Optional settings for [`crate::resilience::Timeout`].
#[derive(Clone)]
pub struct Options {
    pub(crate) filters: FilterChain,
    pub(crate) response: Option<HandlerFn>,
    pub(crate) resolver: Option<Arc<dyn Resolver>>,
    pub(crate) abort_request_body: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            filters: FilterChain::default(),
            response: None,
            resolver: None,
            abort_request_body: true,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter list. A request matching any filter runs without a deadline.
    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) -> Self {
        self.filters = FilterChain::new(filters.into_iter().collect());
        self
    }

    /// Append one filter to the list.
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Response sent to the client when the deadline wins.
    pub fn with_response(mut self, response: HandlerFn) -> Self {
        self.response = Some(response);
        self
    }

    /// Compute the timeout per request. When it returns `None` the global duration applies.
    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Whether to cut off further request body reads once the deadline fires (default: on).
    pub fn abort_request_body(mut self, abort: bool) -> Self {
        self.abort_request_body = abort;
        self
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("filters", &self.filters.len())
            .field("custom_response", &self.response.is_some())
            .field("custom_resolver", &self.resolver.is_some())
            .field("abort_request_body", &self.abort_request_body)
            .finish()
    }
}
