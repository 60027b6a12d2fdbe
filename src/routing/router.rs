//! Route table and dispatch.
//!
//! # Responsibilities
//! - Store routes with their handlers and annotations
//! - Wrap every route handler in the middleware chain once, at freeze time
//! - Look up the matching route and serve it against a fresh recorder
//!
//! # Design Decisions
//! - Immutable after `into_service` (thread-safe without locks)
//! - First registered match wins
//! - Annotations are a typed map (`http::Extensions`) so middleware can
//!   attach per-route metadata without the router knowing about it
//! - Explicit 404 rather than silent default

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use axum::body::Body;
use axum::http::{Extensions, Method, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;
use tower::Service;

use crate::http::connection::Connection;
use crate::http::context::Context;
use crate::http::handler::{chain, HandlerFn, Middleware};
use crate::http::recorder::ResponseRecorder;
use crate::http::sink::write_error;
use crate::routing::matcher::{pattern_matcher, AndMatcher, Matcher, MethodMatcher};

/// Static information about a matched route.
#[derive(Debug)]
pub struct RouteInfo {
    method: Method,
    pattern: String,
    annotations: Extensions,
}

impl RouteInfo {
    /// Route info for `method` and `pattern` with `options` applied.
    pub fn build(
        method: Method,
        pattern: &str,
        options: impl IntoIterator<Item = RouteOption>,
    ) -> Self {
        let mut info = RouteInfo {
            method,
            pattern: pattern.to_string(),
            annotations: Extensions::new(),
        };
        for RouteOption(apply) in options {
            apply(&mut info);
        }
        info
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Look up a typed annotation attached with [`RouteOption::annotation`].
    pub fn annotation<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.annotations.get::<T>()
    }
}

/// Customizes a route at registration time.
pub struct RouteOption(Box<dyn FnOnce(&mut RouteInfo) + Send>);

impl RouteOption {
    /// Attach `value` to the route; a later value of the same type replaces it.
    pub fn annotation<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self(Box::new(move |route| {
            route.annotations.insert(value);
        }))
    }
}

struct Route {
    info: Arc<RouteInfo>,
    matcher: AndMatcher,
    handler: HandlerFn,
}

/// Route table under construction.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware; the first one added runs outermost.
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Register `handler` for `method` and `pattern` (`/path` or `/prefix/*`).
    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handler: HandlerFn,
        options: impl IntoIterator<Item = RouteOption>,
    ) -> &mut Self {
        let info = RouteInfo::build(method.clone(), pattern, options);
        let matcher = AndMatcher::new(vec![
            Box::new(MethodMatcher::new(method)) as Box<dyn Matcher>,
            pattern_matcher(pattern),
        ]);

        tracing::debug!(method = %info.method, pattern = %info.pattern, "Route registered");
        self.routes.push(Route {
            info: Arc::new(info),
            matcher,
            handler,
        });
        self
    }

    /// Freeze the table into a tower service.
    pub fn into_service(self) -> RouterService {
        let routes = self
            .routes
            .into_iter()
            .map(|route| Route {
                handler: chain(&self.middleware, route.handler),
                ..route
            })
            .collect();

        RouterService {
            routes: Arc::new(routes),
        }
    }
}

/// A frozen route table serving axum requests.
#[derive(Clone)]
pub struct RouterService {
    routes: Arc<Vec<Route>>,
}

impl RouterService {
    /// Route `request`, run its handler and return what it wrote.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let conn = Arc::new(Connection::new());
        let recorder = Arc::new(ResponseRecorder::new(conn.clone()));
        let ctx = Context::new(request, recorder.clone(), conn);
        // Dropping the serving future (client went away) cancels the request.
        let _cancel = ctx.cancellation().guard();

        let route = self
            .routes
            .iter()
            .find(|route| route.matcher.matches(ctx.request()));

        match route {
            Some(route) => {
                let ctx = ctx.with_route(route.info.clone());
                (route.handler)(ctx).await;
            }
            None => {
                tracing::debug!(method = %ctx.method(), path = %ctx.path(), "No route matched");
                write_error(recorder.as_ref(), "404 page not found", 404);
            }
        }

        recorder.to_response()
    }
}

impl Service<Request<Body>> for RouterService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.dispatch(request).await) })
    }
}
