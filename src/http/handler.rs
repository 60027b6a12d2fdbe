//! Handler and middleware types.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::context::Context;

/// A request handler writing its response through `ctx.writer()`.
pub type HandlerFn = Arc<dyn Fn(Context) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps a handler in another handler.
pub type Middleware = Arc<dyn Fn(HandlerFn) -> HandlerFn + Send + Sync>;

/// Box an async function as a [`HandlerFn`].
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Apply `middleware` around `endpoint`; the first entry ends up outermost.
pub fn chain(middleware: &[Middleware], endpoint: HandlerFn) -> HandlerFn {
    middleware
        .iter()
        .rev()
        .fold(endpoint, |next, layer| layer(next))
}
