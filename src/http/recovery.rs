//! Panic recovery middleware.
//!
//! # Responsibilities
//! - Catch handler panics before they tear down the connection task
//! - Log the panic message with request context
//! - Let a callback decide what (if anything) the client receives
//!
//! # Design Decisions
//! - Runs outermost, so a panic re-raised by the timeout middleware lands
//!   here exactly as if the handler had panicked in place

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::http::context::Context;
use crate::http::handler::{handler, HandlerFn, Middleware};
use crate::http::sink::{status_text, write_error};

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// Recover from handler panics, handing the payload to `on_panic`.
pub fn recovery<F>(on_panic: F) -> Middleware
where
    F: Fn(&Context, &(dyn Any + Send)) + Send + Sync + 'static,
{
    let on_panic = Arc::new(on_panic);
    Arc::new(move |next: HandlerFn| {
        let on_panic = on_panic.clone();
        handler(move |ctx: Context| {
            let next = next.clone();
            let on_panic = on_panic.clone();
            async move {
                let result = AssertUnwindSafe(next(ctx.clone())).catch_unwind().await;
                if let Err(payload) = result {
                    tracing::error!(
                        method = %ctx.method(),
                        path = %ctx.path(),
                        panic = %panic_message(payload.as_ref()),
                        "Handler panicked, recovering"
                    );
                    on_panic(&ctx, payload.as_ref());
                }
            }
        })
    })
}

/// Recovery replying 500 Internal Server Error unless a response was already sent.
pub fn default_recovery() -> Middleware {
    recovery(|ctx, _payload| {
        if !ctx.writer().written() {
            write_error(ctx.writer().as_ref(), status_text(500), 500);
        }
    })
}
