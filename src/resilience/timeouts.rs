//! Timeout enforcement.
//!
//! # Responsibilities
//! - Run the handler against a shadow writer, racing it against a deadline
//! - Commit the captured response, substitute a timeout response, or
//!   re-raise the handler's panic, depending on which signal arrives first
//! - Keep the real sink free of partial or interleaved writes
//!
//! # State Transitions
//! ```text
//! Idle → Racing: no filter skips and the resolved timeout is non-zero
//! Racing → Committed: handler finished first
//! Racing → Substituted: deadline (or upstream cancellation) first
//! Racing → Reraised: handler panicked first
//! ```
//!
//! # Design Decisions
//! - The handler task is never aborted; cancellation is cooperative through
//!   the derived context. A handler that ignores it keeps running detached
//!   and its late writes are absorbed by the writer's terminal error
//! - Upstream cancellation is reported as `Canceled`, only a genuine
//!   deadline expiry is reported as a handler timeout
//! - Body buffers come from a pool owned by the middleware instance

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::http::sink::{status_text, write_error};
use crate::http::{handler, Context, HandlerFn, Middleware};
use crate::observability::metrics;
use crate::resilience::deadline::CancelCause;
use crate::resilience::filter::FilterChain;
use crate::resilience::options::Options;
use crate::resilience::pool::{body_pool, scratch_pool, Pool, PoolStats};
use crate::resilience::resolver::{resolve_deadline, Resolver};
use crate::resilience::writer::TimeoutWriter;

/// How a request left the middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A filter or a zero timeout let the handler run without a deadline.
    Bypassed,
    /// The handler finished first and its response was delivered.
    Completed,
    /// The deadline fired first and the timeout response was delivered.
    TimedOut,
    /// The request was cancelled upstream before the handler finished.
    Canceled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Bypassed => "bypassed",
            Outcome::Completed => "completed",
            Outcome::TimedOut => "timed_out",
            Outcome::Canceled => "canceled",
        }
    }
}

enum Race {
    Completed,
    Expired(CancelCause),
    Failed(Box<dyn Any + Send + 'static>),
}

struct Shared {
    default: Duration,
    filters: FilterChain,
    resolver: Option<Arc<dyn Resolver>>,
    response: HandlerFn,
    abort_request_body: bool,
    bodies: Arc<Pool<Vec<u8>>>,
    scratch: Arc<Pool<Vec<u8>>>,
}

/// Middleware making sure handlers don't run past their deadline.
///
/// When a handler exceeds its time limit the client gets a
/// 503 Service Unavailable (or the configured response) and the handler's
/// writer starts returning [`crate::http::SinkError::HandlerTimeout`].
#[derive(Clone)]
pub struct Timeout {
    shared: Arc<Shared>,
}

impl Timeout {
    /// `default` applies to requests no route annotation or resolver covers;
    /// zero leaves those requests unenforced.
    pub fn new(default: Duration, options: Options) -> Self {
        let Options {
            filters,
            response,
            resolver,
            abort_request_body,
        } = options;

        Self {
            shared: Arc::new(Shared {
                default,
                filters,
                resolver,
                response: response.unwrap_or_else(default_timeout_response),
                abort_request_body,
                bodies: body_pool(),
                scratch: scratch_pool(),
            }),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.shared.default
    }

    /// Body buffer pool accounting.
    pub fn buffer_stats(&self) -> PoolStats {
        self.shared.bodies.stats()
    }

    /// Bulk-copy scratch pool accounting.
    pub fn scratch_stats(&self) -> PoolStats {
        self.shared.scratch.stats()
    }

    /// This timeout as router middleware.
    pub fn middleware(&self) -> Middleware {
        let this = self.clone();
        Arc::new(move |next: HandlerFn| this.wrap(next))
    }

    /// Wrap a single handler.
    pub fn wrap(&self, next: HandlerFn) -> HandlerFn {
        let this = self.clone();
        handler(move |ctx: Context| {
            let this = this.clone();
            let next = next.clone();
            async move {
                this.serve(ctx, next).await;
            }
        })
    }

    /// Run `next` for `ctx` under the resolved deadline.
    ///
    /// A panic in `next` is resumed here with its original payload.
    pub async fn serve(&self, ctx: Context, next: HandlerFn) -> Outcome {
        let started = Instant::now();

        if self.shared.filters.should_skip(&ctx) {
            tracing::trace!(path = %ctx.path(), "Timeout bypassed by filter");
            next(ctx).await;
            metrics::record_outcome(Outcome::Bypassed.as_str(), started.elapsed());
            return Outcome::Bypassed;
        }

        let resolved = resolve_deadline(&ctx, self.shared.resolver.as_deref(), self.shared.default);
        if resolved.is_disabled() {
            tracing::trace!(path = %ctx.path(), source = resolved.source.as_str(), "Timeout disabled");
            next(ctx).await;
            metrics::record_outcome(Outcome::Bypassed.as_str(), started.elapsed());
            return Outcome::Bypassed;
        }

        let deadline = ctx.cancellation().with_timeout(resolved.duration);
        let _cancel = deadline.guard();

        let real = ctx.writer().clone();
        let shadow = Arc::new(TimeoutWriter::new(
            real.clone(),
            self.shared.bodies.acquire(),
            self.shared.scratch.clone(),
        ));
        let child = ctx.clone_with(shadow.clone(), deadline.clone());

        let mut task = tokio::spawn(async move {
            next(child).await;
        });

        let race = tokio::select! {
            joined = &mut task => match joined {
                Ok(()) => Race::Completed,
                Err(err) if err.is_panic() => Race::Failed(err.into_panic()),
                // Only a runtime shutdown aborts the task.
                Err(_) => Race::Expired(CancelCause::Canceled),
            },
            cause = deadline.done() => Race::Expired(cause),
        };

        match race {
            Race::Completed => {
                shadow.commit();
                metrics::record_outcome(Outcome::Completed.as_str(), started.elapsed());
                Outcome::Completed
            }
            Race::Expired(cause) => {
                shadow.expire(cause);

                if self.shared.abort_request_body {
                    if let Some(deadlines) = real.deadlines() {
                        let _ = deadlines.set_read_deadline(Instant::now());
                    }
                }

                let outcome = match cause {
                    CancelCause::DeadlineExceeded => Outcome::TimedOut,
                    CancelCause::Canceled => Outcome::Canceled,
                };
                tracing::warn!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    timeout_ms = resolved.duration.as_millis() as u64,
                    source = resolved.source.as_str(),
                    outcome = outcome.as_str(),
                    "Handler did not finish before its deadline"
                );

                (self.shared.response)(ctx).await;
                metrics::record_outcome(outcome.as_str(), started.elapsed());
                outcome
            }
            Race::Failed(payload) => {
                shadow.release();
                drop(shadow);
                metrics::record_outcome("panicked", started.elapsed());
                std::panic::resume_unwind(payload)
            }
        }
    }
}

impl std::fmt::Debug for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("default", &self.shared.default)
            .field("filters", &self.shared.filters.len())
            .field("abort_request_body", &self.shared.abort_request_body)
            .finish()
    }
}

/// Build the timeout middleware with a global default and options.
pub fn middleware(default: Duration, options: Options) -> Middleware {
    Timeout::new(default, options).middleware()
}

/// Responds 503 Service Unavailable with a short plain-text body.
pub fn default_timeout_response() -> HandlerFn {
    handler(|ctx: Context| async move {
        write_error(ctx.writer().as_ref(), status_text(503), 503);
    })
}
