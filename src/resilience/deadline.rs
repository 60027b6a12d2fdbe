//! Cancellation-bearing deadline contexts.
//!
//! # Responsibilities
//! - Give every request a root cancellation signal
//! - Derive children bounded by a deadline (never later than the parent's)
//! - Report *why* a context ended: generic cancellation vs. deadline expiry
//!
//! # Design Decisions
//! - Built on `tokio_util::sync::CancellationToken`; parent cancellation
//!   propagates to children through the token tree
//! - Deadlines are lazy: no timer task is spawned, expiry is observed by
//!   whoever awaits [`Cancellation::done`] or calls [`Cancellation::err`]
//! - The first recorded cause wins and is never overwritten

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelCause {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A cloneable handle on a request-scoped cancellation signal.
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: OnceLock<CancelCause>,
    parent: Option<Cancellation>,
}

impl Cancellation {
    /// Create a root context with no deadline.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                deadline: None,
                cause: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derive a child that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Cancellation {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `at`, or at the parent's deadline if that is earlier.
    pub fn with_deadline(&self, at: Instant) -> Cancellation {
        let deadline = match self.deadline() {
            Some(parent) if parent < at => parent,
            _ => at,
        };

        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                deadline: Some(deadline),
                cause: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// The instant this context expires, if it has one.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.cancel_with(CancelCause::Canceled);
    }

    fn cancel_with(&self, cause: CancelCause) {
        let _ = self.inner.cause.set(cause);
        self.inner.token.cancel();
    }

    /// The reason this context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<CancelCause> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(*cause);
        }

        if self.inner.token.is_cancelled() {
            // Cancelled through the token tree: report the ancestor's reason.
            let inherited = self
                .inner
                .parent
                .as_ref()
                .and_then(Cancellation::err)
                .unwrap_or(CancelCause::Canceled);
            return Some(inherited);
        }

        match self.inner.deadline {
            Some(at) if Instant::now() >= at => {
                self.cancel_with(CancelCause::DeadlineExceeded);
                self.inner.cause.get().copied()
            }
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or expired.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) -> CancelCause {
        match self.inner.deadline {
            Some(at) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = sleep_until(at) => self.cancel_with(CancelCause::DeadlineExceeded),
                }
            }
            None => self.inner.token.cancelled().await,
        }

        self.err().unwrap_or(CancelCause::Canceled)
    }

    /// A guard that cancels this context when dropped.
    pub fn guard(&self) -> CancelGuard {
        CancelGuard {
            cancellation: self.clone(),
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels the wrapped context on drop.
#[derive(Debug)]
pub struct CancelGuard {
    cancellation: Cancellation,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
