//! Response sinks.
//!
//! # Responsibilities
//! - Define the writer surface handlers use (`ResponseSink`)
//! - Expose optional connection capabilities as explicit queries
//! - Provide the shared status-code check and plain-text error helper
//!
//! # Design Decisions
//! - Sinks are shared across tasks, so every method takes `&self`
//! - Optional capabilities (push, flush, hijack, deadlines) are separate
//!   traits; a sink returns `Some(self)` only for those it can honour
//! - An out-of-range status code is a programmer error and panics

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::Instant;

use crate::resilience::deadline::CancelCause;

/// Errors returned by sink operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The deadline fired; this writer no longer reaches the client.
    #[error("http: Handler timeout")]
    HandlerTimeout,
    /// The request was cancelled upstream before the handler finished.
    #[error("context canceled")]
    Canceled,
    /// The response was already handed to the client.
    #[error("http: response outcome already decided")]
    Decided,
    #[error("feature not supported")]
    Unsupported,
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(Arc::new(err))
    }
}

/// The terminal error of a writer whose request context ended with `cause`.
impl From<CancelCause> for SinkError {
    fn from(cause: CancelCause) -> Self {
        match cause {
            CancelCause::Canceled => SinkError::Canceled,
            CancelCause::DeadlineExceeded => SinkError::HandlerTimeout,
        }
    }
}

/// Options for a server push.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub method: Option<Method>,
    pub headers: HeaderMap,
}

pub trait Push: Send + Sync {
    fn push(&self, target: &str, opts: &PushOptions) -> Result<(), SinkError>;
}

pub trait Flush: Send + Sync {
    fn flush(&self) -> Result<(), SinkError>;
}

/// The raw connection handed over by a successful hijack.
pub trait HijackedIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> HijackedIo for T {}

pub trait Hijack: Send + Sync {
    fn hijack(&self) -> Result<Box<dyn HijackedIo>, SinkError>;
}

/// Raw read/write deadline control on the underlying connection.
pub trait Deadlines: Send + Sync {
    fn set_read_deadline(&self, at: Instant) -> Result<(), SinkError>;
    fn set_write_deadline(&self, at: Instant) -> Result<(), SinkError>;
}

/// The output side of a request.
pub trait ResponseSink: Send + Sync {
    /// Snapshot of the pending response headers.
    fn header_view(&self) -> HeaderMap;

    fn append_header(&self, name: HeaderName, value: HeaderValue);

    fn insert_header(&self, name: HeaderName, value: HeaderValue);

    /// Send the status line. Only the first call has an effect.
    #[track_caller]
    fn write_header(&self, code: u16);

    /// Append body bytes, implicitly sending a 200 status first.
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError>;

    fn write_str(&self, s: &str) -> Result<usize, SinkError> {
        self.write(s.as_bytes())
    }

    /// Copy `src` to the body until EOF through repeated [`ResponseSink::write`]
    /// calls. The first write error stops the copy and is returned.
    fn read_from<'a>(
        &'a self,
        src: &'a mut (dyn AsyncRead + Unpin + Send),
    ) -> BoxFuture<'a, Result<u64, SinkError>> {
        Box::pin(async move {
            let mut buf = vec![0u8; DEFAULT_COPY_CHUNK];
            let mut copied = 0u64;
            loop {
                let n = src.read(&mut buf).await?;
                if n == 0 {
                    return Ok(copied);
                }
                copied += self.write(&buf[..n])? as u64;
            }
        })
    }

    fn status(&self) -> u16;

    /// Whether the status has been sent.
    fn written(&self) -> bool;

    /// Body bytes written so far.
    fn size(&self) -> usize;

    fn pusher(&self) -> Option<&dyn Push> {
        None
    }

    fn flusher(&self) -> Option<&dyn Flush> {
        None
    }

    fn hijacker(&self) -> Option<&dyn Hijack> {
        None
    }

    fn deadlines(&self) -> Option<&dyn Deadlines> {
        None
    }
}

const DEFAULT_COPY_CHUNK: usize = 8 * 1024;

/// Panic on status codes outside `100..=999`.
#[track_caller]
pub fn check_status_code(code: u16) {
    if !(100..=999).contains(&code) {
        panic!("invalid status code {code}");
    }
}

/// Canonical reason phrase for `code`, or an empty string.
pub fn status_text(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("")
}

/// Reply with a plain-text error message and status `code`.
#[track_caller]
pub fn write_error(sink: &dyn ResponseSink, message: &str, code: u16) {
    sink.insert_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    sink.insert_header(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    sink.write_header(code);
    let _ = sink.write_str(message);
    let _ = sink.write_str("\n");
}
