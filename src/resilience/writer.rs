//! Shadow response writer used while a handler races its deadline.
//!
//! # Responsibilities
//! - Capture headers, status and body without releasing them to the client
//! - Copy the captured response to the real sink on commit
//! - Reject every write once an outcome is decided
//!
//! # Design Decisions
//! - One mutex guards the whole record; critical sections are short
//! - The terminal error is the enforcement point: once set, writes return
//!   it and never touch the body or the byte counter
//! - The body buffer is on loan from a pool and goes back the moment an
//!   outcome is decided (or when the writer drops, whichever comes first)
//! - Push is proxied to the real sink until the outcome is decided; flush,
//!   hijack and raw deadlines are always rejected

use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::http::sink::{
    check_status_code, Deadlines, Flush, Hijack, HijackedIo, Push, PushOptions, ResponseSink,
    SinkError,
};
use crate::resilience::deadline::CancelCause;
use crate::resilience::pool::{Pool, Pooled, COPY_BUF_SIZE};

#[derive(Debug)]
struct ShadowState {
    headers: HeaderMap,
    code: u16,
    body: Option<Pooled<Vec<u8>>>,
    err: Option<SinkError>,
    written: bool,
    size: usize,
}

/// In-memory stand-in for the real sink.
pub struct TimeoutWriter {
    real: Arc<dyn ResponseSink>,
    state: Mutex<ShadowState>,
    scratch: Arc<Pool<Vec<u8>>>,
}

impl TimeoutWriter {
    pub fn new(
        real: Arc<dyn ResponseSink>,
        body: Pooled<Vec<u8>>,
        scratch: Arc<Pool<Vec<u8>>>,
    ) -> Self {
        Self {
            real,
            state: Mutex::new(ShadowState {
                headers: HeaderMap::new(),
                code: 200,
                body: Some(body),
                err: None,
                written: false,
                size: 0,
            }),
            scratch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ShadowState> {
        self.state.lock().expect("timeout writer mutex poisoned")
    }

    fn write_header_locked(state: &mut ShadowState, code: u16, caller: &Location<'_>) {
        if state.err.is_some() {
            return;
        }
        if state.written {
            tracing::warn!(caller = %caller, "superfluous write_header call");
            return;
        }
        state.written = true;
        state.code = code;
    }

    /// The terminal error, once an outcome has been decided.
    pub fn terminal_error(&self) -> Option<SinkError> {
        self.lock().err.clone()
    }


    /// Send the captured response to the real sink. Runs at most once.
    pub(crate) fn commit(&self) {
        let mut state = self.lock();
        if state.err.is_some() {
            return;
        }

        for name in state.headers.keys() {
            let mut values = state.headers.get_all(name).iter();
            if let Some(first) = values.next() {
                self.real.insert_header(name.clone(), first.clone());
            }
            for value in values {
                self.real.append_header(name.clone(), value.clone());
            }
        }
        self.real.write_header(state.code);
        if let Some(body) = state.body.take() {
            if let Err(e) = self.real.write(&body[..]) {
                tracing::warn!(
                    error = %e,
                    status = state.code,
                    bytes = body.len(),
                    "Failed to deliver buffered response"
                );
            }
        }
        state.err = Some(SinkError::Decided);
    }

    /// Mark the writer expired after the deadline context ended with `cause`.
    pub(crate) fn expire(&self, cause: CancelCause) {
        let mut state = self.lock();
        if state.err.is_some() {
            return;
        }
        state.err = Some(SinkError::from(cause));
        state.body = None;
    }

    /// Give the body buffer back without sending anything.
    pub(crate) fn release(&self) {
        let mut state = self.lock();
        state.err.get_or_insert(SinkError::Decided);
        state.body = None;
    }
}

impl std::fmt::Debug for TimeoutWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutWriter")
            .field("state", &*self.lock())
            .finish()
    }
}

impl ResponseSink for TimeoutWriter {
    fn header_view(&self) -> HeaderMap {
        self.lock().headers.clone()
    }

    fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.append(name, value);
    }

    fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    #[track_caller]
    fn write_header(&self, code: u16) {
        check_status_code(code);
        let caller = Location::caller();
        Self::write_header_locked(&mut self.lock(), code, caller);
    }

    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        let mut state = self.lock();
        if let Some(err) = &state.err {
            return Err(err.clone());
        }
        if !state.written {
            Self::write_header_locked(&mut state, 200, Location::caller());
        }

        let Some(body) = state.body.as_mut() else {
            return Err(SinkError::Decided);
        };
        body.extend_from_slice(buf);
        state.size += buf.len();
        Ok(buf.len())
    }

    fn status(&self) -> u16 {
        self.lock().code
    }

    fn written(&self) -> bool {
        self.lock().written
    }

    fn size(&self) -> usize {
        self.lock().size
    }

    /// Bulk copy through a pooled scratch buffer, one `write` per chunk.
    fn read_from<'a>(
        &'a self,
        src: &'a mut (dyn AsyncRead + Unpin + Send),
    ) -> BoxFuture<'a, Result<u64, SinkError>> {
        Box::pin(async move {
            let mut scratch = self.scratch.acquire();
            scratch.resize(COPY_BUF_SIZE, 0);

            let mut copied = 0u64;
            loop {
                let n = src.read(&mut scratch[..]).await?;
                if n == 0 {
                    return Ok(copied);
                }
                copied += self.write(&scratch[..n])? as u64;
            }
        })
    }

    fn pusher(&self) -> Option<&dyn Push> {
        Some(self)
    }

    fn flusher(&self) -> Option<&dyn Flush> {
        Some(self)
    }

    fn hijacker(&self) -> Option<&dyn Hijack> {
        Some(self)
    }

    fn deadlines(&self) -> Option<&dyn Deadlines> {
        Some(self)
    }
}

impl Push for TimeoutWriter {
    fn push(&self, target: &str, opts: &PushOptions) -> Result<(), SinkError> {
        let state = self.lock();
        if state.err.is_some() {
            return Err(SinkError::Unsupported);
        }
        match self.real.pusher() {
            Some(pusher) => pusher.push(target, opts),
            None => Err(SinkError::Unsupported),
        }
    }
}

impl Flush for TimeoutWriter {
    fn flush(&self) -> Result<(), SinkError> {
        Err(SinkError::Unsupported)
    }
}

impl Hijack for TimeoutWriter {
    fn hijack(&self) -> Result<Box<dyn HijackedIo>, SinkError> {
        Err(SinkError::Unsupported)
    }
}

impl Deadlines for TimeoutWriter {
    fn set_read_deadline(&self, _at: Instant) -> Result<(), SinkError> {
        Err(SinkError::Unsupported)
    }

    fn set_write_deadline(&self, _at: Instant) -> Result<(), SinkError> {
        Err(SinkError::Unsupported)
    }
}
