//! The real response sink.
//!
//! # Responsibilities
//! - Accumulate what a handler sends to the client (status, headers, body)
//! - Snapshot headers when the status line is sent, like a real connection
//! - Convert the result into an axum `Response`
//!
//! # Design Decisions
//! - Writes are append-only; nothing can be taken back once sent
//! - Supports flush and raw deadline control, not push or hijack
//! - Writes and flushes fail once the connection's write deadline has passed

use std::io;
use std::panic::Location;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::http::connection::Connection;
use crate::http::sink::{check_status_code, Deadlines, Flush, ResponseSink, SinkError};

#[derive(Debug)]
struct RecorderState {
    headers: HeaderMap,
    /// Headers as they were when the status line went out.
    sent_headers: Option<HeaderMap>,
    code: u16,
    body: Vec<u8>,
    written: bool,
    flushed: bool,
}

/// Records a response as it would reach the client.
#[derive(Debug)]
pub struct ResponseRecorder {
    state: Mutex<RecorderState>,
    conn: Arc<Connection>,
}

impl ResponseRecorder {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            state: Mutex::new(RecorderState {
                headers: HeaderMap::new(),
                sent_headers: None,
                code: 200,
                body: Vec::new(),
                written: false,
                flushed: false,
            }),
            conn,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
        self.state.lock().expect("recorder mutex poisoned")
    }

    fn write_header_locked(state: &mut RecorderState, code: u16, caller: &Location<'_>) {
        if state.written {
            tracing::warn!(caller = %caller, "superfluous write_header call");
            return;
        }
        state.written = true;
        state.code = code;
        state.sent_headers = Some(state.headers.clone());
    }

    /// Writes past the connection's write deadline fail like a timed-out socket.
    fn check_write_deadline(&self) -> Result<(), SinkError> {
        match self.conn.write_deadline() {
            Some(at) if Instant::now() >= at => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "write deadline exceeded",
            )
            .into()),
            _ => Ok(()),
        }
    }

    /// Headers the client would see.
    pub fn headers(&self) -> HeaderMap {
        let state = self.lock();
        state
            .sent_headers
            .clone()
            .unwrap_or_else(|| state.headers.clone())
    }

    pub fn body(&self) -> Vec<u8> {
        self.lock().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.lock().body).into_owned()
    }

    pub fn flushed(&self) -> bool {
        self.lock().flushed
    }

    /// Drain the recorded output into an axum response.
    pub fn to_response(&self) -> Response {
        let mut state = self.lock();
        let headers = state
            .sent_headers
            .take()
            .unwrap_or_else(|| std::mem::take(&mut state.headers));
        let body = std::mem::take(&mut state.body);
        let status = StatusCode::from_u16(state.code).unwrap_or(StatusCode::OK);
        drop(state);

        let mut response = Body::from(body).into_response();
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseSink for ResponseRecorder {
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
        self.check_write_deadline()?;
        let mut state = self.lock();
        if !state.written {
            Self::write_header_locked(&mut state, 200, Location::caller());
        }
        state.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> u16 {
        self.lock().code
    }

    fn written(&self) -> bool {
        self.lock().written
    }

    fn size(&self) -> usize {
        self.lock().body.len()
    }

    fn flusher(&self) -> Option<&dyn Flush> {
        Some(self)
    }

    fn deadlines(&self) -> Option<&dyn Deadlines> {
        Some(self)
    }
}

impl Flush for ResponseRecorder {
    fn flush(&self) -> Result<(), SinkError> {
        self.check_write_deadline()?;
        let mut state = self.lock();
        if !state.written {
            Self::write_header_locked(&mut state, 200, Location::caller());
        }
        state.flushed = true;
        Ok(())
    }
}

impl Deadlines for ResponseRecorder {
    fn set_read_deadline(&self, at: Instant) -> Result<(), SinkError> {
        self.conn.set_read_deadline(at);
        Ok(())
    }

    fn set_write_deadline(&self, at: Instant) -> Result<(), SinkError> {
        self.conn.set_write_deadline(at);
        Ok(())
    }
}
