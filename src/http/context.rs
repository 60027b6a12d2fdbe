//! Per-request handler context.
//!
//! # Responsibilities
//! - Carry the request head, the (lazily read) body and matched route info
//! - Carry the request's cancellation signal
//! - Bind the response sink the handler writes to
//!
//! # Design Decisions
//! - Cheap to clone; clones share the head, body slot and connection
//! - `clone_with` rebinds writer and cancellation for intercepting
//!   middleware, so a handler cannot tell it is being intercepted

use std::future::pending;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderValue, Method, Request};
use tokio::time::sleep_until;

use crate::http::connection::Connection;
use crate::http::sink::{ResponseSink, SinkError};
use crate::resilience::deadline::Cancellation;
use crate::routing::router::RouteInfo;

/// Errors reading the request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body already consumed")]
    AlreadyConsumed,
    #[error("request body read deadline exceeded")]
    DeadlineExceeded,
    #[error("failed to read request body: {0}")]
    Read(#[from] axum::Error),
}

#[derive(Clone)]
pub struct Context {
    head: Arc<Parts>,
    body: Arc<Mutex<Option<Body>>>,
    writer: Arc<dyn ResponseSink>,
    route: Option<Arc<RouteInfo>>,
    cancellation: Cancellation,
    conn: Arc<Connection>,
}

impl Context {
    pub fn new(request: Request<Body>, writer: Arc<dyn ResponseSink>, conn: Arc<Connection>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            head: Arc::new(parts),
            body: Arc::new(Mutex::new(Some(body))),
            writer,
            route: None,
            cancellation: Cancellation::new(),
            conn,
        }
    }

    pub fn with_route(mut self, route: Arc<RouteInfo>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// A child context writing to `writer` and observing `cancellation`.
    pub fn clone_with(&self, writer: Arc<dyn ResponseSink>, cancellation: Cancellation) -> Self {
        Self {
            writer,
            cancellation,
            ..self.clone()
        }
    }

    pub fn request(&self) -> &Parts {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn writer(&self) -> &Arc<dyn ResponseSink> {
        &self.writer
    }

    pub fn route(&self) -> Option<&RouteInfo> {
        self.route.as_deref()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Take ownership of the raw body. Later calls return `None`.
    pub fn take_body(&self) -> Option<Body> {
        self.body.lock().expect("body mutex poisoned").take()
    }

    /// Read the whole body, up to `limit` bytes.
    ///
    /// Fails with [`BodyError::DeadlineExceeded`] as soon as the connection's
    /// read deadline passes, including when it is moved while reading.
    pub async fn read_body(&self, limit: usize) -> Result<Bytes, BodyError> {
        let body = self.take_body().ok_or(BodyError::AlreadyConsumed)?;
        let read = axum::body::to_bytes(body, limit);
        tokio::pin!(read);

        let mut deadline = self.conn.watch_read_deadline();
        loop {
            let at = *deadline.borrow_and_update();
            let expired = async move {
                match at {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = expired => return Err(BodyError::DeadlineExceeded),
                res = &mut read => return res.map_err(BodyError::from),
                Ok(()) = deadline.changed() => continue,
            }
        }
    }

    /// Write `body` as `text/plain` with status `code`.
    #[track_caller]
    pub fn string(&self, code: u16, body: &str) -> Result<usize, SinkError> {
        self.writer.insert_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.writer.write_header(code);
        self.writer.write_str(body)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.head.method)
            .field("uri", &self.head.uri)
            .field("route", &self.route.as_ref().map(|r| r.pattern()))
            .finish()
    }
}
