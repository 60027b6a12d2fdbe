//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use tokio::sync::oneshot;
use tower::ServiceExt;

use timeout_gate::http::{handler, recovery, Context, HandlerFn, Middleware};
use timeout_gate::routing::{RouteOption, Router, RouterService};

/// A response as the client sees it.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Send `request` through `service` and collect the reply.
pub async fn send(service: &RouterService, request: Request<Body>) -> Reply {
    let response = service.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

pub async fn get(service: &RouterService, path: &str) -> Reply {
    send(service, Request::get(path).body(Body::empty()).unwrap()).await
}

/// Sleep `delay` without looking at cancellation, then reply `code` / `body`.
pub fn sleep_then(delay: Duration, code: u16, body: &'static str) -> HandlerFn {
    handler(move |ctx: Context| async move {
        tokio::time::sleep(delay).await;
        let _ = ctx.string(code, body);
    })
}

/// Router with `middleware` and a single GET route.
pub fn single_route(
    middleware: Vec<Middleware>,
    path: &str,
    endpoint: HandlerFn,
    options: Vec<RouteOption>,
) -> RouterService {
    let mut router = middleware
        .into_iter()
        .fold(Router::new(), |router, m| router.with_middleware(m));
    router.handle(Method::GET, path, endpoint, options);
    router.into_service()
}

/// Recovery middleware that hands the panic payload to `inspect`.
pub fn capturing_recovery<F>(inspect: F) -> Middleware
where
    F: Fn(&(dyn Any + Send)) + Send + Sync + 'static,
{
    recovery(move |ctx, payload| {
        inspect(payload);
        let _ = ctx.string(500, "recovered");
    })
}

/// One-shot slot a handler can report into exactly once.
pub fn report_slot<T: Send + 'static>() -> (Arc<Mutex<Option<oneshot::Sender<T>>>>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

pub fn report<T>(slot: &Mutex<Option<oneshot::Sender<T>>>, value: T) {
    if let Some(tx) = slot.lock().unwrap().take() {
        let _ = tx.send(value);
    }
}
