//! End-to-end behaviour of the timeout middleware behind the router.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderName, Request, StatusCode};

use timeout_gate::http::{
    default_recovery, handler, panic_message, BodyError, Connection, Context, PushOptions,
    ResponseRecorder, ResponseSink, SinkError,
};
use timeout_gate::resilience::{self, MatcherFilter, Options, Outcome, Timeout};
use timeout_gate::routing::PathPrefixMatcher;

mod common;
use common::{capturing_recovery, get, report, report_slot, send, single_route, sleep_then};

const MICRO: Duration = Duration::from_micros(1);

#[tokio::test(start_paused = true)]
async fn test_slow_handler_gets_default_response() {
    let timeout = Timeout::new(50 * MICRO, Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        sleep_then(10_000 * MICRO, 201, "Created"),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.body, "Service Unavailable\n");
    assert_eq!(reply.headers[CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(reply.headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(timeout.buffer_stats().outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fast_handler_passes_through() {
    let timeout = Timeout::new(1_000_000 * MICRO, Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        sleep_then(10_000 * MICRO, 201, "Created"),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body, "Created");
}

#[tokio::test(start_paused = true)]
async fn test_route_override_beats_global() {
    let timeout = Timeout::new(MICRO, Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        sleep_then(10_000 * MICRO, 201, "Created"),
        vec![resilience::after(2_000_000 * MICRO)],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body, "Created");
}

#[tokio::test(start_paused = true)]
async fn test_disabled_route_always_completes() {
    let timeout = Timeout::new(MICRO, Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        sleep_then(Duration::from_secs(3600), 201, "Created"),
        vec![resilience::none()],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body, "Created");
    // Bypassed requests never touch the pool.
    assert_eq!(timeout.buffer_stats().acquired, 0);
}

#[derive(Debug, PartialEq)]
struct Boom(u32);

#[tokio::test]
async fn test_panic_reaches_outer_recovery_unchanged() {
    let seen: Arc<Mutex<Option<u32>>> = Arc::default();
    let seen_in_recovery = seen.clone();
    let recovery = capturing_recovery(move |payload: &(dyn Any + Send)| {
        *seen_in_recovery.lock().unwrap() = payload.downcast_ref::<Boom>().map(|b| b.0);
    });

    let timeout = Timeout::new(Duration::from_secs(3600), Options::new());
    let service = single_route(
        vec![recovery, timeout.middleware()],
        "/",
        handler(|_ctx: Context| async move {
            std::panic::panic_any(Boom(7));
        }),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(*seen.lock().unwrap(), Some(7));
    // Only the recovery layer wrote; the timeout middleware emitted nothing.
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "recovered");
    assert_eq!(timeout.buffer_stats().outstanding(), 0);
}

#[tokio::test]
async fn test_panic_message_survives_default_recovery() {
    let message: Arc<Mutex<String>> = Arc::default();
    let captured = message.clone();
    let recovery = capturing_recovery(move |payload: &(dyn Any + Send)| {
        *captured.lock().unwrap() = panic_message(payload).to_string();
    });

    let timeout = Timeout::new(Duration::from_secs(3600), Options::new());
    let service = single_route(
        vec![recovery, timeout.middleware()],
        "/",
        handler(|_ctx: Context| async move {
            panic!("handler exploded");
        }),
        vec![],
    );
    get(&service, "/").await;
    assert_eq!(*message.lock().unwrap(), "handler exploded");

    let service = single_route(
        vec![default_recovery(), timeout.middleware()],
        "/",
        handler(|_ctx: Context| async move {
            panic!("again");
        }),
        vec![],
    );
    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "Internal Server Error\n");
}

#[tokio::test(start_paused = true)]
async fn test_handler_output_delivered_exactly() {
    let timeout = Timeout::new(Duration::from_secs(1), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        handler(|ctx: Context| async move {
            let w = ctx.writer();
            let tag = HeaderName::from_static("x-tag");
            w.append_header(tag.clone(), HeaderValue::from_static("a"));
            w.append_header(tag, HeaderValue::from_static("b"));
            w.write_header(202);
            w.write_str("part one, ").unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            w.write(b"part two").unwrap();
            assert_eq!(w.size(), 18);
        }),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.body, "part one, part two");
    let tags: Vec<&str> = reply
        .headers
        .get_all("x-tag")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(tags, ["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_superfluous_status_keeps_first() {
    let timeout = Timeout::new(Duration::from_secs(1), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        handler(|ctx: Context| async move {
            ctx.writer().write_header(201);
            ctx.writer().write_header(500);
            assert_eq!(ctx.writer().status(), 201);
            let _ = ctx.writer().write_str("first wins");
        }),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body, "first wins");
}

#[tokio::test(start_paused = true)]
async fn test_custom_response() {
    let options = Options::new().with_response(handler(|ctx: Context| async move {
        let _ = ctx.string(504, "too slow");
    }));
    let timeout = Timeout::new(Duration::from_millis(5), options);
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        sleep_then(Duration::from_secs(1), 200, "late"),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(reply.body, "too slow");
}

#[tokio::test(start_paused = true)]
async fn test_resolver_priority() {
    let options = Options::new().with_resolver(|ctx: &Context| -> Option<Duration> {
        ctx.header("x-budget-ms")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
    });
    let timeout = Timeout::new(Duration::from_millis(50), options);
    let endpoint = sleep_then(Duration::from_millis(200), 200, "ok");
    let service = single_route(vec![timeout.middleware()], "/", endpoint.clone(), vec![]);

    // Resolver declines: global default applies.
    assert_eq!(get(&service, "/").await.status, StatusCode::SERVICE_UNAVAILABLE);

    // Resolver extends the budget.
    let request = Request::get("/")
        .header("x-budget-ms", "1000")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&service, request).await.status, StatusCode::OK);

    // Resolver disables enforcement.
    let request = Request::get("/")
        .header("x-budget-ms", "0")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&service, request).await.status, StatusCode::OK);

    // A route override is never consulted against the resolver.
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        endpoint,
        vec![resilience::after(Duration::from_millis(10))],
    );
    let request = Request::get("/")
        .header("x-budget-ms", "1000")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&service, request).await.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn test_zero_default_and_route_override() {
    let timeout = Timeout::new(Duration::ZERO, Options::new());
    let endpoint = sleep_then(Duration::from_secs(1), 200, "ok");

    let service = single_route(vec![timeout.middleware()], "/", endpoint.clone(), vec![]);
    assert_eq!(get(&service, "/").await.status, StatusCode::OK);
    assert_eq!(timeout.buffer_stats().acquired, 0);

    let service = single_route(
        vec![timeout.middleware()],
        "/",
        endpoint,
        vec![resilience::after(Duration::from_millis(10))],
    );
    assert_eq!(get(&service, "/").await.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn test_filters_bypass_enforcement() {
    let options = Options::new()
        .with_filter(MatcherFilter(PathPrefixMatcher::new("/stream/")))
        .with_filter(|ctx: &Context| ctx.header("upgrade").is_some());
    let timeout = Timeout::new(Duration::from_millis(10), options);
    let service = single_route(
        vec![timeout.middleware()],
        "/*",
        sleep_then(Duration::from_millis(100), 200, "ok"),
        vec![],
    );

    assert_eq!(get(&service, "/stream/events").await.status, StatusCode::OK);

    let request = Request::get("/chat")
        .header("upgrade", "websocket")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&service, request).await.status, StatusCode::OK);

    assert_eq!(get(&service, "/other").await.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(timeout.buffer_stats().acquired, 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_write_is_rejected() {
    let (slot, rx) = report_slot::<Result<usize, SinkError>>();
    let timeout = Timeout::new(Duration::from_millis(10), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        handler(move |ctx: Context| {
            let slot = slot.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                ctx.writer().write_header(201);
                report(&slot, ctx.writer().write_str("too late"));
            }
        }),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);

    let late = rx.await.unwrap();
    assert!(matches!(late, Err(SinkError::HandlerTimeout)));
    assert_eq!(late.unwrap_err().to_string(), "http: Handler timeout");
}

#[tokio::test(start_paused = true)]
async fn test_cooperative_handler_sees_deadline() {
    let (slot, rx) = report_slot::<(resilience::CancelCause, bool)>();
    let timeout = Timeout::new(Duration::from_millis(10), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        handler(move |ctx: Context| {
            let slot = slot.clone();
            async move {
                let cause = ctx.cancellation().done().await;
                report(&slot, (cause, ctx.cancellation().deadline().is_some()));
            }
        }),
        vec![],
    );

    assert_eq!(get(&service, "/").await.status, StatusCode::SERVICE_UNAVAILABLE);
    let (cause, has_deadline) = rx.await.unwrap();
    assert_eq!(cause, resilience::CancelCause::DeadlineExceeded);
    assert!(has_deadline);
}

#[tokio::test(start_paused = true)]
async fn test_intercepted_capabilities_are_unsupported() {
    let (slot, rx) = report_slot::<[Option<Result<(), SinkError>>; 5]>();
    let timeout = Timeout::new(Duration::from_secs(1), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        handler(move |ctx: Context| {
            let slot = slot.clone();
            async move {
                let w = ctx.writer();
                let results = [
                    w.flusher().map(|f| f.flush()),
                    w.hijacker().map(|h| h.hijack().map(|_| ())),
                    w.deadlines()
                        .map(|d| d.set_read_deadline(tokio::time::Instant::now())),
                    w.deadlines()
                        .map(|d| d.set_write_deadline(tokio::time::Instant::now())),
                    // The recorder underneath cannot push either.
                    w.pusher().map(|p| p.push("/style.css", &PushOptions::default())),
                ];
                report(&slot, results);
                let _ = ctx.string(200, "ok");
            }
        }),
        vec![],
    );

    assert_eq!(get(&service, "/").await.status, StatusCode::OK);
    for result in rx.await.unwrap() {
        assert!(matches!(result, Some(Err(SinkError::Unsupported))), "{result:?}");
    }
}

fn context_with(body: Body) -> (Context, Arc<ResponseRecorder>, Arc<Connection>) {
    let conn = Arc::new(Connection::new());
    let recorder = Arc::new(ResponseRecorder::new(conn.clone()));
    let request = Request::post("/upload").body(body).unwrap();
    let ctx = Context::new(request, recorder.clone(), conn.clone());
    (ctx, recorder, conn)
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cuts_off_request_body() {
    let (slot, rx) = report_slot::<Result<Bytes, BodyError>>();
    let endpoint = handler(move |ctx: Context| {
        let slot = slot.clone();
        async move {
            report(&slot, ctx.read_body(1024).await);
        }
    });

    let stalled = futures_util::stream::pending::<Result<Bytes, std::io::Error>>();
    let (ctx, recorder, conn) = context_with(Body::from_stream(stalled));
    let timeout = Timeout::new(Duration::from_millis(10), Options::new());

    assert_eq!(timeout.serve(ctx, endpoint).await, Outcome::TimedOut);
    assert!(conn.read_deadline().is_some());
    assert_eq!(recorder.status(), 503);
    assert!(matches!(rx.await.unwrap(), Err(BodyError::DeadlineExceeded)));
}

#[tokio::test(start_paused = true)]
async fn test_request_body_left_open_when_disabled() {
    let (ctx, recorder, conn) = context_with(Body::empty());
    let timeout = Timeout::new(
        Duration::from_millis(10),
        Options::new().abort_request_body(false),
    );

    let outcome = timeout
        .serve(ctx, sleep_then(Duration::from_secs(1), 200, "late"))
        .await;
    assert_eq!(outcome, Outcome::TimedOut);
    assert!(conn.read_deadline().is_none());
    assert_eq!(recorder.status(), 503);
}

#[tokio::test(start_paused = true)]
async fn test_upstream_cancellation_is_not_a_timeout() {
    let (slot, rx) = report_slot::<Result<usize, SinkError>>();
    let endpoint = handler(move |ctx: Context| {
        let slot = slot.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            report(&slot, ctx.writer().write_str("late"));
        }
    });

    let (ctx, recorder, _conn) = context_with(Body::empty());
    let upstream = ctx.cancellation().clone();
    let timeout = Timeout::new(Duration::from_secs(60), Options::new());

    let serving = tokio::spawn({
        let timeout = timeout.clone();
        async move { timeout.serve(ctx, endpoint).await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    upstream.cancel();

    assert_eq!(serving.await.unwrap(), Outcome::Canceled);
    assert_eq!(recorder.status(), 503);
    assert!(matches!(rx.await.unwrap(), Err(SinkError::Canceled)));
}

#[tokio::test(start_paused = true)]
async fn test_pool_balanced_across_outcomes() {
    let timeout = Timeout::new(Duration::from_millis(20), Options::new());
    let mut router = timeout_gate::routing::Router::new()
        .with_middleware(default_recovery())
        .with_middleware(timeout.middleware());
    router
        .handle(
            axum::http::Method::GET,
            "/fast",
            sleep_then(Duration::from_millis(1), 200, "fast"),
            [],
        )
        .handle(
            axum::http::Method::GET,
            "/slow",
            sleep_then(Duration::from_millis(100), 200, "slow"),
            [],
        )
        .handle(
            axum::http::Method::GET,
            "/boom",
            handler(|_ctx: Context| async move {
                panic!("boom");
            }),
            [],
        );
    let service = router.into_service();

    for _ in 0..5 {
        assert_eq!(get(&service, "/fast").await.status, StatusCode::OK);
        assert_eq!(get(&service, "/slow").await.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get(&service, "/boom").await.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    // Let the detached slow handlers finish too.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = timeout.buffer_stats();
    assert_eq!(stats.acquired, 15);
    assert_eq!(stats.released, 15);
    assert!(stats.idle >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_handler_streams_reader_through_writer() {
    let payload: String = (0..5_000).map(|i| format!("{i:07}\n")).collect();
    assert!(payload.len() > 32 * 1024);

    let (slot, rx) = report_slot::<Result<u64, SinkError>>();
    let body = payload.clone();
    let timeout = Timeout::new(Duration::from_secs(1), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        handler(move |ctx: Context| {
            let slot = slot.clone();
            let body = body.clone();
            async move {
                ctx.writer().write_header(200);
                let mut src = body.as_bytes();
                report(&slot, ctx.writer().read_from(&mut src).await);
            }
        }),
        vec![],
    );

    let reply = get(&service, "/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, payload);
    assert_eq!(rx.await.unwrap().unwrap(), payload.len() as u64);

    let scratch = timeout.scratch_stats();
    assert_eq!(scratch.acquired, 1);
    assert_eq!(scratch.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_completion_and_deadline() {
    let timeout = Timeout::new(Duration::from_millis(10), Options::new());
    let service = single_route(
        vec![timeout.middleware()],
        "/",
        sleep_then(Duration::from_millis(10), 201, "Created"),
        vec![],
    );

    for _ in 0..200 {
        let reply = get(&service, "/").await;
        match reply.status {
            StatusCode::CREATED => assert_eq!(reply.body, "Created"),
            StatusCode::SERVICE_UNAVAILABLE => assert_eq!(reply.body, "Service Unavailable\n"),
            other => panic!("unexpected status {other}"),
        }
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = timeout.buffer_stats();
    assert_eq!(stats.acquired, 200);
    assert_eq!(stats.released, 200);
}
