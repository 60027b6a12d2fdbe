//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the gate route table from config (one demo handler per route)
//! - Wire up middleware (panic recovery, timeout enforcement)
//! - Wrap it in axum with tracing and request-id layers
//! - Bind to a listener and shut down gracefully
//!
//! # Design Decisions
//! - The gate router is mounted as axum's fallback service, so every
//!   request goes through our own route lookup and middleware chain
//! - Recovery runs outside the timeout middleware and sees re-raised panics

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{FilterConfig, GateConfig, RouteConfig};
use crate::http::context::Context;
use crate::http::handler::{handler, HandlerFn};
use crate::http::recovery::default_recovery;
use crate::lifecycle::shutdown;
use crate::resilience::{self, MatcherFilter, Options, Timeout};
use crate::routing::{
    AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RouteOption, Router, RouterService,
};

/// HTTP server for the timeout gate.
pub struct HttpServer {
    router: axum::Router,
    config: GateConfig,
    timeout: Timeout,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GateConfig) -> Self {
        let timeout = build_timeout(&config);
        let service = build_gate(&config, &timeout);
        let router = Self::build_router(service);
        Self {
            router,
            config,
            timeout,
        }
    }

    /// Build the axum router with all middleware layers.
    fn build_router(service: RouterService) -> axum::Router {
        axum::Router::new()
            .fallback_service(service)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `stop` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        stop: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            default_timeout_ms = self.config.timeout.default_ms,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(stop))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// The timeout middleware instance serving this server's routes.
    pub fn timeout(&self) -> &Timeout {
        &self.timeout
    }
}

/// Timeout middleware configured from `config.timeout` and `config.filters`.
pub fn build_timeout(config: &GateConfig) -> Timeout {
    let options = config
        .filters
        .iter()
        .fold(Options::new(), |options, filter| {
            options.with_filter(filter_from_config(filter))
        })
        .abort_request_body(config.timeout.abort_request_body);

    Timeout::new(config.timeout.default_timeout(), options)
}

/// The gate route table behind recovery and `timeout`.
pub fn build_gate(config: &GateConfig, timeout: &Timeout) -> RouterService {
    let mut router = Router::new()
        .with_middleware(default_recovery())
        .with_middleware(timeout.middleware());

    for route in &config.routes {
        let method = match route.method.parse::<Method>() {
            Ok(method) => method,
            Err(_) => {
                tracing::error!(route = %route.name, method = %route.method, "Invalid method, route skipped");
                continue;
            }
        };
        router.handle(method, &route.path, demo_handler(route), route_options(route));
    }

    router.into_service()
}

fn route_options(route: &RouteConfig) -> Vec<RouteOption> {
    if route.disabled {
        vec![resilience::none()]
    } else if let Some(ms) = route.timeout_ms {
        vec![resilience::after(Duration::from_millis(ms))]
    } else {
        Vec::new()
    }
}

fn filter_from_config(filter: &FilterConfig) -> MatcherFilter<AndMatcher> {
    let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
    if let Some(host) = &filter.host {
        matchers.push(Box::new(HostMatcher::new(host.as_str())));
    }
    if let Some(prefix) = &filter.path_prefix {
        matchers.push(Box::new(PathPrefixMatcher::new(prefix.as_str())));
    }
    MatcherFilter(AndMatcher::new(matchers))
}

/// Wait `delay_ms` unless cancelled, then reply `status` / `body`.
fn demo_handler(route: &RouteConfig) -> HandlerFn {
    let name: Arc<str> = route.name.as_str().into();
    let body: Arc<str> = route.body.as_str().into();
    let delay = Duration::from_millis(route.delay_ms);
    let status = route.status;

    handler(move |ctx: Context| {
        let name = name.clone();
        let body = body.clone();
        async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    cause = ctx.cancellation().done() => {
                        tracing::debug!(route = %name, cause = %cause, "Handler stopped early");
                        return;
                    }
                }
            }

            if let Err(e) = ctx.string(status, &body) {
                tracing::debug!(route = %name, error = %e, "Response write rejected");
            }
        }
    })
}
