//! Timeout Gate
//!
//! HTTP middleware that bounds how long a request handler may run, built
//! on Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, trace + request-id layers)
//!                         │
//!                         ▼
//!                     routing::RouterService ── 404
//!                         │
//!                         ▼
//!                     http::recovery ◀───────────────── re-raised panic
//!                         │                                   │
//!                         ▼                                   │
//!                     resilience::Timeout                     │
//!                       filter? ── zero? ── race ─────────────┤
//!                         │                  │                │
//!                         │          handler task writes      │
//!                         │          into TimeoutWriter       │
//!                         ▼                  ▼                │
//!                     commit buffered response | 503 response │
//!                         │
//!     Client Response     ▼
//!     ◀────────────── http::ResponseRecorder → axum Response
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GateConfig;
pub use http::{Context, HttpServer};
pub use lifecycle::Shutdown;
pub use resilience::{Options, Timeout};
