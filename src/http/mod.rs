//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, tracing and request-id layers)
//!     → routing::RouterService (route lookup, fresh ResponseRecorder)
//!     → middleware chain (recovery.rs, resilience::Timeout, ...)
//!     → handler writes through context.rs / sink.rs
//!     → recorder.rs converts the result into the axum response
//! ```

pub mod connection;
pub mod context;
pub mod handler;
pub mod recorder;
pub mod recovery;
pub mod server;
pub mod sink;

pub use connection::Connection;
pub use context::{BodyError, Context};
pub use handler::{chain, handler, HandlerFn, Middleware};
pub use recorder::ResponseRecorder;
pub use recovery::{default_recovery, panic_message, recovery};
pub use server::HttpServer;
pub use sink::{
    check_status_code, status_text, write_error, Deadlines, Flush, Hijack, HijackedIo, Push,
    PushOptions, ResponseSink, SinkError,
};
