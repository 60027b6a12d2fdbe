//! Per-request connection state.
//!
//! Holds the read/write deadlines a sink can set on the underlying client
//! connection. Body reads in [`crate::http::Context::read_body`] watch the
//! read deadline and sink writes check the write deadline, so moving either
//! to "now" stops further I/O immediately.

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Connection {
    read_deadline: watch::Sender<Option<Instant>>,
    write_deadline: watch::Sender<Option<Instant>>,
}

impl Connection {
    pub fn new() -> Self {
        let (read_deadline, _) = watch::channel(None);
        let (write_deadline, _) = watch::channel(None);
        Self {
            read_deadline,
            write_deadline,
        }
    }

    pub fn set_read_deadline(&self, at: Instant) {
        self.read_deadline.send_replace(Some(at));
    }

    pub fn set_write_deadline(&self, at: Instant) {
        self.write_deadline.send_replace(Some(at));
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        *self.read_deadline.borrow()
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        *self.write_deadline.borrow()
    }

    /// Receiver notified whenever the read deadline moves.
    pub fn watch_read_deadline(&self) -> watch::Receiver<Option<Instant>> {
        self.read_deadline.subscribe()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
