//! Server Events
//!
//! Lifecycle events raised by the supervisor and the observers that consume
//! them. Events are delivered synchronously from the supervisor task, to every
//! observer, in registration order.

pub mod log;
pub mod observer;

pub use log::LoggingObserver;
pub(crate) use observer::ObserverSet;
pub use observer::ServerObserver;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::Connection;

/// One connection state transition or data arrival.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A connection was accepted and registered.
    Connected(Arc<Connection>),
    /// Bytes were drained from a connection. `data` is exactly the payload
    /// read in one pass, with no framing applied.
    ReceivedRaw {
        connection: Arc<Connection>,
        data: Bytes,
    },
    /// The liveness probe found the connection dead; it has already been
    /// removed from the registry.
    Disconnected(Arc<Connection>),
}

impl ServerEvent {
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            ServerEvent::Connected(connection)
            | ServerEvent::ReceivedRaw { connection, .. }
            | ServerEvent::Disconnected(connection) => connection,
        }
    }

    /// Short stable label (snake_case) for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::ReceivedRaw { .. } => "received_raw",
            ServerEvent::Disconnected(_) => "disconnected",
        }
    }
}

/// Summary of one supervisor pass, handed to [`ServerObserver::on_pass`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Pass counter since the last `start`, starting at 1.
    pub pass: u64,
    pub accepted: usize,
    /// Connections that produced a `ReceivedRaw` this pass.
    pub received: usize,
    pub bytes_received: usize,
    pub disconnected: usize,
    /// Registry size at the end of the pass.
    pub live: usize,
    /// Time spent in the pass body.
    pub duration: Duration,
    /// Time since the server was started.
    pub uptime: Duration,
}
