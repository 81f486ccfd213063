//! Logging observer
//!
//! Writes every server event to `tracing`. Example output:
//! ```text
//! INFO Connection opened connection_id=1 peer_addr=127.0.0.1:50412
//! DEBUG Received raw bytes connection_id=1 bytes=5
//! INFO Connection closed connection_id=1 peer_addr=127.0.0.1:50412 duration=1.2s
//! ```

use tracing::{debug, info, trace};

use super::{PassStats, ServerEvent, ServerObserver};

/// Observer that logs lifecycle events.
#[derive(Debug, Default)]
pub struct LoggingObserver {
    log_passes: bool,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log a `trace` line for every pass that did any work.
    pub fn with_pass_logging(mut self) -> Self {
        self.log_passes = true;
        self
    }
}

impl ServerObserver for LoggingObserver {
    fn on_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::Connected(conn) => {
                info!(connection_id = conn.id(), peer_addr = %conn.peer_addr(), "Connection opened");
            }
            ServerEvent::ReceivedRaw { connection, data } => {
                debug!(connection_id = connection.id(), bytes = data.len(), "Received raw bytes");
            }
            ServerEvent::Disconnected(conn) => {
                info!(
                    connection_id = conn.id(),
                    peer_addr = %conn.peer_addr(),
                    duration = ?conn.duration(),
                    "Connection closed"
                );
            }
        }
    }

    fn on_pass(&self, stats: &PassStats) {
        if !self.log_passes {
            return;
        }
        if stats.accepted + stats.received + stats.disconnected > 0 {
            trace!(
                pass = stats.pass,
                uptime_ms = stats.uptime.as_millis() as u64,
                accepted = stats.accepted,
                received = stats.received,
                bytes = stats.bytes_received,
                disconnected = stats.disconnected,
                live = stats.live,
                elapsed = ?stats.duration,
                "Pass completed"
            );
        }
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
