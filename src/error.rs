//! Server Error Types
//!
//! Usage errors (calling `start`/`stop` in the wrong state) are kept apart from
//! transport errors so callers can tell a programming mistake from a socket
//! failure. Liveness and availability checks never produce either: transport
//! trouble on an accepted connection is reported through the `Disconnected`
//! event instead.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors returned by [`crate::Server`] lifecycle operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// `start` was called on a server that is already running.
    #[error("server already started")]
    AlreadyStarted,

    /// `stop` was called on a server that is not running.
    #[error("server not started")]
    NotStarted,

    /// A second polling loop was requested while one is still running.
    #[error("supervisor loop already running")]
    SupervisorAlreadyRunning,

    /// The listener could not be bound.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Any other transport-level failure on the listener.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServerError {
    /// True for errors caused by calling the API in the wrong state.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ServerError::AlreadyStarted
                | ServerError::NotStarted
                | ServerError::SupervisorAlreadyRunning
        )
    }

    /// Short stable label (snake_case) for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServerError::AlreadyStarted => "server_already_started",
            ServerError::NotStarted => "server_not_started",
            ServerError::SupervisorAlreadyRunning => "supervisor_already_running",
            ServerError::Bind { .. } => "listener_bind_failed",
            ServerError::Io(_) => "listener_io",
        }
    }
}
