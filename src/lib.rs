//! pollsock Library
//!
//! A minimal TCP server runtime. One polling supervisor task accepts inbound
//! connections, discovers data and disconnections by non-blocking
//! inspection, and reports them to observers as three events: `Connected`,
//! `ReceivedRaw` and `Disconnected`. Bytes are surfaced raw; framing and
//! protocols are left to the consumer.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod metrics;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use connection::{Connection, RecvFlags, RegistryView};
pub use error::ServerError;
pub use events::{LoggingObserver, PassStats, ServerEvent, ServerObserver};
pub use server::Server;
pub use shutdown::ShutdownCoordinator;

/// Common error type for configuration and application code
pub type Result<T> = anyhow::Result<T>;
