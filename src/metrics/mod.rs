//! Metrics Module
//!
//! Prometheus metrics fed by the server's observer hooks, plus a scrape
//! endpoint.

pub mod collector;
pub mod server;

pub use collector::ServerMetrics;
pub use server::MetricsServer;
