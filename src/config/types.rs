//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port bound on 0.0.0.0; 0 picks an ephemeral port
    pub port: u16,
    /// Pause between two supervisor passes
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long `stop()` waits for the loop to exit before aborting it. The
    /// abort cannot cut a running pass short.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Largest payload drained from one connection in one pass
    pub read_buffer_size: usize,
    /// Shut down live connections when the server stops
    pub close_on_stop: bool,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7000,
            poll_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_secs(5),
            read_buffer_size: 64 * 1024,
            close_on_stop: false,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_addr: None,
        }
    }
}
