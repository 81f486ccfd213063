//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);
const MAX_STOP_TIMEOUT: Duration = Duration::from_secs(300);
const MIN_READ_BUFFER: usize = 1024;
const MAX_READ_BUFFER: usize = 16 * 1024 * 1024;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Override fields from `POLLSOCK_*` variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("POLLSOCK_PORT") {
            self.server.port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid POLLSOCK_PORT: {}", port))?;
        }

        if let Some(interval) = lookup("POLLSOCK_POLL_INTERVAL") {
            self.server.poll_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid POLLSOCK_POLL_INTERVAL: {}", interval))?;
        }

        if let Some(timeout) = lookup("POLLSOCK_STOP_TIMEOUT") {
            self.server.stop_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid POLLSOCK_STOP_TIMEOUT: {}", timeout))?;
        }

        if let Some(size) = lookup("POLLSOCK_READ_BUFFER_SIZE") {
            self.server.read_buffer_size = size
                .parse::<usize>()
                .with_context(|| format!("Invalid POLLSOCK_READ_BUFFER_SIZE: {}", size))?;
        }

        if let Some(close) = lookup("POLLSOCK_CLOSE_ON_STOP") {
            self.server.close_on_stop = close
                .parse::<bool>()
                .with_context(|| format!("Invalid POLLSOCK_CLOSE_ON_STOP: {}", close))?;
        }

        if let Some(log_level) = lookup("POLLSOCK_LOG_LEVEL") {
            self.monitoring.log_level = log_level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        let server = &self.server;

        if server.poll_interval < MIN_POLL_INTERVAL {
            bail!("poll_interval must be at least 1ms");
        }

        if server.poll_interval > MAX_POLL_INTERVAL {
            bail!("poll_interval cannot exceed 10s");
        }

        if server.stop_timeout.is_zero() {
            bail!("stop_timeout must be greater than 0");
        }

        if server.stop_timeout > MAX_STOP_TIMEOUT {
            bail!("stop_timeout cannot exceed 5 minutes");
        }

        if server.read_buffer_size < MIN_READ_BUFFER {
            bail!("read_buffer_size must be at least 1024 bytes");
        }

        if server.read_buffer_size > MAX_READ_BUFFER {
            bail!("read_buffer_size cannot exceed 16MB");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!(
                "monitoring.log_level must be one of: {}",
                valid_log_levels.join(", ")
            );
        }

        if self.monitoring.metrics_addr.is_some() && !self.monitoring.metrics_enabled {
            tracing::warn!("metrics_addr is set but metrics are disabled; endpoint will not start");
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        port: Option<u16>,
        poll_interval: Option<Duration>,
        close_on_stop: bool,
        metrics_addr: Option<std::net::SocketAddr>,
    ) {
        if let Some(port) = port {
            self.server.port = port;
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(interval) = poll_interval {
            self.server.poll_interval = interval;
            tracing::info!("CLI override: poll interval set to {:?}", interval);
        }

        if close_on_stop {
            self.server.close_on_stop = true;
            tracing::info!("CLI override: connections will be closed on stop");
        }

        if let Some(addr) = metrics_addr {
            self.monitoring.metrics_enabled = true;
            self.monitoring.metrics_addr = Some(addr);
            tracing::info!("CLI override: metrics endpoint set to {}", addr);
        }
    }
}
