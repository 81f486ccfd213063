//! Metrics Collector

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::error;

use crate::events::{PassStats, ServerEvent, ServerObserver};
use crate::Result;

/// Prometheus-backed observer for server events and passes.
pub struct ServerMetrics {
    prometheus_registry: Registry,

    connections_total: IntCounter,
    disconnections_total: IntCounter,
    bytes_received_total: IntCounter,
    passes_total: IntCounter,
    live_connections: IntGauge,
    pass_duration: Histogram,
    connection_duration: Histogram,
}

impl ServerMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let connections_total = IntCounter::new(
            "pollsock_connections_total",
            "Total number of accepted connections",
        )?;
        let disconnections_total = IntCounter::new(
            "pollsock_disconnections_total",
            "Total number of connections reaped as disconnected",
        )?;
        let bytes_received_total = IntCounter::new(
            "pollsock_bytes_received_total",
            "Total raw bytes drained from connections",
        )?;
        let passes_total = IntCounter::new(
            "pollsock_passes_total",
            "Total number of supervisor passes",
        )?;
        let live_connections = IntGauge::new(
            "pollsock_live_connections",
            "Number of connections currently in the registry",
        )?;
        let pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "pollsock_pass_duration_seconds",
                "Time spent in one supervisor pass",
            )
            .buckets(vec![0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        let connection_duration = Histogram::with_opts(
            HistogramOpts::new(
                "pollsock_connection_duration_seconds",
                "Lifetime of connections from accept to disconnect",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
        )?;

        prometheus_registry.register(Box::new(connections_total.clone()))?;
        prometheus_registry.register(Box::new(disconnections_total.clone()))?;
        prometheus_registry.register(Box::new(bytes_received_total.clone()))?;
        prometheus_registry.register(Box::new(passes_total.clone()))?;
        prometheus_registry.register(Box::new(live_connections.clone()))?;
        prometheus_registry.register(Box::new(pass_duration.clone()))?;
        prometheus_registry.register(Box::new(connection_duration.clone()))?;

        Ok(Self {
            prometheus_registry,
            connections_total,
            disconnections_total,
            bytes_received_total,
            passes_total,
            live_connections,
            pass_duration,
            connection_duration,
        })
    }

    pub fn total_connections(&self) -> u64 {
        self.connections_total.get()
    }

    pub fn total_disconnections(&self) -> u64 {
        self.disconnections_total.get()
    }

    pub fn total_bytes_received(&self) -> u64 {
        self.bytes_received_total.get()
    }

    pub fn total_passes(&self) -> u64 {
        self.passes_total.get()
    }

    pub fn live_connections(&self) -> i64 {
        self.live_connections.get()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

impl ServerObserver for ServerMetrics {
    fn on_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::Connected(_) => {
                self.connections_total.inc();
                self.live_connections.inc();
            }
            ServerEvent::ReceivedRaw { data, .. } => {
                self.bytes_received_total.inc_by(data.len() as u64);
            }
            ServerEvent::Disconnected(connection) => {
                self.disconnections_total.inc();
                self.live_connections.dec();
                self.connection_duration
                    .observe(connection.duration().as_secs_f64());
            }
        }
    }

    fn on_pass(&self, stats: &PassStats) {
        self.passes_total.inc();
        self.pass_duration.observe(stats.duration.as_secs_f64());
        // Resync with the registry, e.g. after connections were resumed on start.
        self.live_connections.set(stats.live as i64);
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
