//! Shared helpers for server integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pollsock::config::ServerConfig;
use pollsock::{PassStats, Server, ServerEvent, ServerObserver};

/// One observed event, reduced to comparable parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Connected(u64),
    ReceivedRaw(u64, Vec<u8>),
    Disconnected(u64),
}

impl Recorded {
    pub fn id(&self) -> u64 {
        match self {
            Recorded::Connected(id) | Recorded::ReceivedRaw(id, _) | Recorded::Disconnected(id) => {
                *id
            }
        }
    }
}

/// Observer that keeps every event in arrival order
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Recorded>>,
    passes: AtomicU64,
}

impl Recorder {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, id: u64) -> Vec<Recorded> {
        self.events().into_iter().filter(|e| e.id() == id).collect()
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// All bytes received for one connection, concatenated
    pub fn payload(&self, id: u64) -> Vec<u8> {
        self.events_for(id)
            .into_iter()
            .filter_map(|e| match e {
                Recorded::ReceivedRaw(_, data) => Some(data),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn count_disconnected(&self, id: u64) -> usize {
        self.events_for(id)
            .iter()
            .filter(|e| matches!(e, Recorded::Disconnected(_)))
            .count()
    }
}

impl ServerObserver for Recorder {
    fn on_event(&self, event: &ServerEvent) {
        let recorded = match event {
            ServerEvent::Connected(conn) => Recorded::Connected(conn.id()),
            ServerEvent::ReceivedRaw { connection, data } => {
                Recorded::ReceivedRaw(connection.id(), data.to_vec())
            }
            ServerEvent::Disconnected(conn) => Recorded::Disconnected(conn.id()),
        };
        self.events.lock().unwrap().push(recorded);
    }

    fn on_pass(&self, _stats: &PassStats) {
        self.passes.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        poll_interval: Duration::from_millis(5),
        stop_timeout: Duration::from_secs(2),
        ..ServerConfig::default()
    }
}

/// Server started on an ephemeral port with a recorder attached
pub async fn started_server(config: ServerConfig) -> (Server, Arc<Recorder>, SocketAddr) {
    let mut server = Server::new(config);
    let recorder = Arc::new(Recorder::default());
    server.subscribe(recorder.clone());
    server.start(0).await.unwrap();
    let addr = loopback(&server);
    (server, recorder, addr)
}

/// Loopback address of a server bound to 0.0.0.0
pub fn loopback(server: &Server) -> SocketAddr {
    let port = server.local_addr().unwrap().port();
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Poll `condition` until it holds or three seconds pass
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
