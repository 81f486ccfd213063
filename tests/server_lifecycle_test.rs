//! Integration tests for server start/stop behaviour

mod common;

use std::time::Duration;

use common::{loopback, started_server, test_config, wait_until, Recorded, Recorder};
use pollsock::config::ServerConfig;
use pollsock::{PassStats, Server, ServerError, ServerEvent, ServerObserver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_start_twice_is_usage_error() {
    let (mut server, _recorder, _) = started_server(test_config()).await;

    let err = server.start(0).await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyStarted));
    assert!(err.is_usage_error());
    assert!(server.is_started());

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_stop_when_stopped_is_usage_error() {
    let mut server = Server::new(test_config());

    let err = server.stop().await.unwrap_err();
    assert!(matches!(err, ServerError::NotStarted));
    assert!(err.is_usage_error());
}

#[tokio::test]
async fn test_start_stop_start() {
    let (mut server, recorder, addr) = started_server(test_config()).await;
    let first_port = addr.port();

    assert_ok!(server.stop().await);
    assert!(!server.is_started());
    assert!(server.local_addr().is_none());

    // The port is released once stop returns.
    let rebind = std::net::TcpListener::bind(("0.0.0.0", first_port));
    assert!(rebind.is_ok());
    drop(rebind);

    assert_ok!(server.start(0).await);
    let addr = loopback(&server);
    let _client = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| recorder.events().contains(&Recorded::Connected(1))).await);

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_idle_server_keeps_polling() {
    let (mut server, recorder, _) = started_server(test_config()).await;

    assert!(wait_until(|| recorder.passes() >= 10).await);
    assert!(recorder.events().is_empty());

    assert_ok!(server.stop().await);

    // No passes after stop.
    let passes = recorder.passes();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.passes(), passes);
}

/// Blocks the supervisor inside the pass hook once armed.
#[derive(Default)]
struct SlowPass {
    armed: AtomicBool,
    blocked: AtomicBool,
    passes: AtomicU64,
}

impl ServerObserver for SlowPass {
    fn on_event(&self, _event: &ServerEvent) {}

    fn on_pass(&self, _stats: &PassStats) {
        self.passes.fetch_add(1, Ordering::SeqCst);
        if self.armed.load(Ordering::SeqCst) {
            self.blocked.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_aborts_supervisor_after_timeout() {
    let config = ServerConfig {
        stop_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let mut server = Server::new(config);
    let slow = Arc::new(SlowPass::default());
    server.subscribe(slow.clone());
    assert_ok!(server.start(0).await);
    let port = server.local_addr().unwrap().port();

    slow.armed.store(true, Ordering::SeqCst);
    assert!(wait_until(|| slow.blocked.load(Ordering::SeqCst)).await);

    let stopped = tokio::time::timeout(Duration::from_secs(3), server.stop()).await;
    assert!(matches!(stopped, Ok(Ok(()))));
    assert!(!server.is_started());

    assert!(std::net::TcpListener::bind(("0.0.0.0", port)).is_ok());

    let passes = slow.passes.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(slow.passes.load(Ordering::SeqCst), passes);
}

#[tokio::test]
async fn test_bind_failure_is_transport_error() {
    let (mut running, _recorder, addr) = started_server(test_config()).await;

    let mut server = Server::new(test_config());
    let err = server.start(addr.port()).await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert!(!err.is_usage_error());
    assert!(!server.is_started());

    assert_ok!(running.stop().await);
}

#[tokio::test]
async fn test_stop_leaves_connections_open_by_default() {
    let (mut server, recorder, addr) = started_server(test_config()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| server.connections().len() == 1).await);

    assert_ok!(server.stop().await);
    assert_eq!(server.connections().len(), 1);
    assert_eq!(recorder.count_disconnected(1), 0);

    // The connection is still usable from the client side.
    client.write_all(b"still here").await.unwrap();

    // After a restart the orphaned connection is supervised again.
    assert_ok!(server.start(0).await);
    assert!(wait_until(|| recorder.payload(1) == b"still here").await);

    drop(client);
    assert!(wait_until(|| recorder.count_disconnected(1) == 1).await);
    assert!(server.connections().is_empty());

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_close_on_stop_disconnects_live_connections() {
    let config = ServerConfig {
        close_on_stop: true,
        ..test_config()
    };
    let (mut server, recorder, addr) = started_server(config).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| server.connections().len() == 1).await);

    assert_ok!(server.stop().await);
    assert!(server.connections().is_empty());
    assert_eq!(
        recorder.events(),
        vec![Recorded::Connected(1), Recorded::Disconnected(1)]
    );

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf)).await;
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));
}

#[tokio::test]
async fn test_registry_view_tracks_connections() {
    let (mut server, _recorder, addr) = started_server(test_config()).await;
    let mut view = server.registry_view();
    assert!(view.is_empty());

    let client = TcpStream::connect(addr).await.unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), view.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.len(), 1);

    let conn = view.get(1).unwrap();
    assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
    assert!(conn.is_live());
    assert_eq!(conn.available_bytes(), 0);

    drop(client);
    assert!(wait_until(|| view.is_empty()).await);

    // Stale handles report the connection as dead.
    assert!(!conn.is_live());

    assert_ok!(server.stop().await);
}

#[tokio::test]
async fn test_observer_added_after_start_receives_events() {
    let (mut server, _first, addr) = started_server(test_config()).await;

    let late = Arc::new(Recorder::default());
    server.subscribe(late.clone());

    let _client = TcpStream::connect(addr).await.unwrap();
    assert!(wait_until(|| late.events() == vec![Recorded::Connected(1)]).await);

    assert_ok!(server.stop().await);
}
