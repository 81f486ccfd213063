//! Polling Supervisor
//!
//! The single task that accepts sockets, drains data and reaps dead
//! connections. It is the only writer of the registry and the only user of
//! the listener, so neither needs a lock.
//!
//! ```text
//! every poll_interval:
//!   accept phase ── listener.accept() until WouldBlock ── Connected
//!   scan phase   ── newest first:
//!                     peek into scratch > 0 ── receive ── ReceivedRaw
//!                     else !is_live()       ── remove  ── Disconnected
//!   pass hook    ── PassStats
//! ```

use bytes::Bytes;
use std::io;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, Registry};
use crate::events::{ObserverSet, PassStats, ServerEvent};

/// State moved into the supervisor task.
pub(crate) struct Supervisor {
    listener: Arc<TcpListener>,
    registry: Registry,
    observers: ObserverSet,
    config: ServerConfig,
    started_at: Instant,
    pass: u64,
    /// Reused by every probe and drain; sized to `read_buffer_size`.
    scratch: Vec<u8>,
}

/// Owner-side handle used to stop a running supervisor.
pub(crate) struct SupervisorHandle {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_flag: Arc<AtomicBool>,
}

impl Supervisor {
    pub(crate) fn new(
        listener: Arc<TcpListener>,
        registry: Registry,
        observers: ObserverSet,
        config: ServerConfig,
    ) -> Self {
        let scratch = vec![0u8; config.read_buffer_size.max(1)];
        Self {
            listener,
            registry,
            observers,
            config,
            started_at: Instant::now(),
            pass: 0,
            scratch,
        }
    }

    /// Launch the polling loop on the current tokio runtime.
    pub(crate) fn spawn(self) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(self.run(shutdown_rx, Arc::clone(&shutdown_flag)));

        SupervisorHandle {
            handle,
            shutdown_tx,
            shutdown_flag,
        }
    }

    async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>, shutdown_flag: Arc<AtomicBool>) {
        info!(
            poll_interval = ?self.config.poll_interval,
            resumed = self.registry.len(),
            "Starting supervisor loop"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("Supervisor received shutdown signal");
                    break;
                }
                _ = interval.tick() => {}
            }

            if shutdown_flag.load(Ordering::Acquire) {
                break;
            }

            self.run_pass();
        }

        if self.config.close_on_stop {
            self.close_all();
        }

        info!(passes = self.pass, live = self.registry.len(), "Supervisor loop stopped");
    }

    /// One accept phase followed by one scan phase.
    pub(crate) fn run_pass(&mut self) -> PassStats {
        let pass_start = Instant::now();
        self.pass += 1;

        let mut stats = PassStats {
            pass: self.pass,
            ..PassStats::default()
        };

        stats.accepted = self.accept_pending();
        self.scan(&mut stats);

        stats.live = self.registry.len();
        stats.duration = pass_start.elapsed();
        stats.uptime = self.started_at.elapsed();
        self.observers.pass_completed(&stats);

        stats
    }

    fn accept_pending(&mut self) -> usize {
        let mut accepted = 0;

        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let id = self.registry.next_id();
                    let connection = match Connection::new(id, stream, self.config.read_buffer_size) {
                        Ok(connection) => Arc::new(connection),
                        Err(e) => {
                            warn!(peer_addr = %addr, error = %e, "Dropping accepted socket that could not be set up");
                            continue;
                        }
                    };

                    self.registry.add(Arc::clone(&connection));
                    accepted += 1;
                    debug!(
                        connection_id = id,
                        peer_addr = %addr,
                        uptime_ms = self.uptime_ms(),
                        "Connection accepted"
                    );
                    self.observers.emit(&ServerEvent::Connected(connection));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Next pass tries again.
                    error!(error = %e, "Error accepting connection");
                    break;
                }
            }
        }

        accepted
    }

    fn scan(&mut self, stats: &mut PassStats) {
        let snapshot = self.registry.snapshot();

        for connection in snapshot.iter().rev() {
            let available = connection.available_bytes_into(&mut self.scratch);

            if available > 0 {
                let buffer = &mut self.scratch[..available];
                match connection.receive(buffer) {
                    Ok(()) => {
                        let data = Bytes::copy_from_slice(buffer);
                        stats.received += 1;
                        stats.bytes_received += available;
                        trace!(
                            connection_id = connection.id(),
                            bytes = available,
                            uptime_ms = self.uptime_ms(),
                            "Connection sent data"
                        );
                        self.observers.emit(&ServerEvent::ReceivedRaw {
                            connection: Arc::clone(connection),
                            data,
                        });
                    }
                    Err(e) => {
                        debug!(connection_id = connection.id(), error = %e, "Drain failed");
                        self.reap(connection, stats);
                    }
                }
            } else if !connection.is_live() {
                self.reap(connection, stats);
            }
        }
    }

    fn reap(&mut self, connection: &Arc<Connection>, stats: &mut PassStats) {
        if !self.registry.remove(connection) {
            return;
        }

        stats.disconnected += 1;
        debug!(
            connection_id = connection.id(),
            uptime_ms = self.uptime_ms(),
            "Connection disconnected"
        );
        self.observers.emit(&ServerEvent::Disconnected(Arc::clone(connection)));
    }

    fn close_all(&mut self) {
        let snapshot = self.registry.snapshot();

        for connection in snapshot.iter().rev() {
            if let Err(e) = connection.close() {
                debug!(connection_id = connection.id(), error = %e, "Shutdown of connection failed");
            }
            if self.registry.remove(connection) {
                self.observers.emit(&ServerEvent::Disconnected(Arc::clone(connection)));
            }
        }

        if !snapshot.is_empty() {
            info!(closed = snapshot.len(), "Closed live connections on stop");
        }
    }

    fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

impl SupervisorHandle {
    /// Ask the loop to exit before its next pass.
    pub(crate) fn signal(&self) {
        self.shutdown_flag.store(true, Ordering::Release);
        // No receiver means the task is already gone.
        let _ = self.shutdown_tx.send(());
    }

    /// Signal the loop and wait up to `grace` for it to exit.
    ///
    /// When the bound elapses the task is aborted. A pass is synchronous, so
    /// the abort lands at the loop's next await point: a pass that is still
    /// running (slow observer, `receive` waiting for bytes) finishes first.
    pub(crate) async fn shutdown(mut self, grace: Duration) {
        self.signal();

        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => debug!("Supervisor task completed"),
            Ok(Err(e)) if e.is_panic() => error!("Supervisor task panicked: {}", e),
            Ok(Err(_)) => debug!("Supervisor task was cancelled"),
            Err(_) => {
                warn!(grace = ?grace, "Supervisor did not stop in time, aborting task");
                self.handle.abort();
                let _ = (&mut self.handle).await;
            }
        }
    }
}
