//! TCP Server
//!
//! [`Server`] is the public lifecycle handle: it binds the listener, launches
//! the polling supervisor and exposes the registry and the bound endpoint.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use pollsock::{Server, ServerEvent};
//! use pollsock::config::ServerConfig;
//!
//! # async fn demo() -> Result<(), pollsock::ServerError> {
//! let mut server = Server::new(ServerConfig::default());
//! server.subscribe(Arc::new(|event: &ServerEvent| {
//!     if let ServerEvent::ReceivedRaw { connection, data } = event {
//!         println!("{} sent {} bytes", connection, data.len());
//!     }
//! }));
//!
//! server.start(0).await?;
//! println!("listening on {:?}", server.local_addr());
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

mod supervisor;

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::connection::{Registry, RegistryShared, RegistryView, Snapshot};
use crate::error::ServerError;
use crate::events::{ObserverSet, ServerObserver};
use supervisor::{Supervisor, SupervisorHandle};

/// Polling TCP server.
///
/// `Stopped --start(port)--> Started --stop()--> Stopped`. Calling `start`
/// while started or `stop` while stopped returns a usage error.
pub struct Server {
    config: ServerConfig,
    listener: Option<Arc<TcpListener>>,
    local_addr: Option<SocketAddr>,
    supervisor: Option<SupervisorHandle>,
    registry: RegistryShared,
    observers: ObserverSet,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            listener: None,
            local_addr: None,
            supervisor: None,
            registry: RegistryShared::new(),
            observers: ObserverSet::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register an observer. Observers receive events in registration order
    /// and may be added before or after `start`.
    pub fn subscribe(&self, observer: Arc<dyn ServerObserver>) {
        let name = observer.name();
        self.observers.add(observer);
        debug!(observer = name, total = self.observers.len(), "Observer registered");
    }

    /// Bind `0.0.0.0:port` and start the supervisor loop.
    pub async fn start(&mut self, port: u16) -> Result<(), ServerError> {
        if self.listener.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        info!("Binding TCP listener to {}", addr);

        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(listener);

        self.start_supervisor(Arc::clone(&listener))?;
        self.listener = Some(listener);
        self.local_addr = Some(local_addr);

        info!("Successfully bound to {}", local_addr);
        Ok(())
    }

    /// Stop the supervisor loop and release the listener.
    ///
    /// Returns once the loop has exited and the port is free. The loop gets
    /// `stop_timeout` to exit on its own; after that it is aborted at its next
    /// await point, so a pass already running still completes. Live
    /// connections are closed only when `close_on_stop` is set; otherwise
    /// they stay registered and are supervised again after the next `start`.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(listener) = self.listener.take() else {
            return Err(ServerError::NotStarted);
        };

        if let Some(supervisor) = self.supervisor.take() {
            supervisor.shutdown(self.config.stop_timeout).await;
        }
        drop(listener);

        if let Some(addr) = self.local_addr.take() {
            info!("Listener on {} released", addr);
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.listener.is_some()
    }

    /// The bound endpoint while started; useful after binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Point-in-time copy of the live connections.
    pub fn connections(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// Subscribe to registry snapshots.
    pub fn registry_view(&self) -> RegistryView {
        self.registry.view()
    }

    fn start_supervisor(&mut self, listener: Arc<TcpListener>) -> Result<(), ServerError> {
        if self.supervisor.is_some() {
            return Err(ServerError::SupervisorAlreadyRunning);
        }

        let supervisor = Supervisor::new(
            listener,
            Registry::from_shared(self.registry.clone()),
            self.observers.clone(),
            self.config.clone(),
        );
        self.supervisor = Some(supervisor.spawn());
        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.signal();
        }
    }
}
