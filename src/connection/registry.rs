//! Live Connection Registry
//!
//! The supervisor task owns the only [`Registry`] and is its single writer.
//! Every mutation publishes an immutable snapshot through a `watch` channel,
//! so readers on other tasks get point-in-time copies without ever locking
//! the supervisor's working set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::Connection;

/// Point-in-time copy of the live connections, in accept order.
pub type Snapshot = Arc<[Arc<Connection>]>;

/// Publisher side and id counter shared between a server and the registries
/// it hands to successive supervisor runs.
#[derive(Clone)]
pub(crate) struct RegistryShared {
    publisher: Arc<watch::Sender<Snapshot>>,
    next_id: Arc<AtomicU64>,
}

impl RegistryShared {
    pub(crate) fn new() -> Self {
        let (publisher, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            publisher: Arc::new(publisher),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        self.publisher.borrow().clone()
    }

    pub(crate) fn view(&self) -> RegistryView {
        RegistryView {
            rx: self.publisher.subscribe(),
        }
    }
}

/// Authoritative, insertion-ordered set of live connections.
pub(crate) struct Registry {
    live: Vec<Arc<Connection>>,
    shared: RegistryShared,
}

impl Registry {
    /// Build the working set from the last published snapshot, so connections
    /// left open by a previous run are supervised again.
    pub(crate) fn from_shared(shared: RegistryShared) -> Self {
        let live = shared.snapshot().to_vec();
        Self { live, shared }
    }

    /// Allocate the next connection id.
    pub(crate) fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn add(&mut self, connection: Arc<Connection>) {
        self.live.push(connection);
        self.publish();
    }

    /// Remove by identity. Returns false if the connection was not registered.
    pub(crate) fn remove(&mut self, connection: &Arc<Connection>) -> bool {
        let Some(index) = self.live.iter().position(|c| Arc::ptr_eq(c, connection)) else {
            return false;
        };
        self.live.remove(index);
        self.publish();
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    /// Copy of the working set for iteration while removing.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot::from(self.live.clone())
    }

    fn publish(&self) {
        self.shared.publisher.send_replace(self.snapshot());
    }
}

/// Read-only, cloneable view of the registry for consumers.
///
/// Entries may already be stale by the time they are inspected: a connection
/// in a snapshot can be reaped by the supervisor right after it was taken.
#[derive(Clone)]
pub struct RegistryView {
    rx: watch::Receiver<Snapshot>,
}

impl RegistryView {
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a live connection by id.
    pub fn get(&self, id: u64) -> Option<Arc<Connection>> {
        self.rx.borrow().iter().find(|c| c.id() == id).cloned()
    }

    /// Wait for the next registry mutation and return the new snapshot.
    /// Returns `None` once the owning server has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
