//! Event observer trait and the ordered fan-out used by the supervisor.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::error;

use super::{PassStats, ServerEvent};

/// Receives server events.
///
/// Callbacks run on the supervisor task, inside the polling pass. Keep them
/// short: a slow observer delays the whole pass for every connection.
/// Panics are caught and logged so one faulty observer cannot stop the loop.
pub trait ServerObserver: Send + Sync + 'static {
    fn on_event(&self, event: &ServerEvent);

    /// Called once at the end of every pass, including idle ones.
    fn on_pass(&self, _stats: &PassStats) {}

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> ServerObserver for F
where
    F: Fn(&ServerEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &ServerEvent) {
        self(event)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}

/// Registration-ordered set of observers, shared between the server handle
/// and its supervisor task.
#[derive(Clone, Default)]
pub(crate) struct ObserverSet {
    observers: Arc<RwLock<Vec<Arc<dyn ServerObserver>>>>,
}

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, observer: Arc<dyn ServerObserver>) {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        observers.push(observer);
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deliver an event to every observer, in registration order.
    pub(crate) fn emit(&self, event: &ServerEvent) {
        for observer in self.current() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_event(event))).is_err() {
                error!(
                    observer = observer.name(),
                    event = event.kind(),
                    connection_id = event.connection().id(),
                    "Observer panicked while handling event"
                );
            }
        }
    }

    pub(crate) fn pass_completed(&self, stats: &PassStats) {
        for observer in self.current() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_pass(stats))).is_err() {
                error!(observer = observer.name(), pass = stats.pass, "Observer panicked in pass hook");
            }
        }
    }

    // Callbacks run on a copy so an observer may register another one.
    fn current(&self) -> Vec<Arc<dyn ServerObserver>> {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex;

    fn connection() -> (Arc<Connection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        (Arc::new(Connection::new(1, stream, 1024).unwrap()), client)
    }

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ServerObserver for Tagged {
        fn on_event(&self, event: &ServerEvent) {
            self.log.lock().unwrap().push(format!("{}:{}", self.tag, event.kind()));
        }

        fn on_pass(&self, stats: &PassStats) {
            self.log.lock().unwrap().push(format!("{}:pass{}", self.tag, stats.pass));
        }
    }

    #[test]
    fn test_emit_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = ObserverSet::new();
        set.add(Arc::new(Tagged { tag: "a", log: log.clone() }));
        set.add(Arc::new(Tagged { tag: "b", log: log.clone() }));
        assert_eq!(set.len(), 2);

        let (conn, _client) = connection();
        set.emit(&ServerEvent::Connected(conn));
        set.pass_completed(&PassStats { pass: 1, ..Default::default() });

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:connected", "b:connected", "a:pass1", "b:pass1"]
        );
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = ObserverSet::new();
        set.add(Arc::new(|_: &ServerEvent| panic!("observer failure")));
        set.add(Arc::new(Tagged { tag: "ok", log: log.clone() }));

        let (conn, _client) = connection();
        set.emit(&ServerEvent::Disconnected(conn));

        assert_eq!(*log.lock().unwrap(), vec!["ok:disconnected"]);
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let set = ObserverSet::new();
        set.add(Arc::new(move |event: &ServerEvent| {
            sink.lock().unwrap().push(event.connection().id());
        }));

        let (conn, _client) = connection();
        set.emit(&ServerEvent::ReceivedRaw {
            connection: conn,
            data: bytes::Bytes::from_static(b"hi"),
        });

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }
}
