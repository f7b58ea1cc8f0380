//! Per-connection event listeners.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::protocol::{EventKind, Payload};

/// Callback invoked with the payload of a matching event.
///
/// Listeners run on the connection's reader loop and must not block; use
/// [`Session::on_async`](crate::Session::on_async) for handlers that await.
pub type Listener = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Outcome of one dispatch.
#[derive(Debug, Default)]
pub(crate) struct Dispatched {
    /// Listeners invoked, panicking ones included.
    pub(crate) listeners: usize,
    /// Payloads of listeners that panicked, in invocation order.
    pub(crate) panics: Vec<Box<dyn Any + Send>>,
}

/// Ordered `(kind, listener)` registrations.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    listeners: Mutex<Vec<(EventKind, Listener)>>,
}

impl EventDispatcher {
    pub(crate) fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners.lock().push((kind, listener));
    }

    /// Remove the most recent registration of `listener` for `kind`.
    /// Returns `false` if it was not registered.
    pub(crate) fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock();
        let found = listeners
            .iter()
            .rposition(|(k, l)| *k == kind && Arc::ptr_eq(l, listener));
        match found {
            Some(index) => {
                let _ = listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call every listener for `kind` in subscription order. A panicking
    /// listener does not stop the ones after it.
    pub(crate) fn dispatch(&self, kind: EventKind, payload: &Payload) -> Dispatched {
        // Snapshot so listeners may call on/off re-entrantly.
        let matching: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        let panics = matching
            .iter()
            .filter_map(|listener| catch_unwind(AssertUnwindSafe(|| listener(payload))).err())
            .collect();
        Dispatched {
            listeners: matching.len(),
            panics,
        }
    }

    pub(crate) fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub(crate) fn clear(&self) {
        self.listeners.lock().clear();
    }
}
