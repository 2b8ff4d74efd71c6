//! Typed event dispatch to registered listeners.
//!
//! Listeners run outside the session lock on a snapshot of the registry.
//! A failing or panicking listener is logged and does not stop dispatch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use common::{EventKind, PlayerEvent};
use tracing::warn;

/// Listener callback. Returning an error is logged and does not affect other
/// listeners.
pub type Listener = Arc<dyn Fn(&PlayerEvent) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    kind: EventKind,
    listener: Listener,
}

/// Synchronous event dispatcher.
///
/// Listeners are invoked in registration order on the caller's task. Dispatch
/// iterates over a snapshot taken when the event is emitted, so a listener may
/// register or remove listeners (the change applies from the next event) and
/// may call back into the player.
pub struct EventBus {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PlayerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration {
            id,
            kind,
            listener: Arc::new(listener),
        });
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registrations = self.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Delivers `event` to every listener of its kind. Returns the number of
    /// listeners that handled it without failing.
    pub fn dispatch(&self, event: &PlayerEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, Listener)> = self
            .lock()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| (r.id, r.listener.clone()))
            .collect();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!("Listener {:?} failed on {:?} event: {}", id, kind, e);
                }
                Err(_) => {
                    warn!("Listener {:?} panicked on {:?} event", id, kind);
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
