//! Listener registry shared by the context monitor and the voice adapter.
//!
//! Listeners are called synchronously, in subscription order, outside of any
//! lock held by the bus. A panicking listener is logged and skipped; the rest
//! still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<E>)>>,
}

pub struct EventBus<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers `listener`. It stays registered until the returned token is
    /// unsubscribed or dropped; use [`Subscription::detach`] to keep it for
    /// the lifetime of the bus.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.registry.listeners.lock() {
            listeners.push((id, Arc::new(listener)));
        }

        let weak: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    if let Ok(mut listeners) = registry.listeners.lock() {
                        listeners.retain(|(lid, _)| *lid != id);
                    }
                }
            })),
        }
    }

    /// Delivers `event` to every listener. Returns how many listeners
    /// panicked.
    pub fn emit(&self, event: &E) -> usize {
        // Snapshot so listeners may unsubscribe while being notified.
        let snapshot: Vec<(u64, Listener<E>)> = match self.registry.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return 0,
        };

        let mut failures = 0;
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(listener = id, "event listener panicked; continuing with the rest");
                failures += 1;
            }
        }
        failures
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

/// Unsubscribe token returned by [`EventBus::subscribe`].
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keeps the listener registered for as long as the bus lives.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
