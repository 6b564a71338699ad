//! FILENAME: core/data-model/src/events.rs
//! PURPOSE: Minimal listener registry used for every outgoing notification.
//! CONTEXT: Listeners are cloned out of the registry before they run, so a
//! listener may subscribe, unsubscribe or trigger further events without
//! deadlocking on the registry lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by `subscribe`. Ids are unique across all hubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct EventHub<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        EventHub {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<T> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false when `id` was not registered here.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.lock().is_empty()
    }

    pub fn emit(&self, event: &T) {
        let listeners: Vec<Listener<T>> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl<T> std::fmt::Debug for EventHub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
