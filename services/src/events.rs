//! Typed publish/subscribe primitive shared by every service.
//!
//! Each service owns one [`EventEmitter`] per event type it broadcasts.
//! Listeners are plain closures identified by a [`ListenerId`] handle,
//! which is what `off` takes since closures have no identity of their own.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`EventEmitter::on`]/[`EventEmitter::once`], used to
/// unsubscribe the listener later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Boxed listener callback. Listeners receive the event by reference and
/// must not assume anything about delivery order relative to other listeners.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerEntry<E> {
    id: ListenerId,
    once: bool,
    callback: Listener<E>,
}

/// Listener-list event emitter with per-listener panic isolation.
///
/// A panicking listener is caught and logged so it cannot prevent delivery
/// to the remaining listeners.
pub struct EventEmitter<E> {
    listeners: Mutex<Vec<ListenerEntry<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe(&self, callback: Listener<E>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.lock().expect("listener list poisoned");
        listeners.push(ListenerEntry { id, once, callback });
        id
    }

    /// Subscribe a listener for every future emission.
    pub fn on(&self, callback: Listener<E>) -> ListenerId {
        self.subscribe(callback, false)
    }

    /// Subscribe a listener for the next emission only.
    pub fn once(&self, callback: Listener<E>) -> ListenerId {
        self.subscribe(callback, true)
    }

    /// Remove a listener by its handle. Returns `false` if the handle is
    /// unknown (already removed, or consumed by a `once` delivery).
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().expect("listener list poisoned");
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    /// Deliver an event to all current listeners.
    ///
    /// `once` listeners are detached before their invocation, so a listener
    /// re-emitting from inside its callback cannot fire them twice.
    pub fn emit(&self, event: &E) {
        let to_invoke: Vec<Listener<E>> = {
            let mut listeners = self.listeners.lock().expect("listener list poisoned");
            let snapshot = listeners
                .iter()
                .map(|entry| Arc::clone(&entry.callback))
                .collect();
            listeners.retain(|entry| !entry.once);
            snapshot
        };

        for callback in to_invoke {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                log::error!("Event listener panicked during emit; continuing with remaining listeners");
            }
        }
    }

    /// Detach every listener.
    pub fn remove_all_listeners(&self) {
        self.listeners
            .lock()
            .expect("listener list poisoned")
            .clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listener list poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn delivers_to_all_listeners() {
        let emitter = EventEmitter::<u32>::new();
        let hits = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            emitter.on(Arc::new(move |value: &u32| {
                hits.fetch_add(*value, Ordering::SeqCst);
            }));
        }

        emitter.emit(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn off_removes_listener() {
        let emitter = EventEmitter::<()>::new();
        let hits = Arc::new(AtomicU32::new(0));

        let hits_clone = hits.clone();
        let id = emitter.on(Arc::new(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(emitter.off(id));
        assert!(!emitter.off(id));

        emitter.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn once_fires_exactly_once() {
        let emitter = EventEmitter::<()>::new();
        let hits = Arc::new(AtomicU32::new(0));

        let hits_clone = hits.clone();
        emitter.once(Arc::new(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(&());
        emitter.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let emitter = EventEmitter::<()>::new();
        let hits = Arc::new(AtomicU32::new(0));

        emitter.on(Arc::new(|_| panic!("bad listener")));

        let hits_clone = hits.clone();
        emitter.on(Arc::new(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_all_listeners_clears_everything() {
        let emitter = EventEmitter::<()>::new();
        emitter.on(Arc::new(|_| {}));
        emitter.once(Arc::new(|_| {}));
        assert_eq!(emitter.listener_count(), 2);

        emitter.remove_all_listeners();
        assert_eq!(emitter.listener_count(), 0);
    }
}
