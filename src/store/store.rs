use super::api::{Listener, ReadableStore, SetState, StoreApi, StoreId, Subscription};
use crate::error::StoreResult;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

type Listeners<T> = Mutex<BTreeMap<u64, Listener<T>>>;

struct StoreInner<T> {
    id: StoreId,
    state: RwLock<T>,
    initial: T,
    // Serializes writers; updaters run without holding the state lock.
    writer: Mutex<()>,
    listeners: Arc<Listeners<T>>,
    next_listener: AtomicU64,
}

/// A thread-safe store for managing application state.
///
/// `Store` is the base of every middleware stack: it owns the state,
/// applies writes in call order and notifies listeners with
/// `(new_state, previous_state)`. A write that leaves the state
/// structurally unchanged does not notify.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Store<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new store with the given initial state.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: StoreId::next(),
                state: RwLock::new(initial.clone()),
                initial,
                writer: Mutex::new(()),
                listeners: Arc::new(Mutex::new(BTreeMap::new())),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> T {
        self.inner.state.read().clone()
    }

    /// Read state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn notify(&self, next: &T, previous: &T) {
        // Snapshot so listeners may subscribe, unsubscribe or write.
        let listeners: Vec<Listener<T>> = self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(next, previous);
        }
    }
}

impl<T> ReadableStore<T> for Store<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn id(&self) -> StoreId {
        self.inner.id
    }

    fn get_state(&self) -> T {
        self.get()
    }

    fn with_state<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.read(f)
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let key = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().insert(key, Arc::new(listener));

        let listeners: Weak<Listeners<T>> = Arc::downgrade(&self.inner.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().remove(&key);
            }
        })
    }
}

impl<T> StoreApi<T> for Store<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn set_state(&self, update: SetState<T>) {
        let writer = self.inner.writer.lock();
        let previous = self.get();
        let next = update.apply(&previous);
        if next == previous {
            trace!(store = %self.inner.id, "write left state unchanged");
            return;
        }
        *self.inner.state.write() = next.clone();
        drop(writer);

        trace!(store = %self.inner.id, "state updated");
        self.notify(&next, &previous);
    }

    fn get_initial_state(&self) -> StoreResult<T> {
        Ok(self.inner.initial.clone())
    }

    fn destroy(&self) -> StoreResult<()> {
        self.inner.listeners.lock().clear();
        Ok(())
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
