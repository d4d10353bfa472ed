use super::getter::{Dependency, Getter, OnChange};
use crate::error::{StoreError, StoreResult};
use crate::store::{Listener, ReadableStore, SetState, StoreId, Subscription};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

type DeriveFn<T> = Box<dyn Fn(&mut Getter<T>) -> T + Send + Sync>;

struct DerivedState<T> {
    value: Option<T>,
    // Sources read by the last pass; `None` until the first pass.
    dependencies: Option<Vec<Box<dyn Dependency>>>,
    invalidated: bool,
    subscriptions: HashMap<StoreId, Subscription>,
}

struct DerivedInner<T> {
    id: StoreId,
    derive: DeriveFn<T>,
    state: Mutex<DerivedState<T>>,
    listeners: Mutex<BTreeMap<u64, Listener<T>>>,
    next_listener: AtomicU64,
}

/// A read-only store computed from other stores.
///
/// The value is computed lazily on read. Sources read through the
/// [`Getter`] become dependencies; the value is recomputed only after one
/// of them changes by structure. While the store has listeners it
/// subscribes to exactly the sources read by the last pass and notifies
/// its listeners when any of them changes. Listeners receive the memoized
/// value twice, since the new value is not computed until the next read.
///
/// # Examples
///
/// ```
/// use pantry::{derive, ReadableStore, Store, StoreApi};
///
/// let count = Store::new(1);
/// let next = {
///     let count = count.clone();
///     derive(move |get| get.get(&count) + 1)
/// };
///
/// assert_eq!(next.get_state(), 2);
/// count.set(5);
/// assert_eq!(next.get_state(), 6);
/// ```
pub struct DerivedStore<T> {
    inner: Arc<DerivedInner<T>>,
}

impl<T> DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn(&mut Getter<T>) -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DerivedInner {
                id: StoreId::next(),
                derive: Box::new(derive),
                state: Mutex::new(DerivedState {
                    value: None,
                    dependencies: None,
                    invalidated: true,
                    subscriptions: HashMap::new(),
                }),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Number of sources this store is currently subscribed to.
    pub fn source_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.state.lock().invalidated
    }

    /// Always fails: a derived store only changes through its sources.
    pub fn set_state(&self, _update: SetState<T>) -> StoreResult<()> {
        Err(StoreError::DerivedStoreMutation {
            operation: "set_state",
        })
    }

    /// Always fails: a derived store has no initial state.
    pub fn get_initial_state(&self) -> StoreResult<T> {
        Err(StoreError::DerivedStoreMutation {
            operation: "get_initial_state",
        })
    }

    /// Always fails: a derived store lives as long as its handles.
    pub fn destroy(&self) -> StoreResult<()> {
        Err(StoreError::DerivedStoreMutation {
            operation: "destroy",
        })
    }
}

impl<T> DerivedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get_state(self: &Arc<Self>) -> T {
        let (previous, dependencies) = {
            let mut state = self.state.lock();
            if !state.invalidated {
                if let Some(value) = &state.value {
                    return value.clone();
                }
            }
            (state.value.clone(), state.dependencies.take())
        };

        let changed = match &dependencies {
            Some(dependencies) => dependencies.iter().any(|dependency| dependency.is_changed()),
            None => true,
        };

        let (value, dependencies) = match (changed, previous) {
            (false, Some(previous)) => (previous, dependencies.unwrap_or_default()),
            (_, previous) => {
                let mut getter = Getter::new(previous);
                let value = (self.derive)(&mut getter);
                trace!(store = %self.id, sources = getter.dependencies.len(), "derived value recomputed");
                (value, getter.dependencies)
            }
        };

        let listening = !self.listeners.lock().is_empty();
        let mut released = Vec::new();
        let mut state = self.state.lock();
        if listening {
            released = self.reconcile(&mut state.subscriptions, &dependencies);
            state.invalidated = false;
        }
        state.value = Some(value.clone());
        state.dependencies = Some(dependencies);
        drop(state);
        drop(released);
        value
    }

    // Match subscriptions to `dependencies`; returns the released ones.
    fn reconcile(
        self: &Arc<Self>,
        subscriptions: &mut HashMap<StoreId, Subscription>,
        dependencies: &[Box<dyn Dependency>],
    ) -> Vec<Subscription> {
        let wanted: HashSet<StoreId> = dependencies.iter().map(|dependency| dependency.id()).collect();
        let stale: Vec<StoreId> = subscriptions
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        let released = stale
            .iter()
            .filter_map(|id| subscriptions.remove(id))
            .collect();

        for dependency in dependencies {
            let id = dependency.id();
            if !subscriptions.contains_key(&id) {
                trace!(store = %self.id, source = %id, "subscribing to source");
                subscriptions.insert(id, dependency.subscribe(self.invalidator()));
            }
        }
        released
    }

    fn invalidator(self: &Arc<Self>) -> OnChange {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate();
            }
        })
    }

    fn invalidate(&self) {
        let value = {
            let mut state = self.state.lock();
            if state.invalidated {
                return;
            }
            state.invalidated = true;
            state.value.clone()
        };
        let Some(value) = value else {
            return;
        };
        trace!(store = %self.id, "derived value invalidated");
        let listeners: Vec<Listener<T>> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(&value, &value);
        }
    }

    fn remove_listener(&self, key: u64) {
        let mut listeners = self.listeners.lock();
        listeners.remove(&key);
        if !listeners.is_empty() {
            return;
        }
        drop(listeners);

        let released = {
            let mut state = self.state.lock();
            state.invalidated = true;
            std::mem::take(&mut state.subscriptions)
        };
        trace!(store = %self.id, sources = released.len(), "last listener gone; sources released");
    }
}

impl<T> ReadableStore<T> for DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> StoreId {
        self.inner.id
    }

    fn get_state(&self) -> T {
        self.inner.get_state()
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let key = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        let first = {
            let mut listeners = self.inner.listeners.lock();
            listeners.insert(key, Arc::new(listener));
            listeners.len() == 1
        };
        if first {
            // Builds the dependency map and subscribes to its sources.
            self.inner.get_state();
        }

        let inner: Weak<DerivedInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove_listener(key);
            }
        })
    }
}

impl<T> Clone for DerivedStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for DerivedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedStore")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

/// Create a derived store from a derivation function.
pub fn derive<T, F>(derive: F) -> DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&mut Getter<T>) -> T + Send + Sync + 'static,
{
    DerivedStore::new(derive)
}
