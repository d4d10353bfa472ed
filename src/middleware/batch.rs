use crate::error::StoreResult;
use crate::runtime::{BatchContext, PendingFlush};
use crate::store::{ReadableStore, SetState, StoreApi, StoreId, Subscription};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

struct BatchingData<T> {
    // Number of open store-local scopes.
    count: usize,
    // Full working state awaiting flush.
    pending: Option<T>,
}

struct BatchedInner<T, S> {
    store: S,
    data: Mutex<BatchingData<T>>,
    // Serializes held writes; `data` is released while an updater runs.
    writer: Mutex<()>,
}

/// Batch middleware: turns a burst of writes into one state transition.
///
/// Outside any scope, writes pass straight through to the wrapped store.
/// Inside a store-local scope ([`Batched::batch`]) or a coordinated scope
/// ([`crate::batch`]), writes accumulate in a pending working state. A
/// functional write is evaluated against that working state, so later
/// writes in a scope observe earlier ones. The pending state is handed to
/// the wrapped store's setter once, when the outermost scope closes.
///
/// Scopes close through a drop guard: a panicking callback or a cancelled
/// future still closes its scope and flushes.
pub struct Batched<T, S> {
    inner: Arc<BatchedInner<T, S>>,
}

impl<T, S> Batched<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(BatchedInner {
                store,
                data: Mutex::new(BatchingData {
                    count: 0,
                    pending: None,
                }),
                writer: Mutex::new(()),
            }),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner.store
    }

    /// Current nesting depth of store-local scopes.
    pub fn depth(&self) -> usize {
        self.inner.data.lock().count
    }

    pub fn has_pending(&self) -> bool {
        self.inner.data.lock().pending.is_some()
    }

    /// The committed state with any pending writes applied.
    pub fn working_state(&self) -> T {
        let pending = self.inner.data.lock().pending.clone();
        pending.unwrap_or_else(|| self.inner.store.get_state())
    }

    /// Run `f` as one store-local scope. Scopes nest; only the outermost
    /// one flushes.
    pub fn batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _scope = self.enter();
        f()
    }

    /// Asynchronous counterpart of [`Batched::batch`].
    pub async fn batch_async<Fut>(&self, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        let _scope = self.enter();
        fut.await
    }

    fn enter(&self) -> ScopeGuard<T, S> {
        let mut data = self.inner.data.lock();
        data.count += 1;
        trace!(store = %self.inner.store.id(), depth = data.count, "batch scope opened");
        ScopeGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S> BatchedInner<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn write(self: &Arc<Self>, update: SetState<T>) {
        let context = BatchContext::current();
        if let Some(context) = &context {
            context.register(Arc::clone(self) as Arc<dyn PendingFlush>);
        }

        let writer = self.writer.lock();
        let base = {
            let data = self.data.lock();
            if data.count == 0 && context.is_none() && data.pending.is_none() {
                drop(data);
                drop(writer);
                self.store.set_state(update);
                return;
            }
            data.pending.clone()
        };

        // The updater may read this store, so no lock on `data` is held here.
        let base = base.unwrap_or_else(|| self.store.get_state());
        let next = update.apply(&base);

        let pending = {
            let mut data = self.data.lock();
            data.pending = Some(next);
            trace!(store = %self.store.id(), depth = data.count, "write held for batch");
            if data.count > 0 || context.is_some() {
                return;
            }
            // Every scope closed while the updater ran.
            data.pending.take()
        };
        drop(writer);
        self.commit(pending);
    }

    fn exit(self: &Arc<Self>) {
        let pending = {
            let mut data = self.data.lock();
            debug_assert!(data.count > 0, "batch scope closed more times than opened");
            data.count = data.count.saturating_sub(1);
            if data.count > 0 {
                return;
            }
            if let Some(context) = BatchContext::current() {
                // The coordinated scope flushes once it settles.
                if data.pending.is_some() {
                    context.register(Arc::clone(self) as Arc<dyn PendingFlush>);
                }
                return;
            }
            data.pending.take()
        };
        self.commit(pending);
    }

    fn commit(&self, pending: Option<T>) {
        if let Some(pending) = pending {
            debug!(store = %self.store.id(), "flushing batched writes");
            self.store.set_state(SetState::Replace(pending));
        }
    }
}

impl<T, S> PendingFlush for BatchedInner<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn store_id(&self) -> StoreId {
        self.store.id()
    }

    fn flush_if_idle(&self) {
        let pending = {
            let mut data = self.data.lock();
            if data.count > 0 {
                None
            } else {
                data.pending.take()
            }
        };
        self.commit(pending);
    }
}

struct ScopeGuard<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    inner: Arc<BatchedInner<T, S>>,
}

impl<T, S> Drop for ScopeGuard<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn drop(&mut self) {
        self.inner.exit();
    }
}

impl<T, S> ReadableStore<T> for Batched<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn id(&self) -> StoreId {
        self.inner.store.id()
    }

    fn get_state(&self) -> T {
        self.inner.store.get_state()
    }

    fn with_state<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.store.with_state(f)
    }

    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }
}

impl<T, S> StoreApi<T> for Batched<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    fn set_state(&self, update: SetState<T>) {
        self.inner.write(update);
    }

    fn get_initial_state(&self) -> StoreResult<T> {
        self.inner.store.get_initial_state()
    }

    fn destroy(&self) -> StoreResult<()> {
        self.inner.store.destroy()
    }
}

impl<T, S> Clone for Batched<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Wrap `store` in the batch middleware.
pub fn with_batching<T, S>(store: S) -> Batched<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: StoreApi<T> + 'static,
{
    Batched::new(store)
}
