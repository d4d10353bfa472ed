use crate::store::StoreId;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A batch-capable store that a coordination context can flush.
pub(crate) trait PendingFlush: Send + Sync {
    fn store_id(&self) -> StoreId;

    /// Commit pending writes unless a store-local scope is still open.
    fn flush_if_idle(&self);
}

struct ContextInner {
    registered: Mutex<Vec<Arc<dyn PendingFlush>>>,
}

/// Coordination handle for a multi-store batch.
///
/// While a context is current, every batched store that receives a write
/// registers itself here and holds the write back. When the scope that
/// installed the context ends, each registered store is flushed once, so a
/// single logical operation that touches several stores becomes visible as
/// one wave of updates.
///
/// A context is ambient rather than global: synchronous scopes push it on a
/// thread-local stack, asynchronous ones install it as a tokio task-local.
/// Independent contexts never see each other's stores.
///
/// # Examples
///
/// ```
/// use pantry::{batch, with_batching, ReadableStore, Store, StoreApi};
///
/// let a = with_batching(Store::new(0));
/// let b = with_batching(Store::new(0));
///
/// batch(|_ctx| {
///     a.set(1);
///     b.set(2);
///     assert_eq!(a.get_state(), 0); // held back until the scope ends
/// });
///
/// assert_eq!((a.get_state(), b.get_state()), (1, 2));
/// ```
#[derive(Clone)]
pub struct BatchContext {
    inner: Arc<ContextInner>,
}

// Thread-local stack for synchronous scopes
thread_local! {
    static CONTEXT_STACK: RefCell<Vec<BatchContext>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static TASK_CONTEXT: BatchContext;
}

impl BatchContext {
    /// Create a new, inactive context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                registered: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The innermost active context, if any.
    ///
    /// Synchronous scopes on this thread take precedence over the
    /// task-local context of the running tokio task.
    pub fn current() -> Option<Self> {
        CONTEXT_STACK
            .with(|stack| stack.borrow().last().cloned())
            .or_else(|| TASK_CONTEXT.try_with(Clone::clone).ok())
    }

    /// Whether any coordinated scope is active here.
    pub fn is_active() -> bool {
        Self::current().is_some()
    }

    /// Number of stores registered so far.
    pub fn registered(&self) -> usize {
        self.inner.registered.lock().len()
    }

    /// Run `f` with this context installed, then flush every store that
    /// registered during it.
    ///
    /// Stores are flushed even if `f` panics; the panic is resumed after.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&BatchContext) -> R,
    {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(self.clone());
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(self)));

        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
        self.flush();

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Asynchronous counterpart of [`BatchContext::run`].
    ///
    /// The context stays installed across every suspension point of the
    /// future. Dropping the returned future early still flushes.
    pub async fn run_async<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce(BatchContext) -> Fut,
        Fut: Future,
    {
        let _flush = FlushOnDrop(self.clone());
        TASK_CONTEXT.scope(self.clone(), f(self.clone())).await
    }

    pub(crate) fn register(&self, store: Arc<dyn PendingFlush>) {
        let mut registered = self.inner.registered.lock();
        if registered.iter().all(|s| s.store_id() != store.store_id()) {
            registered.push(store);
        }
    }

    fn flush(&self) {
        let registered = std::mem::take(&mut *self.inner.registered.lock());
        if registered.is_empty() {
            return;
        }
        debug!(stores = registered.len(), "flushing coordinated batch");
        for store in registered {
            store.flush_if_idle();
        }
    }
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchContext")
            .field("registered", &self.registered())
            .finish()
    }
}

struct FlushOnDrop(BatchContext);

impl Drop for FlushOnDrop {
    fn drop(&mut self) {
        self.0.flush();
    }
}

/// Run `f` as one coordinated scope across every batched store it writes.
///
/// A scope opened inside another one joins it: only the outermost scope
/// flushes.
pub fn batch<F, R>(f: F) -> R
where
    F: FnOnce(&BatchContext) -> R,
{
    match BatchContext::current() {
        Some(ctx) => f(&ctx),
        None => BatchContext::new().run(f),
    }
}

/// Asynchronous counterpart of [`batch`].
pub async fn batch_async<F, Fut>(f: F) -> Fut::Output
where
    F: FnOnce(BatchContext) -> Fut,
    Fut: Future,
{
    match BatchContext::current() {
        Some(ctx) => f(ctx).await,
        None => BatchContext::new().run_async(f).await,
    }
}
