use crate::error::StoreResult;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Listener invoked with `(new_state, previous_state)` after every transition.
pub type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// Process-unique identity of a store.
///
/// Middleware wrappers report the id of the store they wrap, since they
/// share its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(usize);

impl StoreId {
    /// Allocate the next unique id.
    pub fn next() -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// A write submitted to a store's setter.
pub enum SetState<T> {
    /// Replace the whole state.
    Replace(T),
    /// Compute the next state from the current one.
    Update(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T> SetState<T> {
    /// Build a functional write.
    pub fn update<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        SetState::Update(Box::new(f))
    }

    /// Resolve this write against `current`.
    pub fn apply(self, current: &T) -> T {
        match self {
            SetState::Replace(next) => next,
            SetState::Update(f) => f(current),
        }
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetState::Replace(_) => f.write_str("SetState::Replace(..)"),
            SetState::Update(_) => f.write_str("SetState::Update(..)"),
        }
    }
}

/// Read side of every store: plain, middleware-wrapped or derived.
pub trait ReadableStore<T>: Send + Sync {
    /// Identity used for dependency tracking and batch registration.
    fn id(&self) -> StoreId;

    /// Current committed state.
    fn get_state(&self) -> T;

    /// Borrow the current state for the duration of `f`.
    fn with_state<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.get_state())
    }

    /// Register a listener. Dropping the returned guard unsubscribes it.
    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static;
}

/// Full store contract: readable plus the write entry point.
pub trait StoreApi<T>: ReadableStore<T> {
    /// The write entry point that middlewares intercept.
    fn set_state(&self, update: SetState<T>);

    /// The state the store was created with.
    fn get_initial_state(&self) -> StoreResult<T>;

    /// Drop every listener.
    fn destroy(&self) -> StoreResult<()>;

    /// Replace the whole state.
    fn set(&self, next: T) {
        self.set_state(SetState::Replace(next));
    }

    /// Update the state in place using a function.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
        T: Clone,
    {
        self.set_state(SetState::update(move |current: &T| {
            let mut next = current.clone();
            f(&mut next);
            next
        }));
    }
}

/// RAII guard for store listeners.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    /// Keep the listener registered for the life of the store.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn store_ids_are_unique() {
        let a = StoreId::next();
        let b = StoreId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn set_state_apply() {
        assert_eq!(SetState::Replace(3).apply(&1), 3);
        assert_eq!(SetState::update(|n: &i32| n + 1).apply(&1), 2);
    }

    #[test]
    fn subscription_drop_and_detach() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        drop(Subscription::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(fired.load(Ordering::SeqCst));

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        Subscription::new(move || flag.store(true, Ordering::SeqCst)).detach();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
