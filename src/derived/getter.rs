use crate::store::{ReadableStore, StoreId, Subscription};
use std::sync::Arc;

/// Callback a dependency fires when its source notifies.
pub(crate) type OnChange = Arc<dyn Fn() + Send + Sync>;

/// A source read during one derivation pass, with the state seen then.
pub(crate) trait Dependency: Send + Sync {
    fn id(&self) -> StoreId;

    /// Whether the source's state now differs from the state seen.
    fn is_changed(&self) -> bool;

    fn subscribe(&self, on_change: OnChange) -> Subscription;
}

struct Observed<U, S> {
    store: S,
    seen: U,
}

impl<U, S> Dependency for Observed<U, S>
where
    U: PartialEq + Send + Sync + 'static,
    S: ReadableStore<U> + 'static,
{
    fn id(&self) -> StoreId {
        self.store.id()
    }

    fn is_changed(&self) -> bool {
        self.store.with_state(|current| *current != self.seen)
    }

    fn subscribe(&self, on_change: OnChange) -> Subscription {
        self.store.subscribe(move |_: &U, _: &U| on_change())
    }
}

/// Accessor handed to a derivation function.
///
/// Every store read through [`Getter::get`] becomes a dependency of the
/// derived store for this pass.
pub struct Getter<T> {
    previous: Option<T>,
    pub(crate) dependencies: Vec<Box<dyn Dependency>>,
}

impl<T> Getter<T> {
    pub(crate) fn new(previous: Option<T>) -> Self {
        Self {
            previous,
            dependencies: Vec::new(),
        }
    }

    /// Read `store` and record it as a dependency.
    pub fn get<U, S>(&mut self, store: &S) -> U
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        S: ReadableStore<U> + Clone + 'static,
    {
        let state = store.get_state();
        let id = store.id();
        self.dependencies.retain(|dependency| dependency.id() != id);
        self.dependencies.push(Box::new(Observed {
            store: store.clone(),
            seen: state.clone(),
        }));
        state
    }

    /// The value computed by the previous pass, if any.
    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }
}

impl<T> std::fmt::Debug for Getter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Getter")
            .field("has_previous", &self.previous.is_some())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}
