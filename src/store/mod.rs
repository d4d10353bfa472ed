//! The store contract and the base store.
//!
//! Every store in the crate, whether plain, wrapped in middleware or
//! derived, exposes the same read/subscribe contract. Writable stores add
//! a single write entry point, `set_state`, which middlewares intercept.

mod api;
mod store;

pub use api::{Listener, ReadableStore, SetState, StoreApi, StoreId, Subscription};
pub use store::Store;
