//! # Pantry
//!
//! Normalized entity stores with composable middlewares and derived stores.
//!
//! Pantry provides a small state-management runtime in layers:
//!
//! ## Stores
//!
//! - `Store<T>` - Thread-safe state container; listeners receive
//!   `(new_state, previous_state)`
//! - `EntityAdapter` - Normalized keyed collections with CRUD actions and
//!   selectors, held in an ordinary `Store`
//!
//! ## Middlewares
//!
//! Wrappers over a store's write entry point, composable in either order:
//! - `with_batching` - Coalesce a burst of writes into one transition, per
//!   store or across several stores with [`batch`]
//! - `with_sync` - Keep copies of a store in separate contexts consistent
//!   with last-write-wins timestamps
//!
//! ## Derived stores
//!
//! - `derive` - Read-only stores computed lazily from other stores, with
//!   automatic dependency tracking

pub mod derived;
pub mod entity;
pub mod error;
pub mod merge;
pub mod middleware;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use derived::{derive, DerivedStore, Getter};
pub use entity::{create_entity_store, EntityAdapter, EntityState, Identifiable, Update};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use middleware::sync::{BroadcastHub, SyncContext};
pub use middleware::{with_batching, with_sync, Batched, Received, SyncConfig, Synced};
pub use runtime::{batch, batch_async, BatchContext};
pub use store::{ReadableStore, SetState, Store, StoreApi, StoreId, Subscription};
