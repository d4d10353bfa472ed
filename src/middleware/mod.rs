//! Store middlewares.
//!
//! A middleware wraps any [`StoreApi`](crate::StoreApi) and intercepts its
//! write entry point. Wrappers share the id and state of the store they
//! wrap and compose in either order.

mod batch;
pub mod sync;

pub use batch::{with_batching, Batched};
pub use sync::{with_sync, Received, SyncConfig, Synced};
