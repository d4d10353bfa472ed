//! Normalized entity collections.
//!
//! An [`EntityAdapter`] describes how one kind of entity is keyed and
//! ordered. The adapter's operations are pure functions over an
//! [`EntityState`]; [`EntityActions`] and [`EntitySelectors`] bind them to
//! a concrete store.
//!
//! ```
//! use pantry::entity::{create_entity_store, EntityAdapter, Identifiable};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Task {
//!     id: String,
//!     title: String,
//! }
//!
//! impl Identifiable for Task {
//!     type Id = String;
//!     fn id(&self) -> String {
//!         self.id.clone()
//!     }
//! }
//!
//! let adapter = EntityAdapter::<Task, String>::new();
//! let store = create_entity_store(&adapter);
//! let actions = adapter.actions(store.clone());
//! let selectors = adapter.selectors(store);
//!
//! actions.add_one(Task { id: "t1".into(), title: "buy milk".into() });
//! actions.update_one("t1".into(), json!({"title": "buy oat milk"}));
//! assert_eq!(selectors.select_by_id(&"t1".into()).unwrap().title, "buy oat milk");
//! ```

mod actions;
mod adapter;
mod selectors;
mod state;

pub use actions::EntityActions;
pub use adapter::{Comparer, EntityAdapter, IdSelector};
pub use selectors::{
    select_all, select_by_id, select_entities, select_ids, select_total, EntitySelectors,
};
pub use state::{EntityId, EntityState, Identifiable, Update};

use crate::store::Store;

/// Build a base store holding the adapter's initial state.
pub fn create_entity_store<E, Id>(adapter: &EntityAdapter<E, Id>) -> Store<EntityState<E, Id>>
where
    E: Clone + PartialEq + Send + Sync + 'static,
    Id: EntityId,
{
    Store::new(adapter.initial_state())
}
