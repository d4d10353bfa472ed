use super::state::{EntityId, EntityState};
use crate::store::ReadableStore;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

pub fn select_ids<E, Id: Eq + Hash>(state: &EntityState<E, Id>) -> &[Id] {
    &state.ids
}

pub fn select_entities<E, Id: Eq + Hash>(state: &EntityState<E, Id>) -> &HashMap<Id, E> {
    &state.entities
}

/// Entities in `ids` order.
///
/// Ids without an entity are skipped rather than reported.
pub fn select_all<E, Id: Eq + Hash>(state: &EntityState<E, Id>) -> Vec<&E> {
    state
        .ids
        .iter()
        .filter_map(|id| state.entities.get(id))
        .collect()
}

pub fn select_total<E, Id: Eq + Hash>(state: &EntityState<E, Id>) -> usize {
    state.ids.len()
}

pub fn select_by_id<'a, E, Id: Eq + Hash>(state: &'a EntityState<E, Id>, id: &Id) -> Option<&'a E> {
    state.entities.get(id)
}

/// Selectors pre-bound to a store's getter.
pub struct EntitySelectors<E, Id, S> {
    store: S,
    _entity: PhantomData<fn() -> (E, Id)>,
}

impl<E, Id, S> EntitySelectors<E, Id, S>
where
    E: Clone,
    Id: EntityId,
    S: ReadableStore<EntityState<E, Id>>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn select_ids(&self) -> Vec<Id> {
        self.store.with_state(|state| select_ids(state).to_vec())
    }

    pub fn select_entities(&self) -> HashMap<Id, E> {
        self.store.with_state(|state| select_entities(state).clone())
    }

    pub fn select_all(&self) -> Vec<E> {
        self.store
            .with_state(|state| select_all(state).into_iter().cloned().collect())
    }

    pub fn select_total(&self) -> usize {
        self.store.with_state(select_total)
    }

    pub fn select_by_id(&self, id: &Id) -> Option<E> {
        self.store
            .with_state(|state| select_by_id(state, id).cloned())
    }
}
