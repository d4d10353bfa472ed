use super::adapter::EntityAdapter;
use super::state::{EntityId, EntityState, Update};
use crate::store::StoreApi;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Entity write operations bound to a store's setter.
///
/// Every action is submitted as a single functional write, so it composes
/// with whatever middleware sits in front of the store.
pub struct EntityActions<E, Id, S> {
    adapter: EntityAdapter<E, Id>,
    store: S,
}

impl<E, Id, S> EntityActions<E, Id, S>
where
    E: Clone + PartialEq + Send + Sync + 'static,
    Id: EntityId,
    S: StoreApi<EntityState<E, Id>>,
{
    pub fn new(adapter: EntityAdapter<E, Id>, store: S) -> Self {
        Self { adapter, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn apply<F>(&self, op: F)
    where
        F: FnOnce(&EntityAdapter<E, Id>, &mut EntityState<E, Id>) + Send + 'static,
    {
        let adapter = self.adapter.clone();
        self.store.update(move |state| op(&adapter, state));
    }

    pub fn add_one(&self, entity: E) {
        self.apply(move |adapter, state| adapter.add_one(state, entity));
    }

    pub fn add_many(&self, entities: Vec<E>) {
        self.apply(move |adapter, state| adapter.add_many(state, entities));
    }

    pub fn set_one(&self, entity: E) {
        self.apply(move |adapter, state| adapter.set_one(state, entity));
    }

    pub fn set_many(&self, entities: Vec<E>) {
        self.apply(move |adapter, state| adapter.set_many(state, entities));
    }

    pub fn set_all(&self, entities: Vec<E>) {
        self.apply(move |adapter, state| adapter.set_all(state, entities));
    }

    pub fn update_one_with<F>(&self, id: Id, edit: F)
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        self.apply(move |adapter, state| adapter.update_one_with(state, &id, edit));
    }

    pub fn remove_one(&self, entity: &E) {
        let id = self.adapter.select_id(entity);
        self.apply(move |adapter, state| adapter.remove_ids(state, [id]));
    }

    pub fn remove_many(&self, entities: &[E]) {
        let ids: Vec<Id> = entities.iter().map(|e| self.adapter.select_id(e)).collect();
        self.apply(move |adapter, state| adapter.remove_ids(state, ids));
    }

    pub fn remove_ids(&self, ids: Vec<Id>) {
        self.apply(move |adapter, state| adapter.remove_ids(state, ids));
    }

    pub fn remove_all(&self) {
        self.store.set(EntityState::new());
    }
}

impl<E, Id, S> EntityActions<E, Id, S>
where
    E: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    Id: EntityId,
    S: StoreApi<EntityState<E, Id>>,
{
    pub fn update_one(&self, id: Id, update: Value) {
        self.apply(move |adapter, state| adapter.update_one(state, &id, update));
    }

    pub fn update_many(&self, updates: Vec<Update<Id>>) {
        self.apply(move |adapter, state| adapter.update_many(state, updates));
    }

    pub fn upsert_one(&self, entity: E) {
        self.apply(move |adapter, state| adapter.upsert_one(state, entity));
    }

    pub fn upsert_many(&self, entities: Vec<E>) {
        self.apply(move |adapter, state| adapter.upsert_many(state, entities));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Identifiable;
    use crate::store::{ReadableStore, Store};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: u32,
        body: String,
    }

    impl Identifiable for Note {
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }
    }

    fn note(id: u32, body: &str) -> Note {
        Note {
            id,
            body: body.into(),
        }
    }

    fn setup() -> (Store<EntityState<Note, u32>>, EntityActions<Note, u32, Store<EntityState<Note, u32>>>) {
        let adapter = EntityAdapter::<Note, u32>::new();
        let store = Store::new(adapter.initial_state());
        let actions = adapter.actions(store.clone());
        (store, actions)
    }

    #[test]
    fn each_action_is_one_transition() {
        let (store, actions) = setup();
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        let _sub = store.subscribe(move |_: &EntityState<Note, u32>, _: &EntityState<Note, u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        actions.add_many(vec![note(1, "a"), note(2, "b"), note(3, "c")]);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(store.get().len(), 3);
    }

    #[test]
    fn noop_actions_do_not_notify() {
        let (store, actions) = setup();
        actions.add_one(note(1, "a"));

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        let _sub = store.subscribe(move |_: &EntityState<Note, u32>, _: &EntityState<Note, u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        actions.add_one(note(1, "again"));
        actions.update_one(42, json!({"body": "ghost"}));
        actions.remove_one(&note(99, ""));
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_and_upsert_through_store() {
        let (store, actions) = setup();
        actions.set_all(vec![note(1, "a"), note(2, "b")]);
        actions.update_one(1, json!({"body": "A"}));
        actions.update_one_with(2, |n| n.body.push('!'));
        actions.upsert_one(note(3, "c"));
        actions.update_many(vec![Update::new(3, json!({"body": "C"}))]);
        actions.upsert_many(vec![note(1, "AA")]);

        let state = store.get();
        assert_eq!(state.ids(), [1, 2, 3]);
        assert_eq!(state.entities()[&1u32].body, "AA");
        assert_eq!(state.entities()[&2u32].body, "b!");
        assert_eq!(state.entities()[&3u32].body, "C");
    }

    #[test]
    fn removal_actions() {
        let (store, actions) = setup();
        actions.set_many(vec![note(1, "a"), note(2, "b"), note(3, "c"), note(4, "d")]);
        actions.remove_many(&[note(1, ""), note(2, "")]);
        actions.remove_ids(vec![3]);
        assert_eq!(store.get().ids(), [4]);

        actions.set_one(note(5, "e"));
        actions.remove_all();
        assert!(store.get().is_empty());
    }
}
