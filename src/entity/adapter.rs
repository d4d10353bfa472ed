use super::actions::EntityActions;
use super::selectors::EntitySelectors;
use super::state::{EntityId, EntityState, Identifiable, Update};
use crate::merge::merge_into;
use crate::store::{ReadableStore, StoreApi};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Maps an entity to its id.
pub type IdSelector<E, Id> = Arc<dyn Fn(&E) -> Id + Send + Sync>;

/// Total order over entities used to keep `ids` sorted.
pub type Comparer<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// Describes how one kind of entity is normalized.
///
/// The adapter holds the id selector, the optional sort comparator and the
/// optional initial entity list. Its state operations are pure functions
/// over an [`EntityState`]; [`EntityActions`] binds them to a store's
/// setter and [`EntitySelectors`] binds reads to a store's getter.
///
/// No operation fails: a missing id is a no-op on write and `None` on read.
pub struct EntityAdapter<E, Id> {
    id_selector: IdSelector<E, Id>,
    sort: Option<Comparer<E>>,
    initial: Vec<E>,
}

impl<E> EntityAdapter<E, E::Id>
where
    E: Identifiable + Clone + Send + Sync + 'static,
{
    /// Adapter keyed by the entity's own `id`.
    pub fn new() -> Self {
        Self::with_id_selector(|entity: &E| entity.id())
    }
}

impl<E> Default for EntityAdapter<E, E::Id>
where
    E: Identifiable + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, Id> EntityAdapter<E, Id>
where
    E: Clone + Send + Sync + 'static,
    Id: EntityId,
{
    /// Adapter keyed by a custom id selector.
    pub fn with_id_selector<F>(id_selector: F) -> Self
    where
        F: Fn(&E) -> Id + Send + Sync + 'static,
    {
        Self {
            id_selector: Arc::new(id_selector),
            sort: None,
            initial: Vec::new(),
        }
    }

    /// Keep `ids` ordered by `compare`.
    pub fn sorted_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&E, &E) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Arc::new(compare));
        self
    }

    /// Seed the initial state with `entities`.
    pub fn with_initial<I>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        self.initial = entities.into_iter().collect();
        self
    }

    pub fn select_id(&self, entity: &E) -> Id {
        (self.id_selector)(entity)
    }

    pub fn is_sorted(&self) -> bool {
        self.sort.is_some()
    }

    /// The initial collection, built from the seed list.
    pub fn initial_state(&self) -> EntityState<E, Id> {
        let mut state = EntityState::new();
        self.set_many(&mut state, self.initial.iter().cloned());
        state
    }

    /// Bind write operations to `store`.
    pub fn actions<S>(&self, store: S) -> EntityActions<E, Id, S>
    where
        E: PartialEq,
        S: StoreApi<EntityState<E, Id>>,
    {
        EntityActions::new(self.clone(), store)
    }

    /// Bind read operations to `store`.
    pub fn selectors<S>(&self, store: S) -> EntitySelectors<E, Id, S>
    where
        S: ReadableStore<EntityState<E, Id>>,
    {
        EntitySelectors::new(store)
    }

    pub fn add_one(&self, state: &mut EntityState<E, Id>, entity: E) {
        let id = self.select_id(&entity);
        if state.contains(&id) {
            trace!(?id, "add of existing id ignored");
            return;
        }
        self.set_one(state, entity);
    }

    pub fn add_many<I>(&self, state: &mut EntityState<E, Id>, entities: I)
    where
        I: IntoIterator<Item = E>,
    {
        let mut seen = HashSet::new();
        let fresh: Vec<E> = entities
            .into_iter()
            .filter(|entity| {
                let id = self.select_id(entity);
                !state.contains(&id) && seen.insert(id)
            })
            .collect();
        self.set_many(state, fresh);
    }

    pub fn set_one(&self, state: &mut EntityState<E, Id>, entity: E) {
        self.insert(state, entity);
        self.resort(state);
    }

    pub fn set_many<I>(&self, state: &mut EntityState<E, Id>, entities: I)
    where
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.insert(state, entity);
        }
        self.resort(state);
    }

    /// Replace the entire collection.
    pub fn set_all<I>(&self, state: &mut EntityState<E, Id>, entities: I)
    where
        I: IntoIterator<Item = E>,
    {
        *state = EntityState::new();
        self.set_many(state, entities);
    }

    /// Deep-merge `patch` into the entity at `id`.
    pub fn update_one(&self, state: &mut EntityState<E, Id>, id: &Id, patch: Value)
    where
        E: Serialize + DeserializeOwned,
    {
        if self.merge_patch(state, id, patch) {
            self.resort(state);
        }
    }

    pub fn update_many<I>(&self, state: &mut EntityState<E, Id>, updates: I)
    where
        E: Serialize + DeserializeOwned,
        I: IntoIterator<Item = Update<Id>>,
    {
        let mut changed = false;
        for Update { id, update } in updates {
            changed |= self.merge_patch(state, &id, update);
        }
        if changed {
            self.resort(state);
        }
    }

    /// Edit the entity at `id` in place.
    pub fn update_one_with<F>(&self, state: &mut EntityState<E, Id>, id: &Id, edit: F)
    where
        F: FnOnce(&mut E),
    {
        let Some(entity) = state.entities.get_mut(id) else {
            trace!(?id, "update of missing id ignored");
            return;
        };
        edit(entity);
        self.rekey(state, id);
        self.resort(state);
    }

    /// Insert when absent, otherwise merge the entity's own fields.
    pub fn upsert_one(&self, state: &mut EntityState<E, Id>, entity: E)
    where
        E: Serialize + DeserializeOwned,
    {
        let id = self.select_id(&entity);
        if !state.contains(&id) {
            self.set_one(state, entity);
            return;
        }
        match serde_json::to_value(&entity) {
            Ok(patch) => self.update_one(state, &id, patch),
            Err(error) => warn!(?id, %error, "entity could not be encoded for upsert; ignored"),
        }
    }

    pub fn upsert_many<I>(&self, state: &mut EntityState<E, Id>, entities: I)
    where
        E: Serialize + DeserializeOwned,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.upsert_one(state, entity);
        }
    }

    pub fn remove_one(&self, state: &mut EntityState<E, Id>, entity: &E) {
        let id = self.select_id(entity);
        self.remove_ids(state, std::iter::once(id));
    }

    pub fn remove_many<'a, I>(&self, state: &mut EntityState<E, Id>, entities: I)
    where
        I: IntoIterator<Item = &'a E>,
    {
        let ids: Vec<Id> = entities.into_iter().map(|e| self.select_id(e)).collect();
        self.remove_ids(state, ids);
    }

    /// Drop the given ids; absent ids are ignored.
    pub fn remove_ids<I>(&self, state: &mut EntityState<E, Id>, ids: I)
    where
        I: IntoIterator<Item = Id>,
    {
        let removed: HashSet<Id> = ids
            .into_iter()
            .filter(|id| state.entities.remove(id).is_some())
            .collect();
        if !removed.is_empty() {
            state.ids.retain(|id| !removed.contains(id));
        }
    }

    pub fn remove_all(&self, state: &mut EntityState<E, Id>) {
        *state = EntityState::new();
    }

    fn insert(&self, state: &mut EntityState<E, Id>, entity: E) {
        let id = self.select_id(&entity);
        if state.entities.insert(id.clone(), entity).is_none() {
            state.ids.push(id);
        }
    }

    // An edit that changed the entity's id moves it to its new key.
    fn rekey(&self, state: &mut EntityState<E, Id>, id: &Id) {
        match state.entities.get(id) {
            Some(entity) if &self.select_id(entity) != id => {}
            _ => return,
        }
        if let Some(entity) = state.entities.remove(id) {
            state.ids.retain(|existing| existing != id);
            self.insert(state, entity);
        }
    }

    fn merge_patch(&self, state: &mut EntityState<E, Id>, id: &Id, patch: Value) -> bool
    where
        E: Serialize + DeserializeOwned,
    {
        let Some(entity) = state.entities.get_mut(id) else {
            trace!(?id, "update of missing id ignored");
            return false;
        };
        match merge_into(entity, patch) {
            Ok(merged) => {
                *entity = merged;
                self.rekey(state, id);
                true
            }
            Err(error) => {
                warn!(?id, %error, "partial update does not fit entity; ignored");
                false
            }
        }
    }

    fn resort(&self, state: &mut EntityState<E, Id>) {
        let Some(compare) = &self.sort else {
            return;
        };
        let EntityState { ids, entities } = state;
        // Stable, so equal keys keep their previous relative order.
        ids.sort_by(|a, b| match (entities.get(a), entities.get(b)) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        });
    }
}

impl<E: Clone, Id> Clone for EntityAdapter<E, Id> {
    fn clone(&self) -> Self {
        Self {
            id_selector: Arc::clone(&self.id_selector),
            sort: self.sort.clone(),
            initial: self.initial.clone(),
        }
    }
}

impl<E, Id> fmt::Debug for EntityAdapter<E, Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityAdapter")
            .field("sorted", &self.sort.is_some())
            .field("initial", &self.initial.len())
            .finish()
    }
}
