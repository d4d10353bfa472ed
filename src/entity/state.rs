use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Key type usable as an entity id.
pub trait EntityId:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EntityId for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Entities that carry their own id, used by the default id selector.
pub trait Identifiable {
    type Id: EntityId;

    fn id(&self) -> Self::Id;
}

/// Normalized collection: an ordered id list plus an id-keyed map.
///
/// The keys of `entities` always equal the values of `ids`. With a sort
/// comparator configured on the adapter, `ids` follows that order;
/// otherwise it is insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState<E, Id>
where
    Id: Eq + Hash,
{
    pub(crate) ids: Vec<Id>,
    pub(crate) entities: HashMap<Id, E>,
}

impl<E, Id> EntityState<E, Id>
where
    Id: Eq + Hash,
{
    /// An empty collection.
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            entities: HashMap::new(),
        }
    }

    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    pub fn entities(&self) -> &HashMap<Id, E> {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.entities.contains_key(id)
    }
}

impl<E, Id> Default for EntityState<E, Id>
where
    Id: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A partial update addressed to one entity.
///
/// `update` is a JSON patch deep-merged into the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<Id> {
    pub id: Id,
    pub update: Value,
}

impl<Id> Update<Id> {
    pub fn new(id: Id, update: Value) -> Self {
        Self { id, update }
    }
}
