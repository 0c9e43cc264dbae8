//! Typed references between entities.

use crate::collection::Model;
use crate::database::Database;
use crate::entity::Handle;
use crate::error::CoreResult;
use docmap_codec::{CodecResult, EntityId, FieldPath, FieldValue, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A stored reference to an entity of model `M`.
///
/// Only the identifier is stored. Referential integrity is checked when the
/// target is deleted, never when the reference is written.
pub struct Reference<M> {
    id: EntityId,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Reference<M> {
    /// Creates a reference to `id`.
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The referenced identifier.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }
}

impl<M: Model> Reference<M> {
    /// Loads the referenced entity, from the pool when possible.
    ///
    /// Returns `None` if the target no longer exists.
    pub fn resolve(&self, db: &Database) -> CoreResult<Option<Handle<M>>> {
        db.collection::<M>()?.get(self.id)
    }
}

impl<M: Model> From<&Handle<M>> for Reference<M> {
    fn from(handle: &Handle<M>) -> Self {
        Self::new(handle.id())
    }
}

impl<M> From<EntityId> for Reference<M> {
    fn from(id: EntityId) -> Self {
        Self::new(id)
    }
}

impl<M> Clone for Reference<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Reference<M> {}

impl<M> PartialEq for Reference<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for Reference<M> {}

impl<M> Hash for Reference<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for Reference<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.id)
    }
}

impl<M> FieldValue for Reference<M> {
    fn encode(&self) -> Value {
        Value::Id(self.id)
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        EntityId::decode(value, path).map(Self::new)
    }
}
