//! Identity pool.
//!
//! The pool maps `(model, identifier)` to the live instance and the hash of
//! its last persisted content. All access goes through one mutex, so entry
//! creation, lookup, hash updates and invalidation are atomic with respect
//! to each other: two threads loading the same identifier always end up
//! with the same instance.

use crate::collection::Model;
use crate::entity::handle::{Handle, LifecycleState};
use crate::error::{CoreError, CoreResult};
use crate::types::{ContentHash, ModelKey};
use docmap_codec::{Document, EntityId};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

struct PoolEntry {
    instance: Box<dyn Any + Send + Sync>,
    hash: Option<ContentHash>,
}

/// Result of [`Pool::instantiate_if_needed`].
pub struct Instantiated<M> {
    /// The pooled instance.
    pub handle: Handle<M>,
    /// True if the instance already existed.
    pub hit: bool,
}

impl<M: Model> std::fmt::Debug for Instantiated<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instantiated")
            .field("handle", &self.handle)
            .field("hit", &self.hit)
            .finish()
    }
}

/// Process-wide registry of live entity instances.
#[derive(Default)]
pub struct Pool {
    entries: Mutex<HashMap<(ModelKey, EntityId), PoolEntry>>,
}

impl Pool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled instance for `doc`'s identifier, decoding and
    /// pooling a new one if there is none.
    ///
    /// An existing instance wins over the document's contents: the pool is
    /// authoritative for in-memory state.
    pub fn instantiate_if_needed<M: Model>(&self, doc: &Document) -> CoreResult<Instantiated<M>> {
        let id = doc.id().ok_or(CoreError::MissingIdentifier)?;
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&(M::COLLECTION, id)) {
            let handle = downcast::<M>(entry, id)?;
            return Ok(Instantiated { handle, hit: true });
        }

        let model = M::decode(doc)?;
        let handle = Handle::with_state(model, LifecycleState::Pooled);
        entries.insert(
            (M::COLLECTION, id),
            PoolEntry {
                instance: Box::new(handle.clone()),
                hash: Some(ContentHash::of(doc)),
            },
        );
        debug!(model = M::COLLECTION, %id, "pooled decoded instance");
        Ok(Instantiated { handle, hit: false })
    }

    /// Registers `handle`, replacing any entry for its identifier.
    ///
    /// The entry has no persisted hash until the first save.
    pub fn pool<M: Model>(&self, handle: &Handle<M>) {
        self.entries.lock().insert(
            (M::COLLECTION, handle.id()),
            PoolEntry {
                instance: Box::new(handle.clone()),
                hash: None,
            },
        );
    }

    /// Returns the pooled instance for `id`, if any.
    pub fn get<M: Model>(&self, id: EntityId) -> CoreResult<Option<Handle<M>>> {
        let entries = self.entries.lock();
        entries
            .get(&(M::COLLECTION, id))
            .map(|entry| downcast::<M>(entry, id))
            .transpose()
    }

    /// The last persisted content hash for `id`.
    #[must_use]
    pub fn existing_hash(&self, model: ModelKey, id: EntityId) -> Option<ContentHash> {
        self.entries
            .lock()
            .get(&(model, id))
            .and_then(|entry| entry.hash)
    }

    /// Records `hash` as persisted for `handle`, pooling it if needed.
    ///
    /// Returns false if the identifier is pooled with another instance, as
    /// happens when a handle outlives an invalidation. That entry keeps its
    /// instance but loses its hash, since the store no longer holds what it
    /// last saw.
    pub fn update_hash<M: Model>(&self, handle: &Handle<M>, hash: ContentHash) -> bool {
        let mut entries = self.entries.lock();
        match entries.entry((M::COLLECTION, handle.id())) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let same = entry
                    .instance
                    .downcast_ref::<Handle<M>>()
                    .is_some_and(|pooled| Handle::ptr_eq(pooled, handle));
                if same {
                    entry.hash = Some(hash);
                } else {
                    entry.hash = None;
                    debug!(model = M::COLLECTION, id = %handle.id(), "saved a stale instance");
                }
                same
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PoolEntry {
                    instance: Box::new(handle.clone()),
                    hash: Some(hash),
                });
                true
            }
        }
    }

    /// Returns true if no entry exists for `id`.
    #[must_use]
    pub fn is_ghost(&self, model: ModelKey, id: EntityId) -> bool {
        !self.entries.lock().contains_key(&(model, id))
    }

    /// Removes the entry for `id`. Returns true if one existed.
    pub fn invalidate(&self, model: ModelKey, id: EntityId) -> bool {
        let removed = self.entries.lock().remove(&(model, id)).is_some();
        if removed {
            debug!(model, %id, "invalidated pool entry");
        }
        removed
    }

    /// Removes every entry of `model`. Returns how many were removed.
    pub fn invalidate_collection(&self, model: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(key, _), _| *key != model);
        let removed = before - entries.len();
        debug!(model, removed, "invalidated pooled collection");
        removed
    }

    /// Number of pooled instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is pooled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn downcast<M: Model>(entry: &PoolEntry, id: EntityId) -> CoreResult<Handle<M>> {
    entry
        .instance
        .downcast_ref::<Handle<M>>()
        .cloned()
        .ok_or_else(|| {
            CoreError::internal_inconsistency(format!(
                "pool entry {}/{id} holds another model type",
                M::COLLECTION
            ))
        })
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, Schema};
    use docmap_codec::{doc, CodecResult, DocumentReader, ID_KEY};
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug)]
    struct Counter {
        id: EntityId,
        n: i32,
    }

    impl Model for Counter {
        const COLLECTION: ModelKey = "counters";

        fn schema() -> Schema {
            Schema::new(Self::COLLECTION).field("n", FieldKind::Int32)
        }

        fn id(&self) -> EntityId {
            self.id
        }

        fn encode(&self) -> Document {
            doc! { ID_KEY => self.id, "n" => self.n }
        }

        fn decode(doc: &Document) -> CodecResult<Self> {
            let reader = DocumentReader::new(doc);
            Ok(Counter {
                id: reader.field(ID_KEY)?,
                n: reader.field("n")?,
            })
        }
    }

    fn stored(n: i32) -> Document {
        doc! { ID_KEY => EntityId::new(), "n" => n }
    }

    #[test]
    fn instantiate_reuses_existing_instance() {
        let pool = Pool::new();
        let doc = stored(1);
        let first = pool.instantiate_if_needed::<Counter>(&doc).unwrap();
        assert!(!first.hit);

        let mut newer = doc.clone();
        newer.insert("n", 99);
        let second = pool.instantiate_if_needed::<Counter>(&newer).unwrap();
        assert!(second.hit);
        assert!(Handle::ptr_eq(&first.handle, &second.handle));
        assert_eq!(second.handle.read().n, 1);
    }

    #[test]
    fn instantiate_records_document_hash() {
        let pool = Pool::new();
        let doc = stored(1);
        let id = doc.id().unwrap();
        pool.instantiate_if_needed::<Counter>(&doc).unwrap();
        assert_eq!(pool.existing_hash("counters", id), Some(ContentHash::of(&doc)));
    }

    #[test]
    fn decode_errors_do_not_pool() {
        let pool = Pool::new();
        let doc = doc! { ID_KEY => EntityId::new(), "n" => "nope" };
        let err = pool.instantiate_if_needed::<Counter>(&doc).unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));
        assert!(pool.is_empty());
    }

    #[test]
    fn missing_identifier_is_rejected() {
        let pool = Pool::new();
        let err = pool
            .instantiate_if_needed::<Counter>(&doc! { "n" => 1 })
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingIdentifier));
    }

    #[test]
    fn ghost_until_pooled() {
        let pool = Pool::new();
        let handle = Handle::new(Counter {
            id: EntityId::new(),
            n: 0,
        });
        assert!(pool.is_ghost("counters", handle.id()));
        pool.pool(&handle);
        assert!(!pool.is_ghost("counters", handle.id()));
        assert_eq!(pool.existing_hash("counters", handle.id()), None);
    }

    #[test]
    fn update_hash_pools_unknown_instances() {
        let pool = Pool::new();
        let handle = Handle::new(Counter {
            id: EntityId::new(),
            n: 0,
        });
        let hash = ContentHash::of(&handle.read().encode());
        assert!(pool.update_hash(&handle, hash));
        assert_eq!(pool.existing_hash("counters", handle.id()), Some(hash));
        let found = pool.get::<Counter>(handle.id()).unwrap().unwrap();
        assert!(Handle::ptr_eq(&found, &handle));
    }

    #[test]
    fn update_hash_leaves_other_instances_alone() {
        let pool = Pool::new();
        let fresh = pool.instantiate_if_needed::<Counter>(&stored(1)).unwrap().handle;
        let stale = Handle::new(Counter { id: fresh.id(), n: 9 });

        assert!(!pool.update_hash(&stale, ContentHash::of(&stale.read().encode())));
        assert_eq!(pool.existing_hash("counters", fresh.id()), None);
        let pooled = pool.get::<Counter>(fresh.id()).unwrap().unwrap();
        assert!(Handle::ptr_eq(&pooled, &fresh));
    }

    #[test]
    fn invalidation() {
        let pool = Pool::new();
        let a = pool.instantiate_if_needed::<Counter>(&stored(1)).unwrap().handle;
        pool.instantiate_if_needed::<Counter>(&stored(2)).unwrap();
        assert_eq!(pool.len(), 2);

        assert!(pool.invalidate("counters", a.id()));
        assert!(!pool.invalidate("counters", a.id()));
        assert!(pool.get::<Counter>(a.id()).unwrap().is_none());

        assert_eq!(pool.invalidate_collection("counters"), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn concurrent_instantiation_yields_one_instance() {
        let pool = Arc::new(Pool::new());
        let doc = Arc::new(stored(7));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let doc = Arc::clone(&doc);
                thread::spawn(move || pool.instantiate_if_needed::<Counter>(&doc).unwrap().handle)
            })
            .collect();
        let handles: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        for handle in &handles[1..] {
            assert!(Handle::ptr_eq(&handles[0], handle));
        }
        assert_eq!(pool.len(), 1);
    }
}
