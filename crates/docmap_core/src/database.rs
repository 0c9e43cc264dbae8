//! Database facade.

use crate::collection::{Collection, Model};
use crate::config::Config;
use crate::entity::{Handle, Pool};
use crate::error::{CoreError, CoreResult};
use crate::migration::{MigrationOutcome, MigrationPlan, Migrator};
use crate::query::{strip_synthetic, PreparedQuery, Query};
use crate::schema::Registry;
use crate::stats::Stats;
use docmap_codec::{doc, Document, EntityId, Value, ID_KEY};
use docmap_store::{DocumentStore, UpdateSpec};
use std::sync::Arc;
use tracing::info;

struct Inner {
    store: Arc<dyn DocumentStore>,
    registry: Registry,
    pool: Pool,
    config: Config,
    stats: Stats,
}

/// The main database handle.
///
/// `Database` ties a [`DocumentStore`] to the model [`Registry`] and owns
/// the identity pool. Clones share everything, so one `Database` per store
/// and process gives one live instance per entity.
///
/// # Opening a Database
///
/// ```rust,ignore
/// use docmap_core::{Database, schema::Registry};
/// use docmap_store::InMemoryStore;
/// use std::sync::Arc;
///
/// let registry = Registry::new().register::<User>().register::<Post>();
/// let db = Database::open(Arc::new(InMemoryStore::new()), registry)?;
///
/// let users = db.collection::<User>()?;
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Opens a database with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry fails [`Registry::validate`]: a
    /// reference targets an unregistered model, or models reference each
    /// other in a cycle.
    pub fn open(store: Arc<dyn DocumentStore>, registry: Registry) -> CoreResult<Self> {
        Self::open_with_config(store, registry, Config::default())
    }

    /// Opens a database with custom configuration.
    pub fn open_with_config(
        store: Arc<dyn DocumentStore>,
        registry: Registry,
        config: Config,
    ) -> CoreResult<Self> {
        registry.validate()?;
        info!(
            models = registry.len(),
            ledger = %config.ledger_collection,
            "database opened"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                registry,
                pool: Pool::new(),
                config,
                stats: Stats::new(),
            }),
        })
    }

    /// Typed access to the collection of `M`.
    ///
    /// Fails with [`CoreError::ModelNotRegistered`] if `M` is not in the
    /// registry.
    pub fn collection<M: Model>(&self) -> CoreResult<Collection<M>> {
        if !self.inner.registry.contains(M::COLLECTION) {
            return Err(CoreError::model_not_registered(M::COLLECTION));
        }
        Ok(Collection::new(self.clone()))
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// The model registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The identity pool.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Operation counters.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    /// Returns the pooled instance for `doc`, decoding it on first sight.
    pub(crate) fn instantiate<M: Model>(&self, doc: &Document) -> CoreResult<Handle<M>> {
        let instantiated = self.inner.pool.instantiate_if_needed::<M>(doc)?;
        if instantiated.hit {
            self.inner.stats.record_pool_hit();
        } else {
            self.inner.stats.record_pool_miss();
        }
        Ok(instantiated.handle)
    }

    /// Sets fields on every entity matching `filter` without loading them.
    ///
    /// `set` maps dotted paths to new values and is checked against the
    /// schema of `M` first. Pooled instances of the matched entities are
    /// invalidated, so later lookups re-read them. Returns the number of
    /// modified documents.
    pub fn patch<M: Model>(&self, filter: &Query<M>, set: Document) -> CoreResult<u64> {
        M::schema().check_partial(&set)?;

        let ids = self.matching_ids::<M>(filter)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let id_values: Vec<Value> = ids.iter().copied().map(Value::Id).collect();
        let spec = UpdateSpec::new(
            doc! { ID_KEY => doc! { "$in" => id_values } },
            doc! { "$set" => set },
            false,
            true,
        );
        let result = self.inner.store.update(M::COLLECTION, &spec)?;
        for id in ids {
            self.inner.pool.invalidate(M::COLLECTION, id);
        }
        info!(
            collection = M::COLLECTION,
            matched = result.matched,
            modified = result.modified,
            "patched documents"
        );
        Ok(result.modified)
    }

    fn matching_ids<M: Model>(&self, filter: &Query<M>) -> CoreResult<Vec<EntityId>> {
        let docs = match filter.prepare() {
            PreparedQuery::Find(request) => self.inner.store.find(M::COLLECTION, &request)?,
            PreparedQuery::Aggregate { stages, synthetic } => {
                let mut docs = self.inner.store.aggregate(M::COLLECTION, &stages)?;
                for doc in &mut docs {
                    strip_synthetic(doc, &synthetic);
                }
                docs
            }
        };
        docs.iter()
            .map(|doc| doc.id().ok_or(CoreError::MissingIdentifier))
            .collect()
    }

    /// A migrator bound to this database.
    #[must_use]
    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.clone())
    }

    /// Runs the migration `description` on the collection of `M`, once.
    ///
    /// See [`Migrator::migrate`].
    pub fn migrate<'a, M: Model>(
        &self,
        description: &str,
        build: impl FnOnce(&mut MigrationPlan<'a>),
    ) -> CoreResult<MigrationOutcome> {
        self.migrator().migrate::<M>(description, build)
    }

    /// Runs the migration `description` on `collection`, once.
    pub fn migrate_collection<'a>(
        &self,
        collection: &str,
        description: &str,
        build: impl FnOnce(&mut MigrationPlan<'a>),
    ) -> CoreResult<MigrationOutcome> {
        self.migrator()
            .migrate_collection(collection, description, build)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("models", &self.inner.registry.len())
            .field("pooled", &self.inner.pool.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DeleteRule, FieldKind, Schema};
    use crate::types::ModelKey;
    use docmap_codec::{CodecResult, DocumentReader};
    use docmap_store::InMemoryStore;

    #[derive(Debug)]
    struct Item {
        id: EntityId,
        qty: i32,
    }

    impl Model for Item {
        const COLLECTION: ModelKey = "items";

        fn schema() -> Schema {
            Schema::new(Self::COLLECTION).field("qty", FieldKind::Int32)
        }

        fn id(&self) -> EntityId {
            self.id
        }

        fn encode(&self) -> Document {
            doc! { "qty" => self.qty }
        }

        fn decode(doc: &Document) -> CodecResult<Self> {
            let reader = DocumentReader::new(doc);
            Ok(Self {
                id: reader.field(ID_KEY)?,
                qty: reader.field("qty")?,
            })
        }
    }

    struct Orphan;

    impl Model for Orphan {
        const COLLECTION: ModelKey = "orphans";

        fn schema() -> Schema {
            Schema::new(Self::COLLECTION)
                .field("item", FieldKind::reference("missing", DeleteRule::Deny))
        }

        fn id(&self) -> EntityId {
            EntityId::new()
        }

        fn encode(&self) -> Document {
            Document::new()
        }

        fn decode(_doc: &Document) -> CodecResult<Self> {
            Ok(Self)
        }
    }

    fn database() -> (Database, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let db = Database::open(store.clone(), Registry::new().register::<Item>()).unwrap();
        (db, store)
    }

    #[test]
    fn open_validates_the_registry() {
        let store = Arc::new(InMemoryStore::new());
        let err = Database::open(store, Registry::new().register::<Orphan>()).unwrap_err();
        assert!(matches!(err, CoreError::ModelNotRegistered { ref model } if model == "missing"));
    }

    #[test]
    fn unregistered_collections_are_rejected() {
        let (db, _) = database();
        assert!(db.collection::<Item>().is_ok());
        assert!(matches!(
            db.collection::<Orphan>().unwrap_err(),
            CoreError::ModelNotRegistered { .. }
        ));
    }

    #[test]
    fn instantiate_records_hits_and_misses() {
        let (db, _) = database();
        let id = EntityId::new();
        let stored = doc! { ID_KEY => id, "qty" => 1 };
        let a = db.instantiate::<Item>(&stored).unwrap();
        let b = db.instantiate::<Item>(&stored).unwrap();
        assert!(Handle::ptr_eq(&a, &b));
        assert_eq!(db.stats().pool_misses(), 1);
        assert_eq!(db.stats().pool_hits(), 1);
    }

    #[test]
    fn patch_validates_and_invalidates() {
        let (db, store) = database();
        let items = db.collection::<Item>().unwrap();
        let item = Handle::new(Item {
            id: EntityId::new(),
            qty: 1,
        });
        items.save(&item).unwrap();
        assert!(!db.pool().is_ghost("items", item.id()));

        let err = db
            .patch(&Query::<Item>::all(), doc! { "colour" => "red" })
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownField { .. }));

        let modified = db.patch(&Query::<Item>::all(), doc! { "qty" => 5 }).unwrap();
        assert_eq!(modified, 1);
        assert!(db.pool().is_ghost("items", item.id()));
        assert_eq!(store.documents("items")[0].get("qty"), Some(&Value::Int32(5)));

        let fresh = items.get(item.id()).unwrap().unwrap();
        assert_eq!(fresh.read().qty, 5);
        assert!(!Handle::ptr_eq(&fresh, &item));
    }
}
