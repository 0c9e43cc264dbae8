//! Typed collection implementation.

use crate::collection::lifecycle::{
    delete_single, execute_plan, save_instance, FindOptions, SaveOptions, SaveOutcome,
};
use crate::collection::Model;
use crate::database::Database;
use crate::entity::{ErasedHandle, Handle, LifecycleState};
use crate::error::{CoreError, CoreResult};
use crate::query::{strip_synthetic, Field, PreparedQuery, Query, COUNT_FIELD};
use crate::schema::{plan_deletion, DeleteRule, DeletionPlan, ReferenceField};
use crate::types::ModelKey;
use docmap_codec::{Document, EntityId, Value};
use docmap_store::FindRequest;
use std::marker::PhantomData;
use tracing::warn;

/// A declared reference value held by an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReference {
    /// Dotted path of the reference field.
    pub path: String,
    /// Collection of the referenced model.
    pub target: ModelKey,
    /// The referenced identifier.
    pub id: EntityId,
    /// Rule applied when the target is deleted.
    pub rule: DeleteRule,
}

/// Typed access to the collection of model `M`.
///
/// Cheap to create and clone; it only holds the [`Database`].
///
/// # Example
///
/// ```rust,ignore
/// let users = db.collection::<User>()?;
///
/// let alice = Handle::new(User::new("Alice", 30));
/// users.save(&alice)?;
///
/// // Identifier lookups are answered by the identity pool.
/// let again = users.get(alice.id())?.unwrap();
/// assert!(Handle::ptr_eq(&alice, &again));
///
/// let adults = users.find(&User::fields().age.gte(&18))?;
/// ```
pub struct Collection<M: Model> {
    db: Database,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Collection<M> {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> ModelKey {
        M::COLLECTION
    }

    /// The owning database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the entities matching `query`.
    ///
    /// Documents that fail to decode are logged and skipped.
    pub fn find(&self, query: &Query<M>) -> CoreResult<Vec<Handle<M>>> {
        self.find_with(query, FindOptions::default())
    }

    /// [`Collection::find`] with per-call options.
    pub fn find_with(&self, query: &Query<M>, options: FindOptions) -> CoreResult<Vec<Handle<M>>> {
        if let Some(handle) = self.pooled_lookup(query, options)? {
            return Ok(vec![handle]);
        }
        match query.prepare() {
            PreparedQuery::Find(request) => self.find_raw(&request),
            PreparedQuery::Aggregate { stages, synthetic } => {
                let docs = self.db.store().aggregate(M::COLLECTION, &stages)?;
                self.instantiate_all(docs.into_iter().map(|mut doc| {
                    strip_synthetic(&mut doc, &synthetic);
                    doc
                }))
            }
        }
    }

    /// Returns the first entity matching `query`.
    pub fn find_one(&self, query: &Query<M>) -> CoreResult<Option<Handle<M>>> {
        self.find_one_with(query, FindOptions::default())
    }

    /// [`Collection::find_one`] with per-call options.
    pub fn find_one_with(&self, query: &Query<M>, options: FindOptions) -> CoreResult<Option<Handle<M>>> {
        if let Some(handle) = self.pooled_lookup(query, options)? {
            return Ok(Some(handle));
        }
        match query.clone().limit(1).prepare() {
            PreparedQuery::Find(request) => {
                Ok(self.find_raw(&request.batch_size(1))?.into_iter().next())
            }
            PreparedQuery::Aggregate { .. } => {
                Ok(self.find_with(&query.clone().limit(1), FindOptions::bypass_pool())?
                    .into_iter()
                    .next())
            }
        }
    }

    /// Looks up one entity by identifier, from the pool when possible.
    pub fn get(&self, id: EntityId) -> CoreResult<Option<Handle<M>>> {
        self.find_one(&Field::<M, EntityId>::id().eq(&id))
    }

    /// Counts the entities matching `query`, honouring its window.
    pub fn count(&self, query: &Query<M>) -> CoreResult<u64> {
        match query.prepare() {
            PreparedQuery::Find(request) => Ok(self.db.store().count(
                M::COLLECTION,
                &request.filter,
                request.skip,
                request.limit,
            )?),
            prepared @ PreparedQuery::Aggregate { .. } => {
                let PreparedQuery::Aggregate { stages, .. } = prepared.counting() else {
                    return Err(CoreError::internal_inconsistency("count lost its pipeline"));
                };
                let docs = self.db.store().aggregate(M::COLLECTION, &stages)?;
                let Some(result) = docs.first() else {
                    return Ok(0);
                };
                result
                    .get(COUNT_FIELD)
                    .and_then(Value::as_i64)
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| {
                        CoreError::internal_inconsistency(format!(
                            "count pipeline on {} returned no `{COUNT_FIELD}` field",
                            M::COLLECTION
                        ))
                    })
            }
        }
    }

    /// Runs a raw find request.
    pub fn find_raw(&self, request: &FindRequest) -> CoreResult<Vec<Handle<M>>> {
        let docs = self.db.store().find(M::COLLECTION, request)?;
        self.instantiate_all(docs)
    }

    /// Counts documents matching a raw filter.
    pub fn count_raw(&self, filter: &Document) -> CoreResult<u64> {
        Ok(self.db.store().count(M::COLLECTION, filter, None, None)?)
    }

    /// Deletes the entities matching a raw filter. See [`Collection::remove`].
    pub fn remove_raw(&self, filter: &Document, limit: Option<u64>) -> CoreResult<u64> {
        let mut request = FindRequest::new(filter.clone());
        request.limit = limit;
        let handles = self.find_raw(&request)?;
        self.delete_each(handles)
    }

    /// Deletes the entities matching `query`, at most `limit` of them.
    ///
    /// Every match is attempted. If any deletion fails the call fails with
    /// [`CoreError::DeletingMultiple`] listing each failure; the others
    /// stay deleted.
    pub fn remove(&self, query: &Query<M>, limit: Option<u64>) -> CoreResult<u64> {
        let query = match limit {
            Some(n) => query.clone().limit(n),
            None => query.clone(),
        };
        let handles = self.find_with(&query, FindOptions::bypass_pool())?;
        self.delete_each(handles)
    }

    fn delete_each(&self, handles: Vec<Handle<M>>) -> CoreResult<u64> {
        let mut deleted = 0;
        let mut errors = Vec::new();
        for handle in handles {
            match self.delete(&handle) {
                Ok(()) => deleted += 1,
                Err(err) => errors.push((handle.id(), err)),
            }
        }
        if errors.is_empty() {
            Ok(deleted)
        } else {
            Err(CoreError::DeletingMultiple { errors })
        }
    }

    /// Saves `handle` manually without forcing.
    pub fn save(&self, handle: &Handle<M>) -> CoreResult<SaveOutcome> {
        self.save_with(handle, SaveOptions::manual())
    }

    /// Saves `handle` with explicit options.
    pub fn save_with(&self, handle: &Handle<M>, options: SaveOptions) -> CoreResult<SaveOutcome> {
        save_instance(&self.db, handle, options)
    }

    /// Wraps a new entity and registers it with the pool.
    ///
    /// The entity is not written until its first save.
    #[must_use]
    pub fn attach(&self, model: M) -> Handle<M> {
        let handle = Handle::new(model);
        self.db.pool().pool(&handle);
        handle
    }

    /// Deletes `handle`, applying delete rules.
    ///
    /// Fails with [`CoreError::UndeletableObject`] before anything is
    /// removed if a `Deny` reference blocks the deletion. Cascaded entities
    /// are removed first; a failure part way leaves the earlier removals in
    /// place.
    pub fn delete(&self, handle: &Handle<M>) -> CoreResult<()> {
        if handle.state() == LifecycleState::Deleted {
            return delete_single(&self.db, handle);
        }
        let plan = self.validate_deletion(handle)?;
        execute_plan(&self.db, handle, &plan)
    }

    /// Checks delete rules for `handle` and returns the cascade that
    /// deleting it would run. Nothing is modified.
    pub fn validate_deletion(&self, handle: &Handle<M>) -> CoreResult<DeletionPlan> {
        plan_deletion(
            self.db.registry(),
            &**self.db.store(),
            M::COLLECTION,
            handle.id(),
        )
    }

    /// Returns true if deleting `handle` would pass delete-rule checks.
    pub fn can_be_deleted(&self, handle: &Handle<M>) -> CoreResult<bool> {
        match self.validate_deletion(handle) {
            Ok(_) => Ok(true),
            Err(CoreError::UndeletableObject { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Registered models with reference fields targeting `M`.
    #[must_use]
    pub fn referencing_models(&self) -> Vec<(ModelKey, Vec<ReferenceField>)> {
        self.db.registry().referencing_types(M::COLLECTION)
    }

    /// Number of stored entities referencing `handle`, over all models.
    pub fn reference_count(&self, handle: &Handle<M>) -> CoreResult<u64> {
        let mut total = 0;
        for (source, fields) in self.referencing_models() {
            let filter = referencing_filter(&fields, handle.id());
            total += self.db.store().count(source, &filter, None, None)?;
        }
        Ok(total)
    }

    /// Entities referencing `handle`, one referencing model at a time.
    ///
    /// Each model is queried only when the iterator reaches it.
    pub fn referencing_instances<'a>(
        &'a self,
        handle: &Handle<M>,
    ) -> impl Iterator<Item = CoreResult<Box<dyn ErasedHandle>>> + 'a {
        let id = handle.id();
        self.referencing_models()
            .into_iter()
            .flat_map(move |(source, fields)| match self.referencing_in(source, &fields, id) {
                Ok(found) => found.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(err) => vec![Err(err)],
            })
    }

    fn referencing_in(
        &self,
        source: ModelKey,
        fields: &[ReferenceField],
        id: EntityId,
    ) -> CoreResult<Vec<Box<dyn ErasedHandle>>> {
        let entry = self
            .db
            .registry()
            .get(source)
            .ok_or_else(|| CoreError::model_not_registered(source))?;
        let request = FindRequest::new(referencing_filter(fields, id));
        self.db
            .store()
            .find(source, &request)?
            .iter()
            .map(|doc| entry.instantiate(&self.db, doc))
            .collect()
    }

    /// The reference values `handle` currently holds.
    #[must_use]
    pub fn outgoing_references(&self, handle: &Handle<M>) -> Vec<OutgoingReference> {
        let doc = handle.read().encode();
        let mut out = Vec::new();
        for field in M::schema().reference_fields() {
            let ids = match doc.get_path(&field.path) {
                Some(Value::Id(id)) => vec![*id],
                Some(Value::Array(items)) => items.iter().filter_map(Value::as_id).collect(),
                _ => Vec::new(),
            };
            out.extend(ids.into_iter().map(|id| OutgoingReference {
                path: field.path.clone(),
                target: field.target,
                id,
                rule: field.rule,
            }));
        }
        out
    }

    fn pooled_lookup(&self, query: &Query<M>, options: FindOptions) -> CoreResult<Option<Handle<M>>> {
        if options.bypass_pool
            || !self.db.config().pool_lookups
            || !query.sort_keys().is_empty()
            || query.skipped().is_some()
        {
            return Ok(None);
        }
        let Some(Value::Id(id)) = query.expr().and_then(|e| e.identifier_equality()) else {
            return Ok(None);
        };
        let handle = self.db.pool().get::<M>(*id)?;
        if handle.is_some() {
            self.db.stats().record_pool_hit();
        }
        Ok(handle)
    }

    fn instantiate_all(&self, docs: impl IntoIterator<Item = Document>) -> CoreResult<Vec<Handle<M>>> {
        let mut handles = Vec::new();
        for doc in docs {
            match self.db.instantiate::<M>(&doc) {
                Ok(handle) => handles.push(handle),
                Err(CoreError::Codec(err)) => {
                    self.db.stats().record_decode_failure();
                    warn!(
                        collection = M::COLLECTION,
                        id = ?doc.id(),
                        error = %err,
                        "skipping document that failed to decode"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(handles)
    }
}

impl<M: Model> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self::new(self.db.clone())
    }
}

impl<M: Model> std::fmt::Debug for Collection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &M::COLLECTION)
            .finish()
    }
}

fn referencing_filter(fields: &[ReferenceField], id: EntityId) -> Document {
    let clauses: Vec<Value> = fields
        .iter()
        .map(|field| {
            let mut clause = Document::new();
            clause.insert(field.path.clone(), id);
            Value::Document(clause)
        })
        .collect();
    let mut filter = Document::new();
    filter.insert("$or", clauses);
    filter
}
