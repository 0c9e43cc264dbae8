//! In-memory document store for testing and embedded use.

use crate::error::{StoreError, StoreResult};
use crate::filter::matches;
use crate::pipeline::{run_pipeline, sort_documents, Stage};
use crate::store::{DocumentStore, FindRequest, UpdateResult, UpdateSpec};
use crate::update::{apply_update, upsert_document};
use docmap_codec::{Document, Value, ID_KEY};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of calls made to each store operation.
///
/// Tests use these counts to assert round trips, for example that a
/// migration reads its collection exactly once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    /// `find` and `find_one` calls.
    pub finds: u64,
    /// `count` calls.
    pub counts: u64,
    /// `update` calls.
    pub updates: u64,
    /// `bulk_update` calls.
    pub bulk_updates: u64,
    /// `remove` calls.
    pub removes: u64,
    /// `insert` calls.
    pub inserts: u64,
    /// `aggregate` calls.
    pub aggregates: u64,
}

#[derive(Debug, Default)]
struct Counters {
    finds: AtomicU64,
    counts: AtomicU64,
    updates: AtomicU64,
    bulk_updates: AtomicU64,
    removes: AtomicU64,
    inserts: AtomicU64,
    aggregates: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OperationCounts {
        OperationCounts {
            finds: self.finds.load(Ordering::Relaxed),
            counts: self.counts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            bulk_updates: self.bulk_updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            aggregates: self.aggregates.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.finds,
            &self.counts,
            &self.updates,
            &self.bulk_updates,
            &self.removes,
            &self.inserts,
            &self.aggregates,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A document store holding every collection in memory.
///
/// Documents keep their insertion order, which is the natural order of
/// unsorted scans.
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads behind an
/// `Arc`.
///
/// # Example
///
/// ```rust
/// use docmap_codec::{doc, EntityId, ID_KEY};
/// use docmap_store::{DocumentStore, FindRequest, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.insert("users", doc! { ID_KEY => EntityId::new(), "name" => "Alice" }).unwrap();
/// let found = store.find("users", &FindRequest::new(doc! { "name" => "Alice" })).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    counters: Counters,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every document in `collection`.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    /// Returns true if `collection` holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Returns the operation counters.
    #[must_use]
    pub fn operation_counts(&self) -> OperationCounts {
        self.counters.snapshot()
    }

    /// Resets the operation counters to zero.
    pub fn reset_operation_counts(&self) {
        self.counters.reset();
    }

    fn matching(&self, collection: &str, filter: &Document) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let mut out = Vec::new();
        if let Some(docs) = collections.get(collection) {
            for doc in docs {
                if matches(doc, filter)? {
                    out.push(doc.clone());
                }
            }
        }
        Ok(out)
    }

    fn apply(docs: &mut Vec<Document>, collection: &str, spec: &UpdateSpec) -> StoreResult<UpdateResult> {
        let mut result = UpdateResult::default();
        for doc in docs.iter_mut() {
            if !matches(doc, &spec.filter)? {
                continue;
            }
            result.matched += 1;
            if apply_update(doc, &spec.update)? {
                result.modified += 1;
            }
            if !spec.multiple {
                break;
            }
        }

        if result.matched == 0 && spec.upsert {
            let doc = upsert_document(&spec.filter, &spec.update)?;
            Self::check_unique(docs, collection, &doc)?;
            docs.push(doc);
            result.upserted = 1;
        }
        Ok(result)
    }

    fn check_unique(docs: &[Document], collection: &str, candidate: &Document) -> StoreResult<()> {
        let id = candidate.get(ID_KEY).ok_or(StoreError::MissingIdentifier)?;
        if docs.iter().any(|d| d.get(ID_KEY) == Some(id)) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id: render_id(id),
            });
        }
        Ok(())
    }
}

fn render_id(id: &Value) -> String {
    match id {
        Value::Id(id) => id.to_string(),
        Value::Text(text) => text.clone(),
        other => format!("{other:?}"),
    }
}

fn window(docs: Vec<Document>, skip: Option<u64>, limit: Option<u64>) -> Vec<Document> {
    let skip = skip.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let iter = docs.into_iter().skip(skip);
    match limit {
        // A zero limit means no limit, as with most document databases.
        Some(0) | None => iter.collect(),
        Some(n) => iter.take(usize::try_from(n).unwrap_or(usize::MAX)).collect(),
    }
}

impl DocumentStore for InMemoryStore {
    fn find(&self, collection: &str, request: &FindRequest) -> StoreResult<Vec<Document>> {
        Counters::bump(&self.counters.finds);
        let mut docs = self.matching(collection, &request.filter)?;
        if let Some(sort) = &request.sort {
            sort_documents(&mut docs, sort)?;
        }
        Ok(window(docs, request.skip, request.limit))
    }

    fn count(
        &self,
        collection: &str,
        filter: &Document,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> StoreResult<u64> {
        Counters::bump(&self.counters.counts);
        let docs = self.matching(collection, filter)?;
        Ok(window(docs, skip, limit).len() as u64)
    }

    fn update(&self, collection: &str, spec: &UpdateSpec) -> StoreResult<UpdateResult> {
        Counters::bump(&self.counters.updates);
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        Self::apply(docs, collection, spec)
    }

    fn bulk_update(&self, collection: &str, specs: &[UpdateSpec]) -> StoreResult<UpdateResult> {
        Counters::bump(&self.counters.bulk_updates);
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        let mut total = UpdateResult::default();
        for spec in specs {
            total.merge(Self::apply(docs, collection, spec)?);
        }
        Ok(total)
    }

    fn remove(&self, collection: &str, filter: &Document, limit: Option<u64>) -> StoreResult<u64> {
        Counters::bump(&self.counters.removes);
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let budget = match limit {
            Some(0) | None => u64::MAX,
            Some(n) => n,
        };

        let mut removed = 0u64;
        let mut kept = Vec::with_capacity(docs.len());
        for doc in docs.drain(..) {
            if removed < budget && matches(&doc, filter)? {
                removed += 1;
            } else {
                kept.push(doc);
            }
        }
        *docs = kept;
        Ok(removed)
    }

    fn insert(&self, collection: &str, document: Document) -> StoreResult<()> {
        Counters::bump(&self.counters.inserts);
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        Self::check_unique(docs, collection, &document)?;
        docs.push(document);
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.collections.write().remove(collection);
        Ok(())
    }

    fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>> {
        Counters::bump(&self.counters.aggregates);
        let docs = self.documents(collection);
        run_pipeline(docs, pipeline)
    }
}
