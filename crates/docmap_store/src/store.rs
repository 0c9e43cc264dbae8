//! Document store trait definition.

use crate::error::StoreResult;
use crate::pipeline::Stage;
use docmap_codec::{Document, EntityId};

/// A request for a filtered scan of one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    /// Filter document; empty matches everything.
    pub filter: Document,
    /// Sort specification (`{field: 1 | -1}`), applied in key order.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Cursor batch size hint for drivers that stream results.
    pub batch_size: Option<u32>,
}

impl FindRequest {
    /// Creates a request with the given filter.
    #[must_use]
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Sets the sort specification.
    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the number of documents to skip.
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the cursor batch size hint.
    #[must_use]
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// One update statement: which documents, what to write and how.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    /// Selects the documents to update.
    pub filter: Document,
    /// Replacement document, or operator document (`$set`, `$unset`, `$rename`).
    pub update: Document,
    /// Insert a new document when nothing matches.
    pub upsert: bool,
    /// Update every match instead of the first one.
    pub multiple: bool,
}

impl UpdateSpec {
    /// Creates an update statement.
    #[must_use]
    pub fn new(filter: Document, update: Document, upsert: bool, multiple: bool) -> Self {
        Self {
            filter,
            update,
            upsert,
            multiple,
        }
    }
}

/// Outcome of one or more update statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the filters.
    pub matched: u64,
    /// Documents whose content actually changed.
    pub modified: u64,
    /// Documents inserted by upserts.
    pub upserted: u64,
}

impl UpdateResult {
    /// Adds another result to this one.
    pub fn merge(&mut self, other: UpdateResult) {
        self.matched += other.matched;
        self.modified += other.modified;
        self.upserted += other.upserted;
    }
}

/// The document store the mapping layer runs on.
///
/// Stores hold named collections of documents keyed by a unique `_id`.
/// They interpret filters, updates and pipelines; the mapping layer never
/// looks inside the storage engine.
///
/// # Invariants
///
/// - `_id` is unique within a collection
/// - `update` with `upsert` inserts exactly one document when nothing matches
/// - `bulk_update` applies its statements in order as one round trip
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and embedded use
pub trait DocumentStore: Send + Sync {
    /// Returns the documents matching `request`.
    fn find(&self, collection: &str, request: &FindRequest) -> StoreResult<Vec<Document>>;

    /// Returns the first document matching `filter`.
    fn find_one(&self, collection: &str, filter: &Document) -> StoreResult<Option<Document>> {
        let request = FindRequest::new(filter.clone()).limit(1).batch_size(1);
        Ok(self.find(collection, &request)?.into_iter().next())
    }

    /// Counts the documents matching `filter`, after `skip` and `limit`.
    fn count(
        &self,
        collection: &str,
        filter: &Document,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> StoreResult<u64>;

    /// Applies one update statement.
    fn update(&self, collection: &str, spec: &UpdateSpec) -> StoreResult<UpdateResult>;

    /// Applies several update statements in one round trip.
    fn bulk_update(&self, collection: &str, specs: &[UpdateSpec]) -> StoreResult<UpdateResult>;

    /// Removes matching documents, at most `limit` of them when given.
    ///
    /// Returns the number of removed documents.
    fn remove(&self, collection: &str, filter: &Document, limit: Option<u64>) -> StoreResult<u64>;

    /// Inserts a new document. The document must carry an `_id`.
    fn insert(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// Removes a whole collection. Dropping a missing collection succeeds.
    fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    /// Runs an aggregation pipeline over the collection.
    fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>>;
}

/// Filter selecting exactly one document by identifier.
#[must_use]
pub fn id_filter(id: EntityId) -> Document {
    let mut filter = Document::new();
    filter.insert(docmap_codec::ID_KEY, id);
    filter
}
