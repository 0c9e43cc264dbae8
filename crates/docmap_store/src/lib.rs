//! # docmap Store
//!
//! Document store interface and the in-memory engine used by docmap.
//!
//! The mapping layer talks to storage only through [`DocumentStore`]:
//! filtered scans, counts, updates (single and bulk), removes, inserts
//! and aggregation pipelines over named collections.
//!
//! ## Filter dialect
//!
//! Filters are [`Document`](docmap_codec::Document)s. A plain value means
//! equality; an operator document uses `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in`, `$nin`, `$exists`, `$regex` or `$not`. Top-level `$and`,
//! `$or` and `$nor` combine clauses.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and embedded use
//!
//! ## Example
//!
//! ```rust
//! use docmap_codec::{doc, EntityId, ID_KEY};
//! use docmap_store::{DocumentStore, InMemoryStore, UpdateSpec, id_filter};
//!
//! let store = InMemoryStore::new();
//! let id = EntityId::new();
//! let spec = UpdateSpec::new(id_filter(id), doc! { "name" => "Alice" }, true, false);
//! store.update("users", &spec).unwrap();
//! assert_eq!(store.count("users", &id_filter(id), None, None).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod filter;
mod memory;
mod pipeline;
mod store;
mod update;

pub use error::{StoreError, StoreResult};
pub use filter::matches;
pub use memory::{InMemoryStore, OperationCounts};
pub use pipeline::Stage;
pub use store::{id_filter, DocumentStore, FindRequest, UpdateResult, UpdateSpec};
