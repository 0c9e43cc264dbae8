//! # docmap Core
//!
//! Object-document mapping over a [`docmap_store::DocumentStore`].
//!
//! This crate provides:
//! - [`Model`], the contract between a Rust type and its collection, with
//!   lifecycle hooks
//! - an identity pool, so each stored entity has at most one live
//!   [`Handle`] per process and unchanged saves are skipped
//! - delete rules (`Deny`, `Cascade`, `Ignore`) declared in each model's
//!   [`schema::Schema`] and enforced through the reference graph
//! - typed queries built from [`query::Field`] proxies
//! - one-time collection migrations recorded in a ledger
//!
//! ## Example
//!
//! ```rust,ignore
//! let db = Database::open(store, Registry::new().register::<User>())?;
//! let users = db.collection::<User>()?;
//!
//! let user = Handle::new(User::new("Alice", 30));
//! users.save(&user)?;
//! user.write().age = 31;
//! users.save(&user)?; // writes
//! users.save(&user)?; // unchanged, no write
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod entity;
mod error;
pub mod migration;
pub mod query;
pub mod schema;
mod stats;
mod types;

pub use collection::{
    Collection, FindOptions, Model, OutgoingReference, SaveOptions, SaveOutcome, SaveReason,
};
pub use config::Config;
pub use database::Database;
pub use entity::{ErasedHandle, Handle, Instantiated, LifecycleState, Pool, Reference};
pub use error::{CoreError, CoreResult};
pub use migration::{Migration, MigrationOutcome, MigrationPlan, Migrator};
pub use query::{Field, Query};
pub use stats::{Stats, StatsSnapshot};
pub use types::{ContentHash, ModelKey};
