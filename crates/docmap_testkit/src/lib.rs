//! # docmap Testkit
//!
//! Test utilities for docmap.
//!
//! This crate provides:
//! - Fixture models (`User`, `Post`, `Comment`, `Tag`) covering every
//!   delete rule, embedded records, enums and lifecycle hooks
//! - Database helpers backed by the in-memory store
//! - Property-based test generators using proptest
//! - Tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docmap_testkit::prelude::*;
//!
//! #[test]
//! fn saves_once() {
//!     let (db, store) = test_database();
//!     let users = db.collection::<User>().unwrap();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `warn`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
