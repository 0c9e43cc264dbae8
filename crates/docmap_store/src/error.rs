//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a document store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A document with the same `_id` already exists.
    #[error("duplicate key {id} in collection {collection}")]
    DuplicateKey {
        /// The collection written to.
        collection: String,
        /// Rendering of the conflicting identifier.
        id: String,
    },

    /// A document was inserted without an `_id`.
    #[error("document has no `_id` field")]
    MissingIdentifier,

    /// The filter document could not be interpreted.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// The update document could not be interpreted.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the problem.
        message: String,
    },

    /// The regular expression uses features this store cannot evaluate.
    #[error("unsupported regular expression: {pattern}")]
    UnsupportedRegex {
        /// The offending pattern.
        pattern: String,
    },

    /// The backing engine failed.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Create an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
