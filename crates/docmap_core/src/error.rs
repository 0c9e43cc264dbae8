//! Error types for docmap core.

use docmap_codec::EntityId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docmap core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stored value could not be decoded into a model field.
    #[error("codec error: {0}")]
    Codec(#[from] docmap_codec::CodecError),

    /// The document store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] docmap_store::StoreError),

    /// A delete was refused because a `Deny` reference still points at the
    /// entity.
    #[error("cannot delete: still referenced through `{path}`")]
    UndeletableObject {
        /// `<source collection>.<field path>` of the blocking reference.
        path: String,
    },

    /// Two model types reference each other, directly or transitively.
    #[error("infinite recursive reference from {from} to {to}")]
    InfiniteRecursiveReference {
        /// The model whose field closes the cycle.
        from: String,
        /// The model already present in the traversal chain.
        to: String,
    },

    /// The store returned a result that breaks an invariant of this layer.
    #[error("internal inconsistency: {message}")]
    InternalInconsistency {
        /// Description of the broken invariant.
        message: String,
    },

    /// One or more deletions of a bulk remove failed.
    ///
    /// Every failure is kept, in the order the deletions were attempted.
    #[error("{} deletion(s) failed", errors.len())]
    DeletingMultiple {
        /// Identifier and error of each failed deletion.
        errors: Vec<(EntityId, CoreError)>,
    },

    /// The instance was deleted and can no longer be saved or deleted.
    #[error("entity {id} in collection {collection} has been deleted")]
    EntityDeleted {
        /// Collection of the entity.
        collection: String,
        /// The entity identifier.
        id: EntityId,
    },

    /// The model is not part of the registry the database was built with.
    #[error("model not registered: {model}")]
    ModelNotRegistered {
        /// Collection name of the model.
        model: String,
    },

    /// A partial update names a field the model does not declare.
    #[error("unknown field `{field}` for model {model}")]
    UnknownField {
        /// Collection name of the model.
        model: String,
        /// The offending field path.
        field: String,
    },

    /// A document carries no `_id`.
    #[error("document has no `_id`")]
    MissingIdentifier,

    /// A lifecycle hook refused the operation.
    #[error("hook failed: {message}")]
    Hook {
        /// Reason given by the hook.
        message: String,
    },

    /// Migration failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an internal inconsistency error.
    pub fn internal_inconsistency(message: impl Into<String>) -> Self {
        Self::InternalInconsistency {
            message: message.into(),
        }
    }

    /// Creates a hook failure.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }

    /// Creates a model not registered error.
    pub fn model_not_registered(model: impl Into<String>) -> Self {
        Self::ModelNotRegistered {
            model: model.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_codec::{CodecError, FieldPath, ValueKind};

    #[test]
    fn codec_errors_convert() {
        let err: CoreError =
            CodecError::type_mismatch(&FieldPath::new("age"), ValueKind::Int32, None).into();
        assert!(matches!(err, CoreError::Codec(_)));
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn deleting_multiple_reports_count() {
        let err = CoreError::DeletingMultiple {
            errors: vec![(EntityId::new(), CoreError::hook("no"))],
        };
        assert_eq!(err.to_string(), "1 deletion(s) failed");
    }
}
