//! Registry of model types.

use crate::collection::Model;
use crate::database::Database;
use crate::entity::ErasedHandle;
use crate::error::{CoreError, CoreResult};
use crate::schema::graph::recursive_references;
use crate::schema::{ReferenceField, Schema};
use crate::types::ModelKey;
use docmap_codec::Document;

type InstantiateFn = fn(&Database, &Document) -> CoreResult<Box<dyn ErasedHandle>>;

/// A registered model: its schema and a type-erased loader.
pub struct ModelEntry {
    schema: Schema,
    instantiate: InstantiateFn,
}

impl ModelEntry {
    /// Collection name of the model.
    #[must_use]
    pub fn model(&self) -> ModelKey {
        self.schema.model()
    }

    /// The model's schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Loads `doc` through the identity pool as this model.
    pub(crate) fn instantiate(&self, db: &Database, doc: &Document) -> CoreResult<Box<dyn ErasedHandle>> {
        (self.instantiate)(db, doc)
    }
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("model", &self.model())
            .finish()
    }
}

fn instantiate_erased<M: Model>(db: &Database, doc: &Document) -> CoreResult<Box<dyn ErasedHandle>> {
    Ok(db.instantiate::<M>(doc)?.erased())
}

/// Every model type known to a database.
///
/// Built once at startup and handed to [`Database::new`]; reverse-reference
/// lookups scan only the models registered here.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new()
///     .register::<User>()
///     .register::<Post>();
/// registry.validate()?;
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<ModelEntry>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M`, replacing an earlier registration of the same
    /// collection.
    #[must_use]
    pub fn register<M: Model>(mut self) -> Self {
        self.add::<M>();
        self
    }

    /// Registers `M` in place.
    pub fn add<M: Model>(&mut self) {
        let entry = ModelEntry {
            schema: M::schema(),
            instantiate: instantiate_erased::<M>,
        };
        match self.entries.iter_mut().find(|e| e.model() == M::COLLECTION) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Looks up a model by collection name.
    #[must_use]
    pub fn get(&self, model: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.model() == model)
    }

    /// Returns true if `model` is registered.
    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.get(model).is_some()
    }

    /// The schema of `model`.
    #[must_use]
    pub fn schema(&self, model: &str) -> Option<&Schema> {
        self.get(model).map(ModelEntry::schema)
    }

    /// Registered models in registration order.
    pub fn models(&self) -> impl Iterator<Item = ModelKey> + '_ {
        self.entries.iter().map(ModelEntry::model)
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every reference reachable from `model`, with dotted paths through
    /// the referenced models.
    ///
    /// Fails with [`CoreError::InfiniteRecursiveReference`] when the models
    /// reference each other in a cycle.
    pub fn recursive_references(&self, model: &str) -> CoreResult<Vec<(String, ModelKey)>> {
        let mut chain = Vec::new();
        recursive_references(self, model, &mut chain)
    }

    /// Every model with reference fields targeting `target`, with those
    /// fields, in registration order.
    #[must_use]
    pub fn referencing_types(&self, target: &str) -> Vec<(ModelKey, Vec<ReferenceField>)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let fields: Vec<_> = entry
                    .schema
                    .reference_fields()
                    .into_iter()
                    .filter(|field| field.target == target)
                    .collect();
                (!fields.is_empty()).then(|| (entry.model(), fields))
            })
            .collect()
    }

    /// Checks that every reference target is registered and that no model
    /// is part of a reference cycle.
    pub fn validate(&self) -> CoreResult<()> {
        for entry in &self.entries {
            for field in entry.schema.reference_fields() {
                if !self.contains(field.target) {
                    return Err(CoreError::model_not_registered(field.target));
                }
            }
        }
        for model in self.models() {
            self.recursive_references(model)?;
        }
        Ok(())
    }
}
