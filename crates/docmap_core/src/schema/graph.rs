//! Reference graph traversal.
//!
//! Delete rules are declared on the referencing side: a `Deny` reference
//! from `A` to `B` blocks deleting `B`, a `Cascade` reference deletes `A`
//! along with `B`. Planning walks the referencing instances recursively and
//! returns the cascade as data, children first, without touching the store.

use crate::error::{CoreError, CoreResult};
use crate::schema::{DeleteRule, Registry};
use crate::types::ModelKey;
use docmap_codec::{doc, EntityId};
use docmap_store::{DocumentStore, FindRequest};
use std::collections::HashSet;
use tracing::debug;

pub(crate) fn recursive_references(
    registry: &Registry,
    model: &str,
    chain: &mut Vec<ModelKey>,
) -> CoreResult<Vec<(String, ModelKey)>> {
    let entry = registry
        .get(model)
        .ok_or_else(|| CoreError::model_not_registered(model))?;
    chain.push(entry.model());

    let mut out = Vec::new();
    for field in entry.schema().reference_fields() {
        if chain.contains(&field.target) {
            return Err(CoreError::InfiniteRecursiveReference {
                from: entry.model().to_string(),
                to: field.target.to_string(),
            });
        }
        let nested = recursive_references(registry, field.target, chain)?;
        out.push((field.path.clone(), field.target));
        out.extend(
            nested
                .into_iter()
                .map(|(path, target)| (format!("{}.{path}", field.path), target)),
        );
    }

    chain.pop();
    Ok(out)
}

/// One entity removal within a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeleteAction {
    /// Collection name of the entity's model.
    pub model: ModelKey,
    /// The entity identifier.
    pub id: EntityId,
}

/// A validated deletion: the entity itself plus everything it cascades to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    root: DeleteAction,
    cascade: Vec<DeleteAction>,
}

impl DeletionPlan {
    /// The entity being deleted.
    #[must_use]
    pub fn root(&self) -> DeleteAction {
        self.root
    }

    /// Cascaded removals, in execution order: every entity appears after
    /// the entities that cascade from it.
    #[must_use]
    pub fn cascade(&self) -> &[DeleteAction] {
        &self.cascade
    }

    /// Number of removals, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cascade.len() + 1
    }

    /// Always false; a plan removes at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Validates deleting `(model, id)` and computes its cascade.
///
/// Fails with [`CoreError::UndeletableObject`] if a `Deny` reference from an
/// entity outside the cascade points at any entity in it. An entity reached
/// through more than one cascading path is planned once, before every
/// entity it references.
pub(crate) fn plan_deletion(
    registry: &Registry,
    store: &dyn DocumentStore,
    model: ModelKey,
    id: EntityId,
) -> CoreResult<DeletionPlan> {
    let root = DeleteAction { model, id };
    let mut visited = HashSet::from([root]);
    let mut cascade = Vec::new();
    collect_cascade(registry, store, root, &mut visited, &mut cascade)?;

    // Deny checks run once the whole cascade is known, so referencers that
    // are deleted anyway do not block.
    for target in std::iter::once(&root).chain(&cascade) {
        check_denials(registry, store, *target, &visited)?;
    }
    debug!(model, %id, cascade = cascade.len(), "planned deletion");
    Ok(DeletionPlan { root, cascade })
}

fn collect_cascade(
    registry: &Registry,
    store: &dyn DocumentStore,
    target: DeleteAction,
    visited: &mut HashSet<DeleteAction>,
    cascade: &mut Vec<DeleteAction>,
) -> CoreResult<()> {
    for (source, fields) in registry.referencing_types(target.model) {
        for field in fields.iter().filter(|f| f.rule == DeleteRule::Cascade) {
            for referencer in referencing_ids(store, source, &field.path, target.id)? {
                let action = DeleteAction {
                    model: source,
                    id: referencer,
                };
                if visited.insert(action) {
                    collect_cascade(registry, store, action, visited, cascade)?;
                    cascade.push(action);
                }
            }
        }
    }
    Ok(())
}

fn check_denials(
    registry: &Registry,
    store: &dyn DocumentStore,
    target: DeleteAction,
    visited: &HashSet<DeleteAction>,
) -> CoreResult<()> {
    for (source, fields) in registry.referencing_types(target.model) {
        for field in fields.iter().filter(|f| f.rule == DeleteRule::Deny) {
            for referencer in referencing_ids(store, source, &field.path, target.id)? {
                let action = DeleteAction {
                    model: source,
                    id: referencer,
                };
                if !visited.contains(&action) {
                    debug!(model = target.model, id = %target.id, blocker = %referencer, "deletion denied");
                    return Err(CoreError::UndeletableObject {
                        path: format!("{source}.{}", field.path),
                    });
                }
            }
        }
    }
    Ok(())
}

fn referencing_ids(
    store: &dyn DocumentStore,
    source: &str,
    path: &str,
    id: EntityId,
) -> CoreResult<Vec<EntityId>> {
    let request = FindRequest::new(doc! { path => id });
    store
        .find(source, &request)?
        .iter()
        .map(|doc| doc.id().ok_or(CoreError::MissingIdentifier))
        .collect()
}
