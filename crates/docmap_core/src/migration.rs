//! Collection migrations.
//!
//! A migration is identified by its collection and a human description and
//! runs at most once. Completed runs are recorded in a ledger collection
//! keyed by `"<collection> - <description>"`; the ledger record is written
//! last, so an interrupted migration leaves no record and reruns from
//! scratch. Steps should therefore be idempotent.
//!
//! ## Usage
//!
//! ```ignore
//! let outcome = db.migrate::<User>("split full name", |plan| {
//!     plan.rename("fullName", "name")
//!         .map(|doc| {
//!             doc.insert("active", true);
//!             Ok(())
//!         })
//!         .remove("legacy");
//! })?;
//! ```
//!
//! Consecutive `map` steps share one pass over the collection. `rename` and
//! `remove` compile to one multi-document update each.

use crate::collection::Model;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use docmap_codec::{doc, Document, Timestamp, Value, ID_KEY};
use docmap_store::{FindRequest, UpdateSpec};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

type Transform<'a> = Box<dyn FnMut(&mut Document) -> CoreResult<()> + 'a>;

/// One executable migration step.
pub enum MigrationStep<'a> {
    /// Renames a field in every document that has it.
    Rename {
        /// Current field path.
        from: String,
        /// New field path.
        to: String,
    },
    /// Removes a field from every document that has it.
    Remove {
        /// Field path.
        field: String,
    },
    /// Rewrites each document, applying the transforms in order.
    Transform(Vec<Transform<'a>>),
}

impl fmt::Debug for MigrationStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename { from, to } => write!(f, "Rename({from} -> {to})"),
            Self::Remove { field } => write!(f, "Remove({field})"),
            Self::Transform(transforms) => write!(f, "Transform(x{})", transforms.len()),
        }
    }
}

/// The ordered steps of one migration.
#[derive(Debug, Default)]
pub struct MigrationPlan<'a> {
    steps: Vec<MigrationStep<'a>>,
}

impl<'a> MigrationPlan<'a> {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Renames `from` to `to`.
    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.steps.push(MigrationStep::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Removes `field`.
    pub fn remove(&mut self, field: impl Into<String>) -> &mut Self {
        self.steps.push(MigrationStep::Remove {
            field: field.into(),
        });
        self
    }

    /// Rewrites every document with `transform`.
    ///
    /// Merged with a directly preceding `map` so both run in one pass.
    pub fn map(&mut self, transform: impl FnMut(&mut Document) -> CoreResult<()> + 'a) -> &mut Self {
        if let Some(MigrationStep::Transform(transforms)) = self.steps.last_mut() {
            transforms.push(Box::new(transform));
        } else {
            self.steps
                .push(MigrationStep::Transform(vec![Box::new(transform)]));
        }
        self
    }

    /// The executable steps, in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[MigrationStep<'a>] {
        &self.steps
    }

    /// Number of executable steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Result of one migration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// A ledger record already existed; nothing ran.
    AlreadyApplied,
    /// The collection was empty; recorded as skipped without running.
    Skipped,
    /// The plan ran and was recorded.
    Completed {
        /// Wall-clock time spent executing the plan.
        duration: Duration,
        /// Number of executed steps.
        steps: usize,
    },
}

impl MigrationOutcome {
    /// Returns true if the plan ran during this call.
    #[must_use]
    pub const fn ran(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// A migration registered ahead of time and run by
/// [`Migrator::run_pending`].
pub trait Migration: Send + Sync {
    /// Collection the migration applies to.
    fn collection(&self) -> &str;

    /// Human description; together with the collection it identifies the
    /// migration in the ledger.
    fn description(&self) -> &str;

    /// Declares the steps.
    fn plan<'a>(&'a self, plan: &mut MigrationPlan<'a>);
}

/// Outcomes of [`Migrator::run_pending`], in registration order.
#[derive(Debug, Clone, Default)]
pub struct MigrationRunResult {
    /// Ledger key and outcome of each registered migration.
    pub outcomes: Vec<(String, MigrationOutcome)>,
}

impl MigrationRunResult {
    /// Number of migrations whose plan ran.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.ran()).count()
    }

    /// Number of migrations recorded as skipped on an empty collection.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == MigrationOutcome::Skipped)
            .count()
    }
}

/// Runs migrations against a database.
pub struct Migrator {
    db: Database,
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    /// Creates a migrator with no registered migrations.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            migrations: Vec::new(),
        }
    }

    /// Registers a migration for [`Migrator::run_pending`].
    ///
    /// Fails if one with the same ledger key is already registered.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let key = ledger_key(migration.collection(), migration.description());
        if self
            .migrations
            .iter()
            .any(|m| ledger_key(m.collection(), m.description()) == key)
        {
            return Err(CoreError::migration_failed(format!(
                "migration `{key}` already registered"
            )));
        }
        self.migrations.push(migration);
        Ok(())
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Runs every registered migration in registration order. Stops at the
    /// first failure.
    pub fn run_pending(&self) -> CoreResult<MigrationRunResult> {
        let mut result = MigrationRunResult::default();
        for migration in &self.migrations {
            let mut plan = MigrationPlan::new();
            migration.plan(&mut plan);
            let outcome = self.execute(migration.collection(), migration.description(), plan)?;
            result.outcomes.push((
                ledger_key(migration.collection(), migration.description()),
                outcome,
            ));
        }
        Ok(result)
    }

    /// Runs the migration `description` on the collection of `M`.
    pub fn migrate<'a, M: Model>(
        &self,
        description: &str,
        build: impl FnOnce(&mut MigrationPlan<'a>),
    ) -> CoreResult<MigrationOutcome> {
        self.migrate_collection(M::COLLECTION, description, build)
    }

    /// Runs the migration `description` on `collection`.
    pub fn migrate_collection<'a>(
        &self,
        collection: &str,
        description: &str,
        build: impl FnOnce(&mut MigrationPlan<'a>),
    ) -> CoreResult<MigrationOutcome> {
        let mut plan = MigrationPlan::new();
        build(&mut plan);
        self.execute(collection, description, plan)
    }

    fn execute(
        &self,
        collection: &str,
        description: &str,
        plan: MigrationPlan<'_>,
    ) -> CoreResult<MigrationOutcome> {
        let store = self.db.store();
        let ledger = self.db.config().ledger_collection.as_str();
        let key = ledger_key(collection, description);
        let key_filter = doc! { ID_KEY => key.as_str() };

        if store.count(ledger, &key_filter, None, Some(1))? > 0 {
            debug!(migration = %key, "already applied");
            return Ok(MigrationOutcome::AlreadyApplied);
        }

        if store.count(collection, &Document::new(), None, Some(1))? == 0 {
            store.insert(
                ledger,
                doc! {
                    ID_KEY => key.as_str(),
                    "collection" => collection,
                    "description" => description,
                    "completed" => Timestamp::now(),
                    "skipped" => true,
                },
            )?;
            self.db.stats().record_migration_skipped();
            info!(migration = %key, "collection empty, migration recorded as skipped");
            return Ok(MigrationOutcome::Skipped);
        }

        info!(migration = %key, steps = plan.len(), "running migration");
        let started_at = Timestamp::now();
        let started = Instant::now();
        let steps = plan.len();
        for step in plan.steps {
            self.run_step(collection, step)?;
        }
        let duration = started.elapsed();

        store.insert(
            ledger,
            doc! {
                ID_KEY => key.as_str(),
                "collection" => collection,
                "description" => description,
                "started" => started_at,
                "completed" => Timestamp::now(),
                "duration_ms" => i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
            },
        )?;
        self.db.pool().invalidate_collection(collection);
        self.db.stats().record_migration_run();
        info!(migration = %key, ?duration, "migration completed");

        Ok(MigrationOutcome::Completed { duration, steps })
    }

    fn run_step(&self, collection: &str, step: MigrationStep<'_>) -> CoreResult<()> {
        let store = self.db.store();
        match step {
            MigrationStep::Rename { from, to } => {
                let filter = doc! { from.as_str() => doc! { "$exists" => true } };
                let update = doc! { "$rename" => doc! { from.as_str() => to.as_str() } };
                let result = store.update(collection, &UpdateSpec::new(filter, update, false, true))?;
                debug!(collection, %from, %to, modified = result.modified, "renamed field");
            }
            MigrationStep::Remove { field } => {
                let filter = doc! { field.as_str() => doc! { "$exists" => true } };
                let update = doc! { "$unset" => doc! { field.as_str() => "" } };
                let result = store.update(collection, &UpdateSpec::new(filter, update, false, true))?;
                debug!(collection, %field, modified = result.modified, "removed field");
            }
            MigrationStep::Transform(mut transforms) => {
                let batch_size = self.db.config().effective_batch_size();
                let page_size = u64::try_from(batch_size).unwrap_or(u64::MAX);
                let mut last_id: Option<Value> = None;
                let mut rewritten = 0usize;
                // Pages are read in `_id` order, one bulk update per page.
                loop {
                    let filter = match &last_id {
                        Some(last) => doc! { ID_KEY => doc! { "$gt" => last.clone() } },
                        None => Document::new(),
                    };
                    let request = FindRequest::new(filter)
                        .sort(doc! { ID_KEY => 1 })
                        .limit(page_size)
                        .batch_size(u32::try_from(batch_size).unwrap_or(u32::MAX));
                    let page = store.find(collection, &request)?;
                    let full = page.len() >= batch_size;

                    let mut pending = Vec::with_capacity(page.len());
                    for mut doc in page {
                        let id = doc.get(ID_KEY).cloned().ok_or(CoreError::MissingIdentifier)?;
                        for transform in &mut transforms {
                            (*transform)(&mut doc)?;
                        }
                        doc.insert(ID_KEY, id.clone());
                        pending.push(UpdateSpec::new(doc! { ID_KEY => id.clone() }, doc, false, false));
                        last_id = Some(id);
                    }
                    if !pending.is_empty() {
                        rewritten += pending.len();
                        store.bulk_update(collection, &pending)?;
                    }
                    if !full {
                        break;
                    }
                }
                debug!(collection, transforms = transforms.len(), rewritten, "transformed documents");
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.migrations.len())
            .finish()
    }
}

fn ledger_key(collection: &str, description: &str) -> String {
    format!("{collection} - {description}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_maps_coalesce() {
        let mut plan = MigrationPlan::new();
        plan.map(|_| Ok(()))
            .map(|_| Ok(()))
            .map(|_| Ok(()))
            .rename("a", "b")
            .map(|_| Ok(()));
        assert_eq!(plan.len(), 3);
        assert!(matches!(&plan.steps()[0], MigrationStep::Transform(t) if t.len() == 3));
        assert!(matches!(&plan.steps()[1], MigrationStep::Rename { .. }));
        assert!(matches!(&plan.steps()[2], MigrationStep::Transform(t) if t.len() == 1));
    }

    #[test]
    fn renames_do_not_merge() {
        let mut plan = MigrationPlan::new();
        plan.rename("a", "b").rename("b", "c").remove("d");
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn ledger_key_format() {
        assert_eq!(ledger_key("users", "add age"), "users - add age");
    }

    #[test]
    fn outcome_helpers() {
        let result = MigrationRunResult {
            outcomes: vec![
                ("a".into(), MigrationOutcome::Skipped),
                (
                    "b".into(),
                    MigrationOutcome::Completed {
                        duration: Duration::ZERO,
                        steps: 1,
                    },
                ),
                ("c".into(), MigrationOutcome::AlreadyApplied),
            ],
        };
        assert_eq!(result.applied_count(), 1);
        assert_eq!(result.skipped_count(), 1);
    }
}
