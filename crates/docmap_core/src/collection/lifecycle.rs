//! Save and delete orchestration.

use crate::collection::Model;
use crate::database::Database;
use crate::entity::{Handle, LifecycleState};
use crate::error::{CoreError, CoreResult};
use crate::schema::{DeleteAction, DeletionPlan};
use crate::types::ContentHash;
use docmap_codec::ID_KEY;
use docmap_store::{id_filter, UpdateSpec};
use tracing::debug;

/// Why a save was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SaveReason {
    /// Requested by application code. Always proceeds.
    #[default]
    Manual,
    /// Requested implicitly, e.g. by an autosave loop. Skipped for
    /// instances that were never pooled.
    Auto,
}

/// Options for one save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SaveOptions {
    /// Write even when the content hash is unchanged.
    pub force: bool,
    /// Why the save was requested.
    pub reason: SaveReason,
}

impl SaveOptions {
    /// A manual, unforced save.
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            force: false,
            reason: SaveReason::Manual,
        }
    }

    /// A manual save that always writes.
    #[must_use]
    pub const fn forced() -> Self {
        Self {
            force: true,
            reason: SaveReason::Manual,
        }
    }

    /// An implicit save.
    #[must_use]
    pub const fn auto() -> Self {
        Self {
            force: false,
            reason: SaveReason::Auto,
        }
    }
}

/// What a save did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveOutcome {
    /// The document was written.
    Written,
    /// The content was unchanged; nothing was written.
    Unchanged,
    /// The save did not run: an implicit save of an unpooled instance, or
    /// a save re-entered through a reference cycle.
    Skipped,
}

impl SaveOutcome {
    /// Returns true if the store was written.
    #[must_use]
    pub const fn was_written(self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Options for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FindOptions {
    /// Always query the store, even for a plain identifier lookup.
    pub bypass_pool: bool,
}

impl FindOptions {
    /// Options that skip the identity pool shortcut.
    #[must_use]
    pub const fn bypass_pool() -> Self {
        Self { bypass_pool: true }
    }
}

fn ensure_live<M: Model>(handle: &Handle<M>) -> CoreResult<()> {
    if handle.state() == LifecycleState::Deleted {
        return Err(CoreError::EntityDeleted {
            collection: M::COLLECTION.to_string(),
            id: handle.id(),
        });
    }
    Ok(())
}

/// Saves one instance, owned references first.
pub(crate) fn save_instance<M: Model>(
    db: &Database,
    handle: &Handle<M>,
    options: SaveOptions,
) -> CoreResult<SaveOutcome> {
    let Some(_guard) = handle.begin_save() else {
        return Ok(SaveOutcome::Skipped);
    };
    ensure_live(handle)?;

    let id = handle.id();
    let pool = db.pool();
    if options.reason == SaveReason::Auto && !options.force && pool.is_ghost(M::COLLECTION, id) {
        debug!(model = M::COLLECTION, %id, "skipping implicit save of unpooled instance");
        return Ok(SaveOutcome::Skipped);
    }

    handle.write().will_save()?;

    let mut doc = handle.read().encode();
    doc.insert(ID_KEY, id);
    let hash = ContentHash::of(&doc);

    let force = options.force || !db.config().skip_unchanged_saves;
    if !force && pool.existing_hash(M::COLLECTION, id) == Some(hash) {
        debug!(model = M::COLLECTION, %id, %hash, "content unchanged, skipping write");
        db.stats().record_skipped_write();
        handle.read().did_save(false)?;
        return Ok(SaveOutcome::Unchanged);
    }

    let owned = handle.read().owned_references();
    for child in owned {
        child.save(
            db,
            SaveOptions {
                force: false,
                reason: options.reason,
            },
        )?;
    }

    db.store()
        .update(M::COLLECTION, &UpdateSpec::new(id_filter(id), doc, true, false))?;
    if pool.update_hash(handle, hash) {
        handle.set_state(LifecycleState::Pooled);
    } else {
        handle.set_state(LifecycleState::Transient);
    }
    db.stats().record_write();
    debug!(model = M::COLLECTION, %id, %hash, "saved");

    handle.read().did_save(true)?;
    Ok(SaveOutcome::Written)
}

/// Deletes one instance without looking at delete rules.
pub(crate) fn delete_single<M: Model>(db: &Database, handle: &Handle<M>) -> CoreResult<()> {
    ensure_live(handle)?;
    let id = handle.id();
    handle.read().will_delete()?;

    db.pool().invalidate(M::COLLECTION, id);
    db.store().remove(M::COLLECTION, &id_filter(id), Some(1))?;
    handle.set_state(LifecycleState::Deleted);
    db.stats().record_delete();
    debug!(model = M::COLLECTION, %id, "deleted");

    handle.read().did_delete()
}

/// Runs a validated plan: the cascade in order, then the root.
pub(crate) fn execute_plan<M: Model>(
    db: &Database,
    handle: &Handle<M>,
    plan: &DeletionPlan,
) -> CoreResult<()> {
    for action in plan.cascade() {
        delete_action(db, *action)?;
    }
    delete_single(db, handle)
}

fn delete_action(db: &Database, action: DeleteAction) -> CoreResult<()> {
    let entry = db
        .registry()
        .get(action.model)
        .ok_or_else(|| CoreError::model_not_registered(action.model))?;
    // Already gone: an earlier step or another process removed it.
    let Some(doc) = db.store().find_one(action.model, &id_filter(action.id))? else {
        return Ok(());
    };
    entry.instantiate(db, &doc)?.delete_single(db)
}
