//! Shared entity instances.

use crate::collection::{Model, SaveOptions, SaveOutcome};
use crate::database::Database;
use crate::error::CoreResult;
use crate::types::ModelKey;
use docmap_codec::EntityId;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

thread_local! {
    /// Instances being saved by the current thread's call chain.
    static SAVING: RefCell<HashSet<(ModelKey, EntityId)>> = RefCell::new(HashSet::new());
}

/// Persistence state of an entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed in memory, never saved.
    Transient,
    /// Saved or loaded, tracked by the identity pool.
    Pooled,
    /// Deleted; saves and deletes are rejected.
    Deleted,
}

impl LifecycleState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Transient => 0,
            Self::Pooled => 1,
            Self::Deleted => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Transient,
            1 => Self::Pooled,
            _ => Self::Deleted,
        }
    }
}

struct Inner<M> {
    id: EntityId,
    value: RwLock<M>,
    state: AtomicU8,
    save_lock: Mutex<()>,
}

/// A shared, lockable entity instance.
///
/// Clones share the same instance. While an entity is pooled, every lookup
/// of its identifier returns a clone of the same handle, so
/// [`Handle::ptr_eq`] holds between them.
pub struct Handle<M> {
    inner: Arc<Inner<M>>,
}

impl<M: Model> Handle<M> {
    /// Wraps a freshly constructed entity. The handle starts `Transient`.
    #[must_use]
    pub fn new(model: M) -> Self {
        Self::with_state(model, LifecycleState::Transient)
    }

    pub(crate) fn with_state(model: M, state: LifecycleState) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: model.id(),
                value: RwLock::new(model),
                state: AtomicU8::new(state.to_u8()),
                save_lock: Mutex::new(()),
            }),
        }
    }

    /// The entity identifier, fixed at construction.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    /// Locks the entity for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, M> {
        self.inner.value.read()
    }

    /// Locks the entity for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, M> {
        self.inner.value.write()
    }

    /// Current persistence state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        self.inner.state.store(state.to_u8(), Ordering::Release);
    }

    /// Returns true if both handles share the same instance.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Type-erased clone of this handle.
    #[must_use]
    pub fn erased(&self) -> Box<dyn ErasedHandle> {
        Box::new(self.clone())
    }

    /// Marks the handle as being saved by this thread.
    ///
    /// Returns `None` if a save of the same instance is already running on
    /// this thread's call chain. A save running on another thread is waited
    /// for instead.
    pub(crate) fn begin_save(&self) -> Option<SaveGuard<'_>> {
        let key = (M::COLLECTION, self.inner.id);
        if !SAVING.with(|saving| saving.borrow_mut().insert(key)) {
            return None;
        }
        Some(SaveGuard {
            key,
            _lock: self.inner.save_lock.lock(),
        })
    }
}

/// Holds the instance's save lock and leaves the thread's call chain when
/// dropped.
pub(crate) struct SaveGuard<'a> {
    key: (ModelKey, EntityId),
    _lock: MutexGuard<'a, ()>,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        SAVING.with(|saving| saving.borrow_mut().remove(&self.key));
    }
}

impl<M> Clone for Handle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Model> fmt::Debug for Handle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("model", &M::COLLECTION)
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// A handle whose model type is not known statically.
///
/// Used where the reference graph crosses model types: cascaded saves of
/// owned references, referencing instances and cascaded deletions.
pub trait ErasedHandle: Send + Sync {
    /// Collection name of the model.
    fn model(&self) -> ModelKey;

    /// The entity identifier.
    fn id(&self) -> EntityId;

    /// Current persistence state.
    fn state(&self) -> LifecycleState;

    /// Saves the entity.
    fn save(&self, db: &Database, options: SaveOptions) -> CoreResult<SaveOutcome>;

    /// Deletes only this entity: hooks, pool invalidation and removal,
    /// without checking delete rules.
    fn delete_single(&self, db: &Database) -> CoreResult<()>;

    /// Access to the concrete `Handle<M>`.
    fn as_any(&self) -> &dyn Any;
}

impl<M: Model> ErasedHandle for Handle<M> {
    fn model(&self) -> ModelKey {
        M::COLLECTION
    }

    fn id(&self) -> EntityId {
        Handle::id(self)
    }

    fn state(&self) -> LifecycleState {
        Handle::state(self)
    }

    fn save(&self, db: &Database, options: SaveOptions) -> CoreResult<SaveOutcome> {
        crate::collection::save_instance(db, self, options)
    }

    fn delete_single(&self, db: &Database) -> CoreResult<()> {
        crate::collection::delete_single(db, self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn ErasedHandle {
    /// Recovers the typed handle if the model is `M`.
    #[must_use]
    pub fn downcast<M: Model>(&self) -> Option<Handle<M>> {
        self.as_any().downcast_ref::<Handle<M>>().cloned()
    }
}

impl fmt::Debug for dyn ErasedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandle")
            .field("model", &self.model())
            .field("id", &self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use docmap_codec::{CodecResult, Document};

    #[derive(Debug)]
    struct Note {
        id: EntityId,
        text: String,
    }

    impl Model for Note {
        const COLLECTION: ModelKey = "notes";

        fn schema() -> Schema {
            Schema::new(Self::COLLECTION)
        }

        fn id(&self) -> EntityId {
            self.id
        }

        fn encode(&self) -> Document {
            Document::new()
        }

        fn decode(_doc: &Document) -> CodecResult<Self> {
            Ok(Note {
                id: EntityId::new(),
                text: String::new(),
            })
        }
    }

    fn note() -> Handle<Note> {
        Handle::new(Note {
            id: EntityId::new(),
            text: "hi".into(),
        })
    }

    #[test]
    fn clones_share_the_instance() {
        let a = note();
        let b = a.clone();
        assert!(Handle::ptr_eq(&a, &b));
        b.write().text = "changed".into();
        assert_eq!(a.read().text, "changed");
    }

    #[test]
    fn distinct_handles_are_not_equal_instances() {
        assert!(!Handle::ptr_eq(&note(), &note()));
    }

    #[test]
    fn state_transitions() {
        let h = note();
        assert_eq!(h.state(), LifecycleState::Transient);
        h.set_state(LifecycleState::Pooled);
        assert_eq!(h.state(), LifecycleState::Pooled);
        h.set_state(LifecycleState::Deleted);
        assert_eq!(h.state(), LifecycleState::Deleted);
    }

    #[test]
    fn save_guard_is_reentrant_safe() {
        let h = note();
        let guard = h.begin_save();
        assert!(guard.is_some());
        assert!(h.begin_save().is_none());
        drop(guard);
        assert!(h.begin_save().is_some());
    }

    #[test]
    fn save_guard_waits_for_other_threads() {
        let h = note();
        let guard = h.begin_save();
        std::thread::scope(|scope| {
            let other = scope.spawn(|| {
                let guard = h.begin_save();
                let acquired = guard.is_some();
                drop(guard);
                acquired
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(!other.is_finished());
            drop(guard);
            assert!(other.join().unwrap());
        });
    }

    #[test]
    fn erased_downcast() {
        let h = note();
        let erased = h.erased();
        assert_eq!(erased.model(), "notes");
        assert_eq!(erased.id(), h.id());
        let back = erased.downcast::<Note>().unwrap();
        assert!(Handle::ptr_eq(&back, &h));
    }
}
