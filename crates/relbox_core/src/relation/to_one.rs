//! Lazy to-one relation.

use super::state::{RelationState, StateKind};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::id::EntityId;
use crate::store::{Store, StoreRef};
use parking_lot::Mutex;
use relbox_store::Id;
use std::fmt;
use std::sync::Arc;

struct ToOneInner<T> {
    store: Option<StoreRef>,
    state: RelationState<T>,
}

/// A nullable reference to one entity of type `T`.
///
/// Relations read from the store start out `Pending`: only the target id is
/// known. The first [`target`](Self::target) call loads the object and
/// caches it.
///
/// Each instance has its own lock. A `Pending` lookup runs while that lock
/// is held, so concurrent readers wait for it instead of issuing a second
/// lookup.
pub struct ToOne<T> {
    inner: Mutex<ToOneInner<T>>,
}

impl<T: Entity> ToOne<T> {
    /// A relation without target and without store.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_state(None, RelationState::Empty)
    }

    /// A relation pointing at `target`, with the same rules as
    /// [`set_target`](Self::set_target).
    #[must_use]
    pub fn new(target: Option<Arc<T>>) -> Self {
        Self::with_state(None, RelationState::from_target(target))
    }

    /// A relation that loads `id` from `store` on first access.
    #[must_use]
    pub fn lazy(store: &Store, id: Id) -> Self {
        Self::with_state(Some(store.downgrade()), RelationState::from_id(id))
    }

    fn with_state(store: Option<StoreRef>, state: RelationState<T>) -> Self {
        Self {
            inner: Mutex::new(ToOneInner { store, state }),
        }
    }

    /// Returns the target, loading it if needed.
    ///
    /// Without a live, open store a `Pending` relation stays `Pending` and
    /// `None` is returned. A failed lookup moves it to `Unresolvable`.
    pub fn target(&self) -> Option<Arc<T>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let id = match &inner.state {
            RelationState::Empty | RelationState::Unresolvable(_) => return None,
            RelationState::Unstored(object) | RelationState::Resolved(_, object) => {
                return Some(Arc::clone(object));
            }
            RelationState::Pending(id) => *id,
        };

        let store = inner.store.as_ref().and_then(StoreRef::upgrade)?;
        match store.box_for::<T>().get(id) {
            Ok(Some(object)) => {
                let object = Arc::new(object);
                inner.state = RelationState::Resolved(id, Arc::clone(&object));
                Some(object)
            }
            Ok(None) => {
                inner.state = RelationState::Unresolvable(id);
                None
            }
            Err(CoreError::StoreClosed) => None,
            Err(e) => {
                tracing::warn!(
                    entity = T::INFO.name,
                    id = id.value(),
                    error = %e,
                    "to-one lookup failed"
                );
                inner.state = RelationState::Unresolvable(id);
                None
            }
        }
    }

    /// Replaces the target. `None` clears the relation; an object without
    /// id becomes `Unstored`, one with id `Resolved`.
    pub fn set_target(&self, target: Option<Arc<T>>) {
        self.inner.lock().state = RelationState::from_target(target);
    }

    /// The target id, if known. Never triggers a lookup.
    #[must_use]
    pub fn target_id(&self) -> Option<EntityId<T>> {
        self.inner.lock().state.target_id()
    }

    /// Points the relation at `id` without loading it. `None` (or id 0)
    /// clears the relation.
    ///
    /// # Errors
    ///
    /// `IllegalState` when setting an id while the relation holds an
    /// object that has no id yet; clear it or set a target instead.
    pub fn set_target_id(&self, id: Option<EntityId<T>>) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        match id {
            None => inner.state = RelationState::Empty,
            Some(id) => {
                if matches!(&inner.state, RelationState::Unstored(object) if object.entity_id() == 0) {
                    return Err(CoreError::illegal_state(format!(
                        "cannot set target id {id} while an unsaved {} is assigned",
                        T::INFO.name
                    )));
                }
                inner.state = RelationState::from_id(id.value());
            }
        }
        Ok(())
    }

    /// Forgets a loaded target so the next [`target`](Self::target) call
    /// reads it again.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let state = std::mem::take(&mut inner.state);
        inner.state = state.reset();
    }

    /// Points the relation at `id` unconditionally, replacing even an
    /// unsaved object. Used by backlink maintenance and bindings.
    pub fn point_to(&self, id: Option<Id>) {
        self.inner.lock().state = RelationState::from_id(id.unwrap_or(0));
    }

    /// Returns true unless the relation is `Empty`.
    #[must_use]
    pub fn has_value(&self) -> bool {
        !matches!(self.inner.lock().state, RelationState::Empty)
    }

    /// Attaches the store used for lookups.
    pub fn attach(&self, store: &Store) {
        self.inner.lock().store = Some(store.downgrade());
    }

    /// Current state discriminant.
    #[must_use]
    pub fn state_kind(&self) -> StateKind {
        self.inner.lock().state.kind()
    }

    /// Id to write into the owner's record.
    ///
    /// An unsaved target is put through `store` first; the lock is released
    /// during that put. The relation stays `Unstored` and reports the
    /// object's id from then on, so an aborted put leaves it without one.
    pub(crate) fn id_for_collect(&self, store: &Store) -> CoreResult<Id> {
        let state = {
            let mut inner = self.inner.lock();
            if inner.store.is_none() {
                inner.store = Some(store.downgrade());
            }
            inner.state.clone()
        };

        let target = match state {
            RelationState::Empty => return Ok(0),
            RelationState::Pending(id)
            | RelationState::Resolved(id, _)
            | RelationState::Unresolvable(id) => return Ok(id.value()),
            RelationState::Unstored(target) => target,
        };

        match target.entity_id() {
            0 => {
                tracing::debug!(entity = T::INFO.name, "putting unsaved to-one target");
                Ok(store.box_for::<T>().put(&target)?.value())
            }
            id => Ok(id),
        }
    }
}

impl<T: Entity> Default for ToOne<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Entity> From<Arc<T>> for ToOne<T> {
    fn from(target: Arc<T>) -> Self {
        Self::new(Some(target))
    }
}

impl<T> Clone for ToOne<T> {
    fn clone(&self) -> Self {
        let inner = self.inner.lock();
        Self {
            inner: Mutex::new(ToOneInner {
                store: inner.store.clone(),
                state: inner.state.clone(),
            }),
        }
    }
}

impl<T> fmt::Debug for ToOne<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ToOne")
            .field("state", &inner.state)
            .field("attached", &inner.store.is_some())
            .finish()
    }
}
