//! Entity identifiers.

use relbox_store::Id;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Typed entity id.
///
/// Ids are assigned by the store on the first put and never change after.
/// `0` means "not yet persisted".
pub struct EntityId<T> {
    value: Id,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityId<T> {
    /// The "not persisted" id.
    pub const UNSET: Self = Self::new(0);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(value: Id) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn value(self) -> Id {
        self.value
    }

    /// Returns true for id 0.
    #[inline]
    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.value == 0
    }
}

impl<T> Clone for EntityId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityId<T> {}

impl<T> PartialEq for EntityId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for EntityId<T> {}

impl<T> PartialOrd for EntityId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EntityId<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for EntityId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> Default for EntityId<T> {
    fn default() -> Self {
        Self::UNSET
    }
}

impl<T> From<Id> for EntityId<T> {
    fn from(value: Id) -> Self {
        Self::new(value)
    }
}

impl<T> From<EntityId<T>> for Id {
    fn from(id: EntityId<T>) -> Self {
        id.value
    }
}

impl<T> fmt::Debug for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.value)
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Id slot embedded in entity structs.
///
/// Puts take entities by shared reference (relation targets are shared
/// `Arc`s), so the assigned id is written back through this cell. The
/// store keeps a weak handle to cells it wrote during a transaction and
/// resets them if that transaction aborts.
#[derive(Default)]
pub struct IdCell(Arc<AtomicU64>);

impl IdCell {
    /// Creates a cell holding `id`.
    #[must_use]
    pub fn new(id: Id) -> Self {
        Self(Arc::new(AtomicU64::new(id)))
    }

    /// Current id.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Id {
        self.0.load(Ordering::Acquire)
    }

    /// Replaces the id.
    #[inline]
    pub fn set(&self, id: Id) {
        self.0.store(id, Ordering::Release);
    }

    /// Replaces the id and returns how to undo it.
    pub(crate) fn assign(&self, id: Id) -> IdWrite {
        let previous = self.0.swap(id, Ordering::AcqRel);
        IdWrite {
            cell: Arc::downgrade(&self.0),
            previous,
        }
    }
}

/// An id written back by a put; reverted when the transaction aborts.
pub(crate) struct IdWrite {
    cell: Weak<AtomicU64>,
    previous: Id,
}

impl IdWrite {
    /// Puts the previous id back, if the entity is still alive.
    pub(crate) fn revert(self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.store(self.previous, Ordering::Release);
        }
    }
}

impl Clone for IdCell {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl PartialEq for IdCell {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for IdCell {}

impl From<Id> for IdCell {
    fn from(id: Id) -> Self {
        Self::new(id)
    }
}

impl fmt::Debug for IdCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
