//! To-one relation state machine.

use crate::entity::Entity;
use crate::id::EntityId;
use relbox_store::Id;
use std::fmt;
use std::sync::Arc;

/// Where a to-one relation stands.
///
/// ```text
///              set_target(new object)
///   Empty  ───────────────────────────►  Unstored(obj)
///     │                                      │ put (cascade or separate) + reset
///     │ set_target_id / read from record     ▼
///     └──────────────────────────────►  Pending(id) ◄──── reset ────┐
///                                            │ target()             │
///                                  found ┌───┴───┐ missing          │
///                                        ▼       ▼                  │
///                               Resolved(id,obj) Unresolvable(id) ──┘
/// ```
///
/// States that carry an id never carry id 0; every constructor maps id 0
/// to `Empty`. Outside this crate states are built only through
/// [`from_target`](Self::from_target) and [`from_id`](Self::from_id).
pub enum RelationState<T> {
    /// No target.
    Empty,
    /// Target object that had no id when assigned.
    #[non_exhaustive]
    Unstored(Arc<T>),
    /// Target id known, object not loaded yet.
    #[non_exhaustive]
    Pending(EntityId<T>),
    /// Target id and object both known.
    #[non_exhaustive]
    Resolved(EntityId<T>, Arc<T>),
    /// Target id known but the lookup found nothing.
    #[non_exhaustive]
    Unresolvable(EntityId<T>),
}

/// Discriminant of [`RelationState`], for inspection and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// See [`RelationState::Empty`].
    Empty,
    /// See [`RelationState::Unstored`].
    Unstored,
    /// See [`RelationState::Pending`].
    Pending,
    /// See [`RelationState::Resolved`].
    Resolved,
    /// See [`RelationState::Unresolvable`].
    Unresolvable,
}

impl<T: Entity> RelationState<T> {
    /// State for an assigned target object.
    #[must_use]
    pub fn from_target(target: Option<Arc<T>>) -> Self {
        match target {
            None => Self::Empty,
            Some(object) => match object.entity_id() {
                0 => Self::Unstored(object),
                id => Self::Resolved(EntityId::new(id), object),
            },
        }
    }

    /// State for a known target id.
    #[must_use]
    pub fn from_id(id: Id) -> Self {
        match id {
            0 => Self::Empty,
            id => Self::Pending(EntityId::new(id)),
        }
    }

    /// The target id, if one is known.
    ///
    /// For `Unstored` this is the object's own id, which becomes non-zero
    /// once it was put elsewhere.
    #[must_use]
    pub fn target_id(&self) -> Option<EntityId<T>> {
        match self {
            Self::Empty => None,
            Self::Unstored(object) => match object.entity_id() {
                0 => None,
                id => Some(EntityId::new(id)),
            },
            Self::Pending(id) | Self::Resolved(id, _) | Self::Unresolvable(id) => Some(*id),
        }
    }

    /// Drops any loaded object so the next read goes to the store.
    #[must_use]
    pub fn reset(self) -> Self {
        match self {
            Self::Resolved(id, _) | Self::Unresolvable(id) => Self::Pending(id),
            Self::Unstored(object) => match object.entity_id() {
                0 => Self::Unstored(object),
                id => Self::Pending(EntityId::new(id)),
            },
            state @ (Self::Empty | Self::Pending(_)) => state,
        }
    }
}

impl<T> RelationState<T> {
    /// The state's discriminant.
    #[must_use]
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Empty => StateKind::Empty,
            Self::Unstored(_) => StateKind::Unstored,
            Self::Pending(_) => StateKind::Pending,
            Self::Resolved(..) => StateKind::Resolved,
            Self::Unresolvable(_) => StateKind::Unresolvable,
        }
    }

    /// The cached object, without any lookup.
    #[must_use]
    pub fn cached(&self) -> Option<&Arc<T>> {
        match self {
            Self::Unstored(object) | Self::Resolved(_, object) => Some(object),
            _ => None,
        }
    }
}

impl<T> Clone for RelationState<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Unstored(object) => Self::Unstored(Arc::clone(object)),
            Self::Pending(id) => Self::Pending(*id),
            Self::Resolved(id, object) => Self::Resolved(*id, Arc::clone(object)),
            Self::Unresolvable(id) => Self::Unresolvable(*id),
        }
    }
}

impl<T> Default for RelationState<T> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<T> fmt::Debug for RelationState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Unstored(_) => f.write_str("Unstored"),
            Self::Pending(id) => write!(f, "Pending({id})"),
            Self::Resolved(id, _) => write!(f, "Resolved({id})"),
            Self::Unresolvable(id) => write!(f, "Unresolvable({id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_entities::Parent;

    #[test]
    fn zero_ids_are_empty() {
        assert_eq!(RelationState::<Parent>::from_id(0).kind(), StateKind::Empty);
        assert_eq!(RelationState::<Parent>::from_id(7).kind(), StateKind::Pending);
        assert_eq!(RelationState::<Parent>::from_target(None).kind(), StateKind::Empty);
    }

    #[test]
    fn target_decides_stored_or_not() {
        let fresh = Arc::new(Parent::new("fresh"));
        let state = RelationState::from_target(Some(Arc::clone(&fresh)));
        assert_eq!(state.kind(), StateKind::Unstored);
        assert_eq!(state.target_id(), None);

        let stored = Arc::new(Parent::with_id(5, "stored"));
        let state = RelationState::from_target(Some(stored));
        assert_eq!(state.kind(), StateKind::Resolved);
        assert_eq!(state.target_id(), Some(EntityId::new(5)));
    }

    #[test]
    fn reset_transitions() {
        let stored = Arc::new(Parent::with_id(5, "stored"));
        let state = RelationState::from_target(Some(stored)).reset();
        assert_eq!(format!("{state:?}"), "Pending(5)");

        let state = RelationState::<Parent>::Unresolvable(EntityId::new(9)).reset();
        assert_eq!(format!("{state:?}"), "Pending(9)");

        let fresh = Arc::new(Parent::new("fresh"));
        let state = RelationState::from_target(Some(Arc::clone(&fresh))).reset();
        assert_eq!(state.kind(), StateKind::Unstored);

        // persisted elsewhere in the meantime
        fresh.id.set(12);
        let state = RelationState::Unstored(fresh).reset();
        assert_eq!(format!("{state:?}"), "Pending(12)");

        assert_eq!(
            RelationState::<Parent>::Empty.reset().kind(),
            StateKind::Empty
        );
    }
}
