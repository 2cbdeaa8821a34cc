//! Lazy to-many relation with change tracking.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::store::{Store, StoreRef};
use parking_lot::Mutex;
use relbox_codec::{checked_property_slot, PropertyId};
use relbox_store::{Id, RelationId};
use std::fmt;
use std::ops::{Bound, Range, RangeBounds};
use std::sync::Arc;

/// How a [`ToMany`] finds its targets.
///
/// `owner_id` is the id of the entity holding the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Inverse of a to-one: every `T` whose to-one `property_id` points at
    /// the owner.
    ToOneBacklink {
        /// Property id of the to-one on the target type.
        property_id: PropertyId,
        /// Owner id.
        owner_id: Id,
    },
    /// Link table rows `(owner, target)`.
    Standalone {
        /// Relation id of the link table.
        relation_id: RelationId,
        /// Owner id.
        owner_id: Id,
    },
    /// Link table rows `(target, owner)`, seen from the target side.
    StandaloneBacklink {
        /// Relation id of the link table.
        relation_id: RelationId,
        /// Owner id.
        owner_id: Id,
    },
}

impl RelationKind {
    /// Id of the entity owning the list.
    #[must_use]
    pub fn owner_id(&self) -> Id {
        match *self {
            Self::ToOneBacklink { owner_id, .. }
            | Self::Standalone { owner_id, .. }
            | Self::StandaloneBacklink { owner_id, .. } => owner_id,
        }
    }
}

struct ToManyInner<T> {
    binding: Option<RelationKind>,
    store: Option<StoreRef>,
    /// Materialized view; `None` until first access or after `reset`.
    resolved: Option<Vec<Arc<T>>>,
    added: Vec<Arc<T>>,
    removed: Vec<Arc<T>>,
    /// Set while `apply_to_db` writes this list's edits.
    applying: bool,
}

/// Ordered list of targets of type `T`.
///
/// Edits change only the in-memory view and two pending sets, `added` and
/// `removed`. Nothing reaches the store until [`apply_to_db`](Self::apply_to_db)
/// is called, either by the caller or by the owner's binding during a put.
///
/// Targets are matched by id, or by `Arc` identity when either side has
/// not been persisted yet. Two separately built objects without id are
/// different targets even if their fields are equal.
///
/// # Example
///
/// ```rust,ignore
/// let author = authors.get(id)?.unwrap();
/// author.notes.push(Arc::new(Note::new("draft")))?;
/// author.notes.apply_to_db()?;
/// ```
pub struct ToMany<T> {
    inner: Arc<Mutex<ToManyInner<T>>>,
}

impl<T: Entity> ToMany<T> {
    /// An unbound, empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binding(None, None)
    }

    /// A list bound to `kind`, loaded from `store` on first access.
    #[must_use]
    pub fn bound(kind: RelationKind, store: &Store) -> Self {
        Self::with_binding(Some(kind), Some(store.downgrade()))
    }

    fn with_binding(binding: Option<RelationKind>, store: Option<StoreRef>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ToManyInner {
                binding,
                store,
                resolved: None,
                added: Vec::new(),
                removed: Vec::new(),
                applying: false,
            })),
        }
    }

    /// Binds an unbound list. A list can be bound once.
    ///
    /// A binding made inside a write transaction that later aborts is
    /// undone, so the owner can be put again under its new id.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the list is already bound.
    pub fn bind(&self, kind: RelationKind, store: &Store) -> CoreResult<()> {
        {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.binding {
                return Err(CoreError::illegal_state(format!(
                    "to-many relation already bound as {existing:?}"
                )));
            }
            inner.binding = Some(kind);
            inner.store = Some(store.downgrade());
            inner.resolved = None;
        }
        let list = Arc::downgrade(&self.inner);
        store.on_abort(move || {
            if let Some(list) = list.upgrade() {
                let mut inner = list.lock();
                inner.binding = None;
                inner.store = None;
                inner.resolved = None;
            }
        });
        Ok(())
    }

    /// Returns true once [`bind`](Self::bind) succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.lock().binding.is_some()
    }

    /// The relation kind, if bound.
    #[must_use]
    pub fn binding(&self) -> Option<RelationKind> {
        self.inner.lock().binding
    }

    /// Number of targets.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn len(&self) -> CoreResult<usize> {
        let mut inner = self.inner.lock();
        Ok(inner.view()?.len())
    }

    /// Returns true if the list has no targets.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Target at `index`, or `None` past the end.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn get(&self, index: usize) -> CoreResult<Option<Arc<T>>> {
        let mut inner = self.inner.lock();
        Ok(inner.view()?.get(index).cloned())
    }

    /// Copy of the current view.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn to_vec(&self) -> CoreResult<Vec<Arc<T>>> {
        let mut inner = self.inner.lock();
        Ok(inner.view()?.clone())
    }

    /// Returns true if `target` is in the view.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn contains(&self, target: &T) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        Ok(inner.view()?.iter().any(|t| same_target::<T>(t, target)))
    }

    /// Replaces the targets in `range` with `new_elements`.
    ///
    /// Every other edit goes through here. Targets leaving the range are
    /// recorded as removed and targets entering it as added; a target that
    /// leaves and re-enters cancels out.
    ///
    /// # Errors
    ///
    /// `IllegalArgument` for a range outside the list, or storage errors
    /// while loading.
    pub fn replace_subrange<R, I>(&self, range: R, new_elements: I) -> CoreResult<()>
    where
        R: RangeBounds<usize>,
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut inner = self.inner.lock();
        inner.replace_subrange(range, new_elements.into_iter().collect())
    }

    /// Appends a target.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn push(&self, target: Arc<T>) -> CoreResult<()> {
        self.extend([target])
    }

    /// Appends several targets.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn extend<I>(&self, targets: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut inner = self.inner.lock();
        let end = inner.view()?.len();
        inner.replace_subrange(end..end, targets.into_iter().collect())
    }

    /// Removes and returns the target at `index`.
    ///
    /// # Errors
    ///
    /// `IllegalArgument` if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> CoreResult<Arc<T>> {
        let mut inner = self.inner.lock();
        let target = match inner.view()?.get(index) {
            Some(target) => Arc::clone(target),
            None => {
                return Err(CoreError::illegal_argument(format!(
                    "index {index} out of bounds for to-many relation"
                )))
            }
        };
        inner.replace_subrange(index..=index, Vec::new())?;
        Ok(target)
    }

    /// Removes every target.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn clear(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.replace_subrange(.., Vec::new())
    }

    /// Replaces the whole list.
    ///
    /// # Errors
    ///
    /// Storage errors while loading.
    pub fn replace<I>(&self, targets: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        let mut inner = self.inner.lock();
        inner.replace_subrange(.., targets.into_iter().collect())
    }

    /// Returns true if there are edits not yet written.
    #[must_use]
    pub fn has_pending_db_changes(&self) -> bool {
        let inner = self.inner.lock();
        !inner.added.is_empty() || !inner.removed.is_empty()
    }

    /// Targets added since the last apply.
    #[must_use]
    pub fn pending_additions(&self) -> Vec<Arc<T>> {
        self.inner.lock().added.clone()
    }

    /// Targets removed since the last apply.
    #[must_use]
    pub fn pending_removals(&self) -> Vec<Arc<T>> {
        self.inner.lock().removed.clone()
    }

    /// Returns true if the list is bound, its store is alive and the owner
    /// has an id, i.e. [`apply_to_db`](Self::apply_to_db) can reach the store.
    #[must_use]
    pub fn can_interact_with_db(&self) -> bool {
        let inner = self.inner.lock();
        match (inner.binding, &inner.store) {
            (Some(kind), Some(store)) => kind.owner_id() != 0 && store.upgrade().is_some(),
            _ => false,
        }
    }

    /// Reloads the list from the store now. Pending edits are laid over the
    /// fresh result.
    ///
    /// # Errors
    ///
    /// Storage errors, or `IllegalState` if the store was dropped.
    pub fn resolve_from_db(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let loaded = inner.load()?;
        inner.resolved = Some(loaded);
        Ok(())
    }

    /// Drops the loaded view. Pending edits are kept and laid over the next
    /// load.
    pub fn reset(&self) {
        self.inner.lock().resolved = None;
    }

    /// Writes pending edits in one transaction.
    ///
    /// For a to-one backlink each added target's to-one is pointed at the
    /// owner, each removed target's to-one is cleared, and the targets are
    /// put. For standalone relations link rows are removed and inserted;
    /// added targets without id are put first.
    ///
    /// On failure nothing is written, ids handed to new targets are taken
    /// back, and the pending edits stay as they are, so the call can be
    /// retried. Edits made while the apply runs stay pending. When the apply
    /// joins an outer transaction that aborts later, the applied edits
    /// become pending again. A call reached again from a target's `post_put`
    /// while this list is being applied returns `Ok` at once; the running
    /// apply writes the edits.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if the list is unbound or its store was dropped.
    /// - `CannotRelateUnsavedEntities` if the owner has no id, or a removed
    ///   standalone target has none.
    /// - Storage errors from the writes.
    pub fn apply_to_db(&self) -> CoreResult<()> {
        let (kind, store) = {
            let inner = self.inner.lock();
            if inner.added.is_empty() && inner.removed.is_empty() {
                return Ok(());
            }
            let Some(kind) = inner.binding else {
                return Err(CoreError::illegal_state(
                    "cannot apply changes of an unbound to-many relation",
                ));
            };
            if kind.owner_id() == 0 {
                return Err(CoreError::cannot_relate(format!(
                    "owner of the {} relation has not been put yet",
                    T::INFO.name
                )));
            }
            let store = inner.store.as_ref().and_then(StoreRef::upgrade).ok_or_else(|| {
                CoreError::illegal_state("store of the to-many relation was dropped")
            })?;
            (kind, store)
        };

        // The list lock is not held while targets are put: their post_put
        // may apply other relations, or this one again.
        store.run_in_transaction(|| {
            let (added, removed) = {
                let mut inner = self.inner.lock();
                // an apply further up this thread's stack writes these edits
                if inner.applying || (inner.added.is_empty() && inner.removed.is_empty()) {
                    return Ok(());
                }
                inner.applying = true;
                (inner.added.clone(), inner.removed.clone())
            };
            let _applying = ApplyingGuard(&*self.inner);
            match kind {
                RelationKind::ToOneBacklink {
                    property_id,
                    owner_id,
                } => apply_to_one_backlink(&store, &added, &removed, property_id, owner_id)?,
                RelationKind::Standalone {
                    relation_id,
                    owner_id,
                } => apply_links(&store, &added, &removed, relation_id, |target| {
                    (owner_id, target)
                })?,
                RelationKind::StandaloneBacklink {
                    relation_id,
                    owner_id,
                } => apply_links(&store, &added, &removed, relation_id, |target| {
                    (target, owner_id)
                })?,
            }
            tracing::debug!(
                entity = T::INFO.name,
                ?kind,
                added = added.len(),
                removed = removed.len(),
                "to-many changes applied"
            );

            // edits made meanwhile stay pending
            {
                let mut inner = self.inner.lock();
                inner.added.retain(|t| !added.iter().any(|a| Arc::ptr_eq(a, t)));
                inner.removed.retain(|t| !removed.iter().any(|r| Arc::ptr_eq(r, t)));
            }
            let list = Arc::downgrade(&self.inner);
            store.on_abort(move || {
                if let Some(list) = list.upgrade() {
                    list.lock().restore_pending(&added, &removed);
                }
            });
            Ok(())
        })
    }
}

impl<T: Entity> ToManyInner<T> {
    /// Makes applied edits pending again. An edit undone in the meantime
    /// cancels out instead.
    fn restore_pending(&mut self, added: &[Arc<T>], removed: &[Arc<T>]) {
        for target in added {
            if !take(&mut self.removed, target) {
                insert(&mut self.added, target);
            }
        }
        for target in removed {
            if !take(&mut self.added, target) {
                insert(&mut self.removed, target);
            }
        }
    }

    fn view(&mut self) -> CoreResult<&mut Vec<Arc<T>>> {
        if self.resolved.is_none() {
            self.resolved = Some(self.load()?);
        }
        match self.resolved.as_mut() {
            Some(view) => Ok(view),
            None => Err(CoreError::illegal_state("to-many view missing after load")),
        }
    }

    /// Stored targets with the pending edits laid over them.
    fn load(&self) -> CoreResult<Vec<Arc<T>>> {
        let mut view = self.fetch()?;
        view.retain(|t| !self.removed.iter().any(|r| same_target::<T>(r, t)));
        for added in &self.added {
            if !view.iter().any(|t| same_target::<T>(t, added)) {
                view.push(Arc::clone(added));
            }
        }
        Ok(view)
    }

    fn fetch(&self) -> CoreResult<Vec<Arc<T>>> {
        let Some(kind) = self.binding else {
            return Ok(Vec::new());
        };
        if kind.owner_id() == 0 {
            return Ok(Vec::new());
        }
        let store = self
            .store
            .as_ref()
            .and_then(StoreRef::upgrade)
            .ok_or_else(|| CoreError::illegal_state("store of the to-many relation was dropped"))?;

        let targets = store.box_for::<T>();
        let objects = store.run_in_read_transaction(|| {
            let backend = store.backend();
            let ids = match kind {
                RelationKind::ToOneBacklink {
                    property_id,
                    owner_id,
                } => backend.backlink_ids(
                    T::INFO.type_id,
                    checked_property_slot(property_id)?,
                    owner_id,
                )?,
                RelationKind::Standalone {
                    relation_id,
                    owner_id,
                } => backend.relation_target_ids(relation_id, owner_id)?,
                RelationKind::StandaloneBacklink {
                    relation_id,
                    owner_id,
                } => backend.relation_source_ids(relation_id, owner_id)?,
            };
            targets.get_many_raw(&ids)
        })?;
        tracing::trace!(entity = T::INFO.name, count = objects.len(), "to-many loaded");
        Ok(objects.into_iter().map(Arc::new).collect())
    }

    fn replace_subrange<R>(&mut self, range: R, new_elements: Vec<Arc<T>>) -> CoreResult<()>
    where
        R: RangeBounds<usize>,
    {
        let len = self.view()?.len();
        let range = resolve_range(&range, len)?;
        if range.is_empty() && new_elements.is_empty() {
            return Ok(());
        }

        let old: Vec<Arc<T>> = self.view()?[range.clone()].to_vec();
        let leaving = old
            .iter()
            .filter(|o| !new_elements.iter().any(|n| same_target::<T>(n, o)));
        let entering = new_elements
            .iter()
            .filter(|n| !old.iter().any(|o| same_target::<T>(o, n)));

        for target in leaving {
            if !take(&mut self.added, target) {
                insert(&mut self.removed, target);
            }
        }
        for target in entering {
            if !take(&mut self.removed, target) {
                insert(&mut self.added, target);
            }
        }

        self.view()?.splice(range, new_elements);
        Ok(())
    }
}

fn apply_to_one_backlink<T: Entity>(
    store: &Store,
    added: &[Arc<T>],
    removed: &[Arc<T>],
    property_id: PropertyId,
    owner_id: Id,
) -> CoreResult<()> {
    for target in removed {
        target.set_to_one_relation(property_id, None)?;
    }
    for target in added {
        target.set_to_one_relation(property_id, Some(owner_id))?;
    }

    let targets = store.box_for::<T>();
    for target in added {
        targets.put(target)?;
    }
    for target in removed.iter().filter(|t| t.entity_id() != 0) {
        targets.put(target)?;
    }
    Ok(())
}

fn apply_links<T: Entity>(
    store: &Store,
    added: &[Arc<T>],
    removed: &[Arc<T>],
    relation_id: RelationId,
    link: impl Fn(Id) -> (Id, Id),
) -> CoreResult<()> {
    let backend = store.backend();
    for target in removed {
        let target_id = target.entity_id();
        if target_id == 0 {
            return Err(CoreError::cannot_relate(format!(
                "removed {} has not been put yet",
                T::INFO.name
            )));
        }
        let (source, target) = link(target_id);
        backend.remove_link(relation_id, source, target)?;
    }

    let targets = store.box_for::<T>();
    for target in added {
        let target_id = match target.entity_id() {
            0 => targets.put(target)?.value(),
            id => id,
        };
        let (source, target) = link(target_id);
        backend.add_link(relation_id, source, target)?;
    }
    Ok(())
}

/// Clears the `applying` flag, also when the writes fail or unwind.
struct ApplyingGuard<'a, T>(&'a Mutex<ToManyInner<T>>);

impl<T> Drop for ApplyingGuard<'_, T> {
    fn drop(&mut self) {
        self.0.lock().applying = false;
    }
}

/// Same id when both have one, otherwise the same object.
fn same_target<T: Entity>(a: &T, b: &T) -> bool {
    match (a.entity_id(), b.entity_id()) {
        (0, _) | (_, 0) => std::ptr::eq(a, b),
        (x, y) => x == y,
    }
}

/// Removes `target` from `set`; returns whether it was there.
fn take<T: Entity>(set: &mut Vec<Arc<T>>, target: &T) -> bool {
    match set.iter().position(|t| same_target::<T>(t, target)) {
        Some(index) => {
            set.swap_remove(index);
            true
        }
        None => false,
    }
}

fn insert<T: Entity>(set: &mut Vec<Arc<T>>, target: &Arc<T>) {
    if !set.iter().any(|t| same_target::<T>(t, target)) {
        set.push(Arc::clone(target));
    }
}

fn resolve_range<R: RangeBounds<usize>>(range: &R, len: usize) -> CoreResult<Range<usize>> {
    let start = match range.start_bound() {
        Bound::Included(&start) => Some(start),
        Bound::Excluded(&start) => start.checked_add(1),
        Bound::Unbounded => Some(0),
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end.checked_add(1),
        Bound::Excluded(&end) => Some(end),
        Bound::Unbounded => Some(len),
    };
    match (start, end) {
        (Some(start), Some(end)) if start <= end && end <= len => Ok(start..end),
        _ => Err(CoreError::illegal_argument(format!(
            "range {:?}..{:?} out of bounds for length {len}",
            range.start_bound(),
            range.end_bound()
        ))),
    }
}

impl<T: Entity> Default for ToMany<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ToMany<T> {
    fn clone(&self) -> Self {
        let inner = self.inner.lock();
        Self {
            inner: Arc::new(Mutex::new(ToManyInner {
                binding: inner.binding,
                store: inner.store.clone(),
                resolved: inner.resolved.clone(),
                added: inner.added.clone(),
                removed: inner.removed.clone(),
                applying: false,
            })),
        }
    }
}

impl<T> fmt::Debug for ToMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ToMany")
            .field("binding", &inner.binding)
            .field("loaded", &inner.resolved.as_ref().map(Vec::len))
            .field("added", &inner.added.len())
            .field("removed", &inner.removed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::EntityId;
    use crate::test_entities::{Child, Parent};
    use proptest::prelude::*;

    fn names(list: &ToMany<Child>) -> Vec<String> {
        list.to_vec()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    #[test]
    fn add_then_remove_cancels() {
        let list = ToMany::<Child>::new();
        let child = Arc::new(Child::new("a"));
        list.push(Arc::clone(&child)).unwrap();
        assert!(list.has_pending_db_changes());
        assert!(list.contains(&child).unwrap());

        list.remove(0).unwrap();
        assert!(!list.has_pending_db_changes());
        assert!(list.is_empty().unwrap());
    }

    #[test]
    fn remove_then_add_cancels() {
        let store = Store::in_memory();
        let parent = Parent::new("p");
        let a = Arc::new(Child::new("a"));
        let b = Arc::new(Child::new("b"));
        parent.children.extend([Arc::clone(&a), Arc::clone(&b)]).unwrap();
        store.box_for::<Parent>().put(&parent).unwrap();
        assert!(!parent.children.has_pending_db_changes());

        parent.children.remove(0).unwrap();
        assert_eq!(parent.children.pending_removals().len(), 1);
        parent.children.push(Arc::clone(&a)).unwrap();
        assert!(!parent.children.has_pending_db_changes());
        assert_eq!(names(&parent.children), vec!["b", "a"]);
    }

    #[test]
    fn replace_subrange_keeps_common_elements() {
        let list = ToMany::<Child>::new();
        let a = Arc::new(Child::new("a"));
        let b = Arc::new(Child::new("b"));
        let c = Arc::new(Child::new("c"));
        list.extend([Arc::clone(&a), Arc::clone(&b)]).unwrap();

        list.replace_subrange(0..2, [Arc::clone(&b), Arc::clone(&c)])
            .unwrap();
        assert_eq!(names(&list), vec!["b", "c"]);
        // a was only ever added, so its removal cancels out
        let added: Vec<_> = list
            .pending_additions()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(added.len(), 2);
        assert!(added.contains(&"b".to_string()));
        assert!(added.contains(&"c".to_string()));
        assert!(list.pending_removals().is_empty());
    }

    #[test]
    fn same_id_counts_as_same_target() {
        let list = ToMany::<Child>::new();
        list.push(Arc::new(Child::with_id(4, "first copy"))).unwrap();
        let copy = Child::with_id(4, "second copy");
        assert!(list.contains(&copy).unwrap());

        list.replace_subrange(0..1, [Arc::new(copy)]).unwrap();
        assert_eq!(list.pending_additions().len(), 1);
        assert_eq!(names(&list), vec!["second copy"]);
    }

    #[test]
    fn bad_range_is_rejected() {
        let list = ToMany::<Child>::new();
        list.push(Arc::new(Child::new("a"))).unwrap();
        assert!(matches!(
            list.replace_subrange(0..3, []),
            Err(CoreError::IllegalArgument { .. })
        ));
        assert!(matches!(
            list.remove(1),
            Err(CoreError::IllegalArgument { .. })
        ));
        // empty range with nothing to insert is a no-op
        list.replace_subrange(1..1, []).unwrap();
        assert_eq!(list.len().unwrap(), 1);
    }

    #[test]
    fn apply_preconditions() {
        let store = Store::in_memory();

        let unbound = ToMany::<Child>::new();
        unbound.apply_to_db().unwrap();
        unbound.push(Arc::new(Child::new("a"))).unwrap();
        assert!(matches!(
            unbound.apply_to_db(),
            Err(CoreError::IllegalState { .. })
        ));

        let unsaved_owner = ToMany::<Child>::bound(
            RelationKind::Standalone {
                relation_id: 1,
                owner_id: 0,
            },
            &store,
        );
        assert!(!unsaved_owner.can_interact_with_db());
        unsaved_owner.push(Arc::new(Child::new("b"))).unwrap();
        assert!(matches!(
            unsaved_owner.apply_to_db(),
            Err(CoreError::CannotRelateUnsavedEntities { .. })
        ));
        assert!(unsaved_owner.has_pending_db_changes());
    }

    #[test]
    fn bind_only_once() {
        let store = Store::in_memory();
        let list = ToMany::<Child>::new();
        let kind = RelationKind::Standalone {
            relation_id: 1,
            owner_id: 3,
        };
        list.bind(kind, &store).unwrap();
        assert_eq!(list.binding(), Some(kind));
        assert!(list.can_interact_with_db());
        assert!(matches!(
            list.bind(kind, &store),
            Err(CoreError::IllegalState { .. })
        ));
    }

    #[test]
    fn backlink_apply_points_targets_at_owner() {
        let store = Store::in_memory();
        let parents = store.box_for::<Parent>();
        let parent = Parent::new("owner");
        let id = parents.put(&parent).unwrap();

        let a = Arc::new(Child::new("a"));
        let b = Arc::new(Child::new("b"));
        parent.children.extend([Arc::clone(&a), Arc::clone(&b)]).unwrap();
        parent.children.apply_to_db().unwrap();

        assert_ne!(a.entity_id(), 0);
        assert_ne!(b.entity_id(), 0);
        assert_eq!(a.parent.target_id(), Some(id));
        assert!(!parent.children.has_pending_db_changes());

        let read = parents.get(id).unwrap().unwrap();
        assert_eq!(names(&read.children), vec!["a", "b"]);
        let stored_child = store
            .box_for::<Child>()
            .get(EntityId::new(b.entity_id()))
            .unwrap()
            .unwrap();
        assert_eq!(stored_child.parent.target().unwrap().name, "owner");
    }

    #[test]
    fn target_reentering_a_list_being_applied_completes() {
        let store = Store::in_memory();
        let p = Parent::new("p");
        store.box_for::<Parent>().put(&p).unwrap();

        // c sits in two backlink lists and its fans hold the unsaved q,
        // whose put applies q.children and so puts c again
        let c = Arc::new(Child::new("c"));
        let q = Arc::new(Parent::new("q"));
        p.children.push(Arc::clone(&c)).unwrap();
        q.children.push(Arc::clone(&c)).unwrap();
        c.fans.push(Arc::clone(&q)).unwrap();

        p.children.apply_to_db().unwrap();

        assert_ne!(c.entity_id(), 0);
        assert_ne!(q.entity_id(), 0);
        assert!(!p.children.has_pending_db_changes());
        assert!(!q.children.has_pending_db_changes());
        assert!(!c.fans.has_pending_db_changes());
        assert_eq!(store.box_for::<Parent>().count().unwrap(), 2);
        assert_eq!(store.box_for::<Child>().count().unwrap(), 1);

        let stored = store
            .box_for::<Child>()
            .get(EntityId::new(c.entity_id()))
            .unwrap()
            .unwrap();
        let fans: Vec<_> = stored.fans.to_vec().unwrap().iter().map(|f| f.name.clone()).collect();
        assert_eq!(fans, vec!["q"]);
    }

    #[test]
    fn backlink_removal_clears_to_one() {
        let store = Store::in_memory();
        let parents = store.box_for::<Parent>();
        let parent = Parent::new("owner");
        parent.children.push(Arc::new(Child::new("gone"))).unwrap();
        let id = parents.put(&parent).unwrap();

        let read = parents.get(id).unwrap().unwrap();
        let child = read.children.remove(0).unwrap();
        read.children.apply_to_db().unwrap();

        assert_eq!(child.parent.target_id(), None);
        let read = parents.get(id).unwrap().unwrap();
        assert!(read.children.is_empty().unwrap());
        assert_eq!(store.box_for::<Child>().count().unwrap(), 1);
    }

    #[test]
    fn standalone_links_are_visible_from_both_sides() {
        let store = Store::in_memory();
        let parent = Parent::new("fan");
        let liked = Arc::new(Child::new("liked"));
        parent.favorites.push(Arc::clone(&liked)).unwrap();
        let id = store.box_for::<Parent>().put(&parent).unwrap();
        assert_ne!(liked.entity_id(), 0);

        let read = store.box_for::<Parent>().get(id).unwrap().unwrap();
        assert_eq!(names(&read.favorites), vec!["liked"]);

        let child = store
            .box_for::<Child>()
            .get(EntityId::new(liked.entity_id()))
            .unwrap()
            .unwrap();
        let fans = child.fans.to_vec().unwrap();
        assert_eq!(fans.len(), 1);
        assert_eq!(fans[0].name, "fan");

        // unlink from the backlink side
        child.fans.clear().unwrap();
        child.fans.apply_to_db().unwrap();
        read.favorites.resolve_from_db().unwrap();
        assert!(read.favorites.is_empty().unwrap());
    }

    #[test]
    fn removing_unsaved_standalone_target_fails_and_keeps_changes() {
        let store = Store::in_memory();
        let list = ToMany::<Child>::bound(
            RelationKind::Standalone {
                relation_id: 1,
                owner_id: 9,
            },
            &store,
        );
        let unsaved = Arc::new(Child::new("never put"));
        list.push(Arc::clone(&unsaved)).unwrap();
        list.apply_to_db().unwrap();
        assert_ne!(unsaved.entity_id(), 0);

        // a second, never-stored object that was only removed
        let stray = Arc::new(Child::new("stray"));
        {
            let mut inner = list.inner.lock();
            inner.removed.push(Arc::clone(&stray));
        }
        assert!(matches!(
            list.apply_to_db(),
            Err(CoreError::CannotRelateUnsavedEntities { .. })
        ));
        assert_eq!(list.pending_removals().len(), 1);
    }

    #[test]
    fn reset_keeps_pending_edits() {
        let store = Store::in_memory();
        let parent = Parent::new("p");
        parent.children.push(Arc::new(Child::new("saved"))).unwrap();
        let id = store.box_for::<Parent>().put(&parent).unwrap();

        let read = store.box_for::<Parent>().get(id).unwrap().unwrap();
        read.children.push(Arc::new(Child::new("pending"))).unwrap();
        read.children.reset();
        assert_eq!(names(&read.children), vec!["saved", "pending"]);
        assert!(read.children.has_pending_db_changes());
    }

    #[test]
    fn dropped_store_fails_loading() {
        let store = Store::in_memory();
        let list = ToMany::<Child>::bound(
            RelationKind::Standalone {
                relation_id: 1,
                owner_id: 1,
            },
            &store,
        );
        drop(store);
        assert!(!list.can_interact_with_db());
        assert!(matches!(list.len(), Err(CoreError::IllegalState { .. })));
    }

    proptest! {
        #[test]
        fn unsaved_list_tracks_its_view_as_additions(
            edits in prop::collection::vec(
                (0usize..8, 0usize..8, prop::collection::vec(0usize..6, 0..4)),
                0..20,
            )
        ) {
            let pool: Vec<Arc<Child>> = (0..6)
                .map(|i| Arc::new(Child::new(&format!("c{i}"))))
                .collect();
            let list = ToMany::<Child>::new();
            let mut model: Vec<usize> = Vec::new();

            for (a, b, picks) in edits {
                let (a, b) = (a.min(model.len()), b.min(model.len()));
                let (start, end) = (a.min(b), a.max(b));
                // a target is in the list at most once
                let mut incoming: Vec<usize> = Vec::new();
                for pick in picks {
                    let outside = model[..start].contains(&pick) || model[end..].contains(&pick);
                    if !outside && !incoming.contains(&pick) {
                        incoming.push(pick);
                    }
                }
                list.replace_subrange(start..end, incoming.iter().map(|&p| Arc::clone(&pool[p])))
                    .unwrap();
                model.splice(start..end, incoming);

                let view = list.to_vec().unwrap();
                prop_assert_eq!(view.len(), model.len());
                for (target, &p) in view.iter().zip(&model) {
                    prop_assert!(Arc::ptr_eq(target, &pool[p]));
                }
                prop_assert!(list.pending_removals().is_empty());
                let added = list.pending_additions();
                prop_assert_eq!(added.len(), model.len());
                for target in &added {
                    prop_assert!(view.iter().any(|v| Arc::ptr_eq(v, target)));
                }
            }
        }
    }
}
