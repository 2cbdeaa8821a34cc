//! Backend wrapper that counts calls.
//!
//! Lets tests check how often the relation layer actually reached the
//! store, and inject failures into lookups and link writes.

use bytes::Bytes;
use parking_lot::Mutex;
use relbox_store::{
    EntityTypeId, Id, MemoryBackend, RelationId, StoreBackend, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-method call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `begin_write` calls.
    pub begin_write: u64,
    /// `commit_write` calls.
    pub commit_write: u64,
    /// `abort_write` calls.
    pub abort_write: u64,
    /// `get` calls.
    pub get: u64,
    /// `get_many` calls.
    pub get_many: u64,
    /// `put` calls.
    pub put: u64,
    /// `remove` and `remove_all` calls.
    pub remove: u64,
    /// `add_link` calls.
    pub add_link: u64,
    /// `remove_link` calls.
    pub remove_link: u64,
    /// `relation_target_ids`, `relation_source_ids` and `backlink_ids` calls.
    pub id_queries: u64,
}

impl CallCounts {
    /// Calls that write: puts, removals and link changes.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.put + self.remove + self.add_link + self.remove_link
    }

    /// Calls that read records or relation ids.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.get + self.get_many + self.id_queries
    }
}

/// A [`MemoryBackend`] that counts calls.
#[derive(Default)]
pub struct CountingBackend {
    inner: MemoryBackend,
    counts: Mutex<CallCounts>,
    fail_gets: AtomicBool,
    fail_links: AtomicBool,
}

impl CountingBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counts.
    pub fn counts(&self) -> CallCounts {
        *self.counts.lock()
    }

    /// Zeroes all counts.
    pub fn reset_counts(&self) {
        *self.counts.lock() = CallCounts::default();
    }

    /// Makes `get` fail until switched off again.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Makes `add_link` fail until switched off again.
    pub fn fail_links(&self, fail: bool) {
        self.fail_links.store(fail, Ordering::SeqCst);
    }

    /// The wrapped backend.
    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }

    fn bump(&self, f: impl FnOnce(&mut CallCounts)) {
        f(&mut self.counts.lock());
    }
}

impl StoreBackend for CountingBackend {
    fn begin_write(&self) -> StoreResult<()> {
        self.bump(|c| c.begin_write += 1);
        self.inner.begin_write()
    }

    fn commit_write(&self) -> StoreResult<()> {
        self.bump(|c| c.commit_write += 1);
        self.inner.commit_write()
    }

    fn abort_write(&self) -> StoreResult<()> {
        self.bump(|c| c.abort_write += 1);
        self.inner.abort_write()
    }

    fn begin_read(&self) -> StoreResult<()> {
        self.inner.begin_read()
    }

    fn end_read(&self) -> StoreResult<()> {
        self.inner.end_read()
    }

    fn id_for_put(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<Id> {
        self.inner.id_for_put(entity_type, id)
    }

    fn put(&self, entity_type: EntityTypeId, id: Id, data: Bytes) -> StoreResult<()> {
        self.bump(|c| c.put += 1);
        self.inner.put(entity_type, id, data)
    }

    fn get(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<Option<Bytes>> {
        self.bump(|c| c.get += 1);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::corrupted(format!(
                "injected failure reading {entity_type}/{id}"
            )));
        }
        self.inner.get(entity_type, id)
    }

    fn get_many(&self, entity_type: EntityTypeId, ids: &[Id]) -> StoreResult<Vec<(Id, Bytes)>> {
        self.bump(|c| c.get_many += 1);
        self.inner.get_many(entity_type, ids)
    }

    fn get_all(&self, entity_type: EntityTypeId) -> StoreResult<Vec<(Id, Bytes)>> {
        self.inner.get_all(entity_type)
    }

    fn contains(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<bool> {
        self.inner.contains(entity_type, id)
    }

    fn count(&self, entity_type: EntityTypeId) -> StoreResult<u64> {
        self.inner.count(entity_type)
    }

    fn remove(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<bool> {
        self.bump(|c| c.remove += 1);
        self.inner.remove(entity_type, id)
    }

    fn remove_all(&self, entity_type: EntityTypeId) -> StoreResult<u64> {
        self.bump(|c| c.remove += 1);
        self.inner.remove_all(entity_type)
    }

    fn add_link(&self, relation: RelationId, source: Id, target: Id) -> StoreResult<()> {
        self.bump(|c| c.add_link += 1);
        if self.fail_links.load(Ordering::SeqCst) {
            return Err(StoreError::corrupted(format!(
                "injected failure linking {source} -> {target} in relation {relation}"
            )));
        }
        self.inner.add_link(relation, source, target)
    }

    fn remove_link(&self, relation: RelationId, source: Id, target: Id) -> StoreResult<bool> {
        self.bump(|c| c.remove_link += 1);
        self.inner.remove_link(relation, source, target)
    }

    fn relation_target_ids(&self, relation: RelationId, source: Id) -> StoreResult<Vec<Id>> {
        self.bump(|c| c.id_queries += 1);
        self.inner.relation_target_ids(relation, source)
    }

    fn relation_source_ids(&self, relation: RelationId, target: Id) -> StoreResult<Vec<Id>> {
        self.bump(|c| c.id_queries += 1);
        self.inner.relation_source_ids(relation, target)
    }

    fn backlink_ids(
        &self,
        entity_type: EntityTypeId,
        slot: u16,
        target: Id,
    ) -> StoreResult<Vec<Id>> {
        self.bump(|c| c.id_queries += 1);
        self.inner.backlink_ids(entity_type, slot, target)
    }
}
