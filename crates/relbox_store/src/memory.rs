//! In-memory storage backend.

use crate::backend::{EntityTypeId, Id, RelationId, StoreBackend};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::{read_snapshot, write_snapshot};
use crate::tables::Tables;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug)]
struct WriteState {
    owner: ThreadId,
    tables: Tables,
}

#[derive(Debug)]
struct ReadPin {
    depth: usize,
    snapshot: Arc<Tables>,
}

/// An in-memory storage backend with snapshot isolation.
///
/// Committed state is an immutable [`Tables`] behind an `Arc`. A write
/// transaction works on a private copy that replaces the committed state on
/// commit, so readers never observe a half-applied transaction.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads. Only one
/// thread may hold the write transaction.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use relbox_store::{MemoryBackend, StoreBackend};
///
/// let backend = MemoryBackend::new();
/// backend.begin_write().unwrap();
/// let id = backend.id_for_put(1, 0).unwrap();
/// backend.put(1, id, Bytes::from_static(b"record")).unwrap();
/// backend.commit_write().unwrap();
///
/// assert_eq!(id, 1);
/// assert_eq!(backend.count(1).unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    committed: RwLock<Arc<Tables>>,
    writer: Mutex<Option<WriteState>>,
    readers: Mutex<HashMap<ThreadId, ReadPin>>,
}

impl MemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose committed state is `tables`.
    #[must_use]
    pub fn from_tables(tables: Tables) -> Self {
        Self {
            committed: RwLock::new(Arc::new(tables)),
            ..Self::default()
        }
    }

    /// Loads a backend from a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid snapshot.
    pub fn load_snapshot(path: &Path) -> StoreResult<Self> {
        Ok(Self::from_tables(read_snapshot(path)?))
    }

    /// Writes the committed state to a snapshot file.
    ///
    /// Uncommitted changes of an active write transaction are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_snapshot(&self, path: &Path) -> StoreResult<()> {
        let committed = self.committed();
        write_snapshot(path, &committed)
    }

    /// The last committed state.
    #[must_use]
    pub fn committed(&self) -> Arc<Tables> {
        Arc::clone(&self.committed.read())
    }

    /// Entity types that have ever stored a record, ascending.
    #[must_use]
    pub fn entity_type_ids(&self) -> Vec<EntityTypeId> {
        self.committed().entities.keys().copied().collect()
    }

    /// Relations that have ever stored a link, ascending.
    #[must_use]
    pub fn relation_ids(&self) -> Vec<RelationId> {
        self.committed().links.keys().copied().collect()
    }

    /// Number of committed links in a relation.
    #[must_use]
    pub fn link_count(&self, relation: RelationId) -> usize {
        self.committed().links.get(&relation).map_or(0, |l| l.len())
    }

    /// Highest id handed out for an entity type.
    #[must_use]
    pub fn last_id(&self, entity_type: EntityTypeId) -> Id {
        self.committed()
            .entities
            .get(&entity_type)
            .map_or(0, |t| t.last_id)
    }

    /// Returns true if a write transaction is active on any thread.
    #[must_use]
    pub fn is_write_active(&self) -> bool {
        self.writer.lock().is_some()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let me = thread::current().id();
        {
            let writer = self.writer.lock();
            if let Some(state) = writer.as_ref().filter(|w| w.owner == me) {
                return f(&state.tables);
            }
        }
        let pinned = self
            .readers
            .lock()
            .get(&me)
            .map(|pin| Arc::clone(&pin.snapshot));
        match pinned {
            Some(snapshot) => f(&*snapshot),
            None => f(&*self.committed()),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> StoreResult<R> {
        let me = thread::current().id();
        let mut writer = self.writer.lock();
        match writer.as_mut() {
            Some(state) if state.owner == me => Ok(f(&mut state.tables)),
            _ => Err(StoreError::NoWriteTransaction),
        }
    }

    fn take_write(&self) -> StoreResult<Tables> {
        let me = thread::current().id();
        let mut writer = self.writer.lock();
        match writer.take() {
            Some(state) if state.owner == me => Ok(state.tables),
            other => {
                *writer = other;
                Err(StoreError::NoWriteTransaction)
            }
        }
    }
}

impl StoreBackend for MemoryBackend {
    fn begin_write(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        if writer.is_some() {
            return Err(StoreError::WriteInProgress);
        }
        let tables = Tables::clone(&self.committed());
        *writer = Some(WriteState {
            owner: thread::current().id(),
            tables,
        });
        Ok(())
    }

    fn commit_write(&self) -> StoreResult<()> {
        let tables = self.take_write()?;
        *self.committed.write() = Arc::new(tables);
        Ok(())
    }

    fn abort_write(&self) -> StoreResult<()> {
        self.take_write().map(drop)
    }

    fn begin_read(&self) -> StoreResult<()> {
        let me = thread::current().id();
        let mut readers = self.readers.lock();
        match readers.get_mut(&me) {
            Some(pin) => pin.depth += 1,
            None => {
                readers.insert(
                    me,
                    ReadPin {
                        depth: 1,
                        snapshot: self.committed(),
                    },
                );
            }
        }
        Ok(())
    }

    fn end_read(&self) -> StoreResult<()> {
        let me = thread::current().id();
        let mut readers = self.readers.lock();
        let Some(pin) = readers.get_mut(&me) else {
            tracing::debug!("end_read without matching begin_read");
            return Ok(());
        };
        pin.depth -= 1;
        if pin.depth == 0 {
            readers.remove(&me);
        }
        Ok(())
    }

    fn id_for_put(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<Id> {
        self.write(|t| t.next_id(entity_type, id))
    }

    fn put(&self, entity_type: EntityTypeId, id: Id, data: Bytes) -> StoreResult<()> {
        if id == 0 {
            return Err(StoreError::corrupted("cannot store a record with id 0"));
        }
        self.write(|t| t.put(entity_type, id, data))
    }

    fn get(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<Option<Bytes>> {
        Ok(self.read(|t| t.get(entity_type, id)))
    }

    fn get_many(&self, entity_type: EntityTypeId, ids: &[Id]) -> StoreResult<Vec<(Id, Bytes)>> {
        Ok(self.read(|t| {
            ids.iter()
                .filter_map(|&id| t.get(entity_type, id).map(|data| (id, data)))
                .collect()
        }))
    }

    fn get_all(&self, entity_type: EntityTypeId) -> StoreResult<Vec<(Id, Bytes)>> {
        Ok(self.read(|t| t.get_all(entity_type)))
    }

    fn count(&self, entity_type: EntityTypeId) -> StoreResult<u64> {
        Ok(self.read(|t| t.count(entity_type)))
    }

    fn remove(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<bool> {
        self.write(|t| t.remove(entity_type, id))
    }

    fn remove_all(&self, entity_type: EntityTypeId) -> StoreResult<u64> {
        self.write(|t| t.remove_all(entity_type))
    }

    fn add_link(&self, relation: RelationId, source: Id, target: Id) -> StoreResult<()> {
        self.write(|t| t.add_link(relation, source, target))
    }

    fn remove_link(&self, relation: RelationId, source: Id, target: Id) -> StoreResult<bool> {
        self.write(|t| t.remove_link(relation, source, target))
    }

    fn relation_target_ids(&self, relation: RelationId, source: Id) -> StoreResult<Vec<Id>> {
        Ok(self.read(|t| t.targets_of(relation, source)))
    }

    fn relation_source_ids(&self, relation: RelationId, target: Id) -> StoreResult<Vec<Id>> {
        Ok(self.read(|t| t.sources_of(relation, target)))
    }

    fn backlink_ids(
        &self,
        entity_type: EntityTypeId,
        slot: u16,
        target: Id,
    ) -> StoreResult<Vec<Id>> {
        self.read(|t| t.backlinks(entity_type, slot, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::mpsc;

    fn committed_put(backend: &MemoryBackend, entity_type: EntityTypeId, data: &'static [u8]) -> Id {
        backend.begin_write().unwrap();
        let id = backend.id_for_put(entity_type, 0).unwrap();
        backend.put(entity_type, id, Bytes::from_static(data)).unwrap();
        backend.commit_write().unwrap();
        id
    }

    #[test]
    fn memory_new_is_empty() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.count(1).unwrap(), 0);
        assert!(backend.entity_type_ids().is_empty());
        assert_eq!(backend.get(1, 1).unwrap(), None);
    }

    #[test]
    fn writes_require_a_transaction() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.put(1, 1, Bytes::new()),
            Err(StoreError::NoWriteTransaction)
        ));
        assert!(matches!(
            backend.id_for_put(1, 0),
            Err(StoreError::NoWriteTransaction)
        ));
        assert!(matches!(
            backend.commit_write(),
            Err(StoreError::NoWriteTransaction)
        ));
    }

    #[test]
    fn writer_sees_own_changes_others_do_not() {
        let backend = Arc::new(MemoryBackend::new());
        backend.begin_write().unwrap();
        backend.put(1, 5, Bytes::from_static(b"pending")).unwrap();
        assert!(backend.contains(1, 5).unwrap());

        let other = Arc::clone(&backend);
        let seen = thread::spawn(move || other.contains(1, 5).unwrap())
            .join()
            .unwrap();
        assert!(!seen);

        backend.commit_write().unwrap();
        let other = Arc::clone(&backend);
        assert!(thread::spawn(move || other.contains(1, 5).unwrap())
            .join()
            .unwrap());
    }

    #[test]
    fn abort_discards_changes() {
        let backend = MemoryBackend::new();
        committed_put(&backend, 1, b"kept");

        backend.begin_write().unwrap();
        let id = backend.id_for_put(1, 0).unwrap();
        backend.put(1, id, Bytes::from_static(b"dropped")).unwrap();
        backend.remove(1, 1).unwrap();
        backend.abort_write().unwrap();

        assert_eq!(backend.count(1).unwrap(), 1);
        assert_eq!(backend.get(1, 1).unwrap().unwrap(), Bytes::from_static(b"kept"));
        assert_eq!(backend.last_id(1), 1);
    }

    #[test]
    fn second_writer_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        backend.begin_write().unwrap();

        let other = Arc::clone(&backend);
        let result = thread::spawn(move || other.begin_write()).join().unwrap();
        assert!(matches!(result, Err(StoreError::WriteInProgress)));

        // another thread cannot commit or write into it either
        let other = Arc::clone(&backend);
        let result = thread::spawn(move || other.put(1, 1, Bytes::new())).join().unwrap();
        assert!(matches!(result, Err(StoreError::NoWriteTransaction)));

        backend.abort_write().unwrap();
        assert!(!backend.is_write_active());
    }

    #[test]
    fn read_pin_keeps_a_consistent_view() {
        let backend = Arc::new(MemoryBackend::new());
        committed_put(&backend, 1, b"first");

        let (pinned_tx, pinned_rx) = mpsc::channel();
        let (written_tx, written_rx) = mpsc::channel::<()>();
        let reader = {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                backend.begin_read().unwrap();
                let before = backend.count(1).unwrap();
                pinned_tx.send(()).unwrap();
                written_rx.recv().unwrap();
                let after = backend.count(1).unwrap();
                backend.end_read().unwrap();
                let released = backend.count(1).unwrap();
                (before, after, released)
            })
        };

        pinned_rx.recv().unwrap();
        committed_put(&backend, 1, b"second");
        written_tx.send(()).unwrap();

        assert_eq!(reader.join().unwrap(), (1, 1, 2));
    }

    #[test]
    fn nested_read_pins() {
        let backend = MemoryBackend::new();
        backend.begin_read().unwrap();
        backend.begin_read().unwrap();
        backend.end_read().unwrap();
        assert_eq!(backend.readers.lock().len(), 1);
        backend.end_read().unwrap();
        assert!(backend.readers.lock().is_empty());
        // unmatched end is tolerated
        backend.end_read().unwrap();
    }

    #[test]
    fn get_many_skips_missing() {
        let backend = MemoryBackend::new();
        let a = committed_put(&backend, 1, b"a");
        let b = committed_put(&backend, 1, b"b");
        let found: Vec<Id> = backend
            .get_many(1, &[b, 99, a])
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(found, vec![b, a]);
    }

    #[test]
    fn remove_all_counts() {
        let backend = MemoryBackend::new();
        committed_put(&backend, 2, b"a");
        committed_put(&backend, 2, b"b");
        backend.begin_write().unwrap();
        assert_eq!(backend.remove_all(2).unwrap(), 2);
        assert_eq!(backend.remove_all(3).unwrap(), 0);
        backend.commit_write().unwrap();
        assert_eq!(backend.count(2).unwrap(), 0);
    }

    #[test]
    fn links_are_transactional() {
        let backend = MemoryBackend::new();
        backend.begin_write().unwrap();
        backend.add_link(4, 1, 2).unwrap();
        backend.add_link(4, 1, 2).unwrap();
        backend.commit_write().unwrap();
        assert_eq!(backend.link_count(4), 1);

        backend.begin_write().unwrap();
        assert!(backend.remove_link(4, 1, 2).unwrap());
        backend.abort_write().unwrap();
        assert_eq!(backend.relation_target_ids(4, 1).unwrap(), vec![2]);
        assert_eq!(backend.relation_source_ids(4, 2).unwrap(), vec![1]);
        assert_eq!(backend.relation_ids(), vec![4]);
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.rbx");

        let backend = MemoryBackend::new();
        committed_put(&backend, 1, b"one");
        backend.begin_write().unwrap();
        backend.add_link(3, 1, 7).unwrap();
        backend.commit_write().unwrap();
        backend.save_snapshot(&path).unwrap();

        let loaded = MemoryBackend::load_snapshot(&path).unwrap();
        assert_eq!(*loaded.committed(), *backend.committed());
        assert_eq!(loaded.last_id(1), 1);
    }

    #[derive(Debug, Clone)]
    enum TableOp {
        Insert(u8),
        Remove(usize),
        Link(Id, Id),
        Unlink(Id, Id),
    }

    fn table_op() -> impl Strategy<Value = TableOp> {
        prop_oneof![
            any::<u8>().prop_map(TableOp::Insert),
            any::<usize>().prop_map(TableOp::Remove),
            (1..5u64, 1..5u64).prop_map(|(s, t)| TableOp::Link(s, t)),
            (1..5u64, 1..5u64).prop_map(|(s, t)| TableOp::Unlink(s, t)),
        ]
    }

    proptest! {
        #[test]
        fn committed_tables_follow_a_model(
            batches in prop::collection::vec(
                (prop::collection::vec(table_op(), 0..8), any::<bool>()),
                0..12,
            )
        ) {
            let backend = MemoryBackend::new();
            let mut records: BTreeMap<Id, Bytes> = BTreeMap::new();
            let mut links: BTreeSet<(Id, Id)> = BTreeSet::new();
            let mut last_id: Id = 0;

            for (ops, commit) in batches {
                let mut next_records = records.clone();
                let mut next_links = links.clone();
                let mut next_last = last_id;

                backend.begin_write().unwrap();
                for op in ops {
                    match op {
                        TableOp::Insert(byte) => {
                            let id = backend.id_for_put(1, 0).unwrap();
                            prop_assert_eq!(id, next_last + 1);
                            next_last = id;
                            let data = Bytes::from(vec![byte]);
                            backend.put(1, id, data.clone()).unwrap();
                            next_records.insert(id, data);
                        }
                        TableOp::Remove(pick) => {
                            let id = next_records
                                .keys()
                                .copied()
                                .nth(pick % (next_records.len() + 1))
                                .unwrap_or(Id::MAX);
                            let existed = next_records.remove(&id).is_some();
                            prop_assert_eq!(backend.remove(1, id).unwrap(), existed);
                        }
                        TableOp::Link(source, target) => {
                            backend.add_link(7, source, target).unwrap();
                            next_links.insert((source, target));
                        }
                        TableOp::Unlink(source, target) => {
                            let existed = next_links.remove(&(source, target));
                            prop_assert_eq!(backend.remove_link(7, source, target).unwrap(), existed);
                        }
                    }
                }

                if commit {
                    backend.commit_write().unwrap();
                    records = next_records;
                    links = next_links;
                    last_id = next_last;
                } else {
                    backend.abort_write().unwrap();
                }

                prop_assert_eq!(backend.last_id(1), last_id);
                prop_assert_eq!(backend.get_all(1).unwrap(), records.clone().into_iter().collect::<Vec<_>>());
                prop_assert_eq!(backend.link_count(7), links.len());
                for source in 1..5u64 {
                    let expected: Vec<Id> = links
                        .iter()
                        .filter(|&&(s, _)| s == source)
                        .map(|&(_, t)| t)
                        .collect();
                    prop_assert_eq!(backend.relation_target_ids(7, source).unwrap(), expected);
                }
            }
        }
    }
}
