//! Storage backend trait definition.

use crate::error::StoreResult;
use bytes::Bytes;

/// Numeric id of an entity type.
pub type EntityTypeId = u32;

/// Numeric id of a standalone (many-to-many) relation.
pub type RelationId = u32;

/// Entity id. `0` means "not yet persisted".
pub type Id = u64;

/// The storage contract the object layer is built on.
///
/// Backends store finished flat tables as **opaque records** keyed by
/// entity type and id, plus standalone relation links as `(source, target)`
/// pairs. Only [`backlink_ids`](Self::backlink_ids) looks inside a record,
/// and only to read one id field.
///
/// # Transactions
///
/// - At most one write transaction is active at a time. Every mutating
///   method must be called from the thread that began it.
/// - The writing thread reads its own uncommitted changes.
/// - A thread inside `begin_read`/`end_read` sees one consistent snapshot.
/// - Other reads see the last committed state.
///
/// Transaction calls are not reentrant; the caller flattens nesting.
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - In-memory tables with snapshot files
pub trait StoreBackend: Send + Sync {
    /// Starts the write transaction for the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `WriteInProgress` if a write transaction is already active.
    fn begin_write(&self) -> StoreResult<()>;

    /// Publishes the calling thread's write transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` if the calling thread does not own one.
    fn commit_write(&self) -> StoreResult<()>;

    /// Discards the calling thread's write transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` if the calling thread does not own one.
    fn abort_write(&self) -> StoreResult<()>;

    /// Pins the current committed state for the calling thread. Calls nest.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn begin_read(&self) -> StoreResult<()>;

    /// Releases one level of the calling thread's read pin.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn end_read(&self) -> StoreResult<()>;

    /// Returns the id a put of `id` should use: a fresh one for `0`,
    /// otherwise `id` itself (advancing the id sequence past it).
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` outside a write transaction.
    fn id_for_put(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<Id>;

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` outside a write transaction.
    fn put(&self, entity_type: EntityTypeId, id: Id, data: Bytes) -> StoreResult<()>;

    /// Reads a record.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn get(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<Option<Bytes>>;

    /// Reads several records in the given order, skipping missing ids.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn get_many(&self, entity_type: EntityTypeId, ids: &[Id]) -> StoreResult<Vec<(Id, Bytes)>> {
        let mut found = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(data) = self.get(entity_type, id)? {
                found.push((id, data));
            }
        }
        Ok(found)
    }

    /// Reads every record of a type in id order.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn get_all(&self, entity_type: EntityTypeId) -> StoreResult<Vec<(Id, Bytes)>>;

    /// Returns true if the record exists.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn contains(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<bool> {
        Ok(self.get(entity_type, id)?.is_some())
    }

    /// Number of records of a type.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn count(&self, entity_type: EntityTypeId) -> StoreResult<u64>;

    /// Removes a record. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` outside a write transaction.
    fn remove(&self, entity_type: EntityTypeId, id: Id) -> StoreResult<bool>;

    /// Removes every record of a type. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` outside a write transaction.
    fn remove_all(&self, entity_type: EntityTypeId) -> StoreResult<u64>;

    /// Links `source` to `target` in a standalone relation. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` outside a write transaction.
    fn add_link(&self, relation: RelationId, source: Id, target: Id) -> StoreResult<()>;

    /// Unlinks `source` from `target`. Returns true if the link existed.
    ///
    /// # Errors
    ///
    /// Returns `NoWriteTransaction` outside a write transaction.
    fn remove_link(&self, relation: RelationId, source: Id, target: Id) -> StoreResult<bool>;

    /// Targets linked from `source`, ascending.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn relation_target_ids(&self, relation: RelationId, source: Id) -> StoreResult<Vec<Id>>;

    /// Sources linking to `target`, ascending.
    ///
    /// # Errors
    ///
    /// Backend specific.
    fn relation_source_ids(&self, relation: RelationId, target: Id) -> StoreResult<Vec<Id>>;

    /// Ids of `entity_type` records whose to-one field at `slot` holds
    /// `target`, ascending. Always empty for target `0`.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if a scanned record is malformed.
    fn backlink_ids(&self, entity_type: EntityTypeId, slot: u16, target: Id)
        -> StoreResult<Vec<Id>>;
}
