//! Typed entity box.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::id::EntityId;
use crate::store::Store;
use bytes::Bytes;
use relbox_codec::FlatBufferReader;
use relbox_store::Id;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Typed access to the entities of type `T`.
///
/// Every method runs in its own transaction unless called inside
/// [`Store::run_in_transaction`] or [`Store::run_in_read_transaction`], in
/// which case it joins the caller's.
pub struct EntityBox<T: Entity> {
    store: Store,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityBox<T> {
    pub(crate) fn new(store: Store) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// The store this box belongs to.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Inserts or updates an entity and returns its id.
    ///
    /// A new entity (id 0) gets a fresh id, written back into its
    /// [`Entity::id_cell`]. To-one targets that were never persisted are
    /// put first, in the same transaction.
    ///
    /// If the outermost transaction aborts, every id written back during it
    /// is reset, so a later put assigns a fresh one.
    ///
    /// # Errors
    ///
    /// Codec, storage or relation errors; the whole put is rolled back.
    pub fn put(&self, entity: &T) -> CoreResult<EntityId<T>> {
        self.store.run_in_transaction(|| self.put_in_txn(entity))
    }

    /// Puts several entities in one transaction.
    ///
    /// # Errors
    ///
    /// Fails on the first error and rolls back all of them.
    pub fn put_many<'a, I>(&self, entities: I) -> CoreResult<Vec<EntityId<T>>>
    where
        I: IntoIterator<Item = &'a T>,
    {
        self.store.run_in_transaction(|| {
            entities
                .into_iter()
                .map(|entity| self.put_in_txn(entity))
                .collect()
        })
    }

    fn put_in_txn(&self, entity: &T) -> CoreResult<EntityId<T>> {
        let backend = self.store.backend();
        let current = entity.entity_id();
        let id = backend.id_for_put(T::INFO.type_id, current)?;

        let data = {
            let mut builder = self.store.builder_pool().checkout();
            entity.collect(id, &mut builder, &self.store)?;
            builder.finish()?
        };
        backend.put(T::INFO.type_id, id, data)?;

        if id != current {
            self.store.assign_id(entity.id_cell(), id);
        }
        entity.post_put(id, current == 0, &self.store)?;
        tracing::trace!(entity = T::INFO.name, id, "put");
        Ok(EntityId::new(id))
    }

    /// Reads an entity.
    ///
    /// # Errors
    ///
    /// Storage errors, or codec errors for malformed records.
    pub fn get(&self, id: EntityId<T>) -> CoreResult<Option<T>> {
        self.get_raw(id.value())
    }

    pub(crate) fn get_raw(&self, id: Id) -> CoreResult<Option<T>> {
        if id == 0 {
            return Ok(None);
        }
        self.store.ensure_open()?;
        match self.store.backend().get(T::INFO.type_id, id)? {
            Some(data) => Ok(Some(self.decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Reads several entities in the given order, skipping missing ids.
    ///
    /// # Errors
    ///
    /// Storage or codec errors.
    pub fn get_many(&self, ids: &[EntityId<T>]) -> CoreResult<Vec<T>> {
        let raw: Vec<Id> = ids.iter().map(|id| id.value()).collect();
        self.get_many_raw(&raw)
    }

    pub(crate) fn get_many_raw(&self, ids: &[Id]) -> CoreResult<Vec<T>> {
        self.store.run_in_read_transaction(|| {
            self.store
                .backend()
                .get_many(T::INFO.type_id, ids)?
                .iter()
                .map(|(_, data)| self.decode(data))
                .collect()
        })
    }

    /// Reads several entities keyed by id. Missing ids are absent from the map.
    ///
    /// # Errors
    ///
    /// Storage or codec errors.
    pub fn get_map(&self, ids: &[EntityId<T>]) -> CoreResult<HashMap<EntityId<T>, T>> {
        let raw: Vec<Id> = ids.iter().map(|id| id.value()).collect();
        self.store.run_in_read_transaction(|| {
            self.store
                .backend()
                .get_many(T::INFO.type_id, &raw)?
                .iter()
                .map(|(id, data)| -> CoreResult<(EntityId<T>, T)> {
                    Ok((EntityId::new(*id), self.decode(data)?))
                })
                .collect()
        })
    }

    /// Reads every entity of this type in id order.
    ///
    /// # Errors
    ///
    /// Storage or codec errors.
    pub fn all(&self) -> CoreResult<Vec<T>> {
        self.store.run_in_read_transaction(|| {
            self.store
                .backend()
                .get_all(T::INFO.type_id)?
                .iter()
                .map(|(_, data)| self.decode(data))
                .collect()
        })
    }

    /// Returns true if an entity with this id exists.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn contains(&self, id: EntityId<T>) -> CoreResult<bool> {
        self.store.ensure_open()?;
        Ok(self.store.backend().contains(T::INFO.type_id, id.value())?)
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn count(&self) -> CoreResult<u64> {
        self.store.ensure_open()?;
        Ok(self.store.backend().count(T::INFO.type_id)?)
    }

    /// Returns true if no entity of this type is stored.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Removes an entity. Returns true if it existed.
    ///
    /// Relations pointing at it are left as they are; their next lookup
    /// reports the target as unresolvable.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn remove(&self, id: EntityId<T>) -> CoreResult<bool> {
        self.store.run_in_transaction(|| {
            Ok(self.store.backend().remove(T::INFO.type_id, id.value())?)
        })
    }

    /// Removes several entities. Returns how many existed.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn remove_many(&self, ids: &[EntityId<T>]) -> CoreResult<u64> {
        self.store.run_in_transaction(|| {
            let mut removed = 0;
            for id in ids {
                if self.store.backend().remove(T::INFO.type_id, id.value())? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// Removes every entity of this type. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn remove_all(&self) -> CoreResult<u64> {
        self.store
            .run_in_transaction(|| Ok(self.store.backend().remove_all(T::INFO.type_id)?))
    }

    fn decode(&self, data: &Bytes) -> CoreResult<T> {
        let reader = FlatBufferReader::new(data)?;
        T::create_entity(&reader, &self.store)
    }
}

impl<T: Entity> Clone for EntityBox<T> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<T: Entity> fmt::Debug for EntityBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBox")
            .field("entity", &T::INFO.name)
            .field("type_id", &T::INFO.type_id)
            .finish()
    }
}
