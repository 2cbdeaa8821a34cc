//! Relation fields on the flat table codec.

use super::to_one::ToOne;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::store::Store;
use relbox_codec::{FlatBufferBuilder, FlatBufferReader};

/// Writes to-one relations into a builder.
pub trait BuilderExt {
    /// Writes the target id of `relation` at `slot`; an empty relation
    /// leaves the slot absent.
    ///
    /// If the relation holds an object that was never persisted, that
    /// object is put through `store` first, joining the current
    /// transaction, and its new id is written.
    ///
    /// # Errors
    ///
    /// Codec errors, or any error of the cascading put.
    fn collect_to_one<T: Entity>(
        &mut self,
        relation: &ToOne<T>,
        slot: u16,
        store: &Store,
    ) -> CoreResult<()>;
}

impl BuilderExt for FlatBufferBuilder {
    fn collect_to_one<T: Entity>(
        &mut self,
        relation: &ToOne<T>,
        slot: u16,
        store: &Store,
    ) -> CoreResult<()> {
        match relation.id_for_collect(store)? {
            0 => Ok(()),
            id => Ok(self.collect(id, slot)?),
        }
    }
}

/// Reads to-one relations from a record.
pub trait ReaderExt {
    /// Returns a relation pending on the id stored at `slot`, or an empty
    /// one if the slot is absent or 0. The target is loaded from `store`
    /// on first access.
    ///
    /// # Errors
    ///
    /// Codec errors for a malformed field.
    fn read_to_one<T: Entity>(&self, slot: u16, store: &Store) -> CoreResult<ToOne<T>>;
}

impl ReaderExt for FlatBufferReader<'_> {
    fn read_to_one<T: Entity>(&self, slot: u16, store: &Store) -> CoreResult<ToOne<T>> {
        let id = self.read_id(slot)?;
        Ok(ToOne::lazy(store, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::StateKind;
    use crate::test_entities::Parent;
    use relbox_codec::property_slot;
    use std::sync::Arc;

    const SLOT: u16 = property_slot(2);

    #[test]
    fn empty_relation_leaves_slot_absent() {
        let store = Store::in_memory();
        let mut builder = FlatBufferBuilder::new();
        builder
            .collect_to_one(&ToOne::<Parent>::empty(), SLOT, &store)
            .unwrap();
        let data = builder.finish().unwrap();

        let reader = FlatBufferReader::new(&data).unwrap();
        assert!(!reader.has_field(SLOT).unwrap());
        let relation: ToOne<Parent> = reader.read_to_one(SLOT, &store).unwrap();
        assert_eq!(relation.state_kind(), StateKind::Empty);
    }

    #[test]
    fn stored_id_reads_back_pending() {
        let store = Store::in_memory();
        let mut builder = FlatBufferBuilder::new();
        let relation = ToOne::<Parent>::lazy(&store, 41);
        builder.collect_to_one(&relation, SLOT, &store).unwrap();
        let data = builder.finish().unwrap();

        let reader = FlatBufferReader::new(&data).unwrap();
        assert_eq!(reader.read_id(SLOT).unwrap(), 41);
        let relation: ToOne<Parent> = reader.read_to_one(SLOT, &store).unwrap();
        assert_eq!(relation.state_kind(), StateKind::Pending);
        assert_eq!(relation.target_id().map(|id| id.value()), Some(41));
    }

    #[test]
    fn unsaved_target_is_put_before_writing() {
        let store = Store::in_memory();
        let target = Arc::new(Parent::new("cascaded"));
        let relation = ToOne::new(Some(Arc::clone(&target)));

        let mut builder = FlatBufferBuilder::new();
        builder.collect_to_one(&relation, SLOT, &store).unwrap();
        let data = builder.finish().unwrap();

        assert_eq!(target.entity_id(), 1);
        assert_eq!(relation.state_kind(), StateKind::Unstored);
        assert_eq!(relation.target_id().map(|id| id.value()), Some(1));
        let reader = FlatBufferReader::new(&data).unwrap();
        assert_eq!(reader.read_id(SLOT).unwrap(), 1);
    }
}
