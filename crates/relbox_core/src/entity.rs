//! The per-entity binding trait.

use crate::error::{CoreError, CoreResult};
use crate::id::IdCell;
use crate::store::Store;
use relbox_codec::{FlatBufferBuilder, FlatBufferReader, PropertyId};
use relbox_store::{EntityTypeId, Id};

/// Static description of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityInfo {
    /// Entity name as declared in the model.
    pub name: &'static str,
    /// Numeric type id used as the record table key.
    pub type_id: EntityTypeId,
}

impl EntityInfo {
    /// Creates entity metadata.
    #[must_use]
    pub const fn new(name: &'static str, type_id: EntityTypeId) -> Self {
        Self { name, type_id }
    }
}

/// Binding between an entity struct and its flat table.
///
/// There is one implementation per entity type, usually generated. It
/// writes the entity into a builder and reads it back, and wires up
/// relations once the entity has an id.
///
/// Puts take `&self`: the id lives in an [`IdCell`] and
/// relations use interior locking, so shared `Arc` targets can be persisted.
///
/// # Example
///
/// ```rust
/// use relbox_codec::{FlatBufferBuilder, FlatBufferReader};
/// use relbox_core::{
///     CoreResult, Entity, EntityInfo, Id, IdCell, Property, PropertyType, Store,
/// };
///
/// struct Tag {
///     id: IdCell,
///     label: String,
/// }
///
/// impl Tag {
///     const ID: Property<Tag, Id> = Property::new(1, PropertyType::Long, true);
///     const LABEL: Property<Tag, String> = Property::new(2, PropertyType::String, false);
/// }
///
/// impl Entity for Tag {
///     const INFO: EntityInfo = EntityInfo::new("Tag", 1);
///
///     fn id_cell(&self) -> &IdCell {
///         &self.id
///     }
///
///     fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, _store: &Store) -> CoreResult<()> {
///         let label = builder.prepare_string(Some(self.label.as_str()))?;
///         builder.collect(id, Self::ID.slot())?;
///         builder.collect_offset(label, Self::LABEL.slot())?;
///         Ok(())
///     }
///
///     fn create_entity(reader: &FlatBufferReader<'_>, _store: &Store) -> CoreResult<Self> {
///         Ok(Self {
///             id: IdCell::new(reader.read_id(Self::ID.slot())?),
///             label: reader.read_string(Self::LABEL.slot())?,
///         })
///     }
/// }
///
/// let store = Store::in_memory();
/// let tags = store.box_for::<Tag>();
/// let tag = Tag { id: IdCell::default(), label: "urgent".into() };
/// let id = tags.put(&tag).unwrap();
/// assert_eq!(tags.get(id).unwrap().unwrap().label, "urgent");
/// ```
pub trait Entity: Send + Sync + Sized + 'static {
    /// Static metadata.
    const INFO: EntityInfo;

    /// The cell the id is kept in. Puts write the assigned id back here.
    fn id_cell(&self) -> &IdCell;

    /// Current id, `0` if never persisted.
    fn entity_id(&self) -> Id {
        self.id_cell().get()
    }

    /// Writes all properties into `builder`.
    ///
    /// Every string and byte vector must be prepared before the first
    /// collect. To-one relations are written with
    /// [`BuilderExt::collect_to_one`](crate::BuilderExt::collect_to_one),
    /// which may put an unsaved target through `store` first.
    ///
    /// # Errors
    ///
    /// Codec errors, or errors from a cascading put.
    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, store: &Store) -> CoreResult<()>;

    /// Reads an entity back. Relations come back lazy, bound to `store`.
    ///
    /// # Errors
    ///
    /// Codec errors for malformed records.
    fn create_entity(reader: &FlatBufferReader<'_>, store: &Store) -> CoreResult<Self>;

    /// Runs inside the put's transaction after the record was written.
    ///
    /// Bindings use it to bind to-many relations of new entities and apply
    /// their pending changes.
    ///
    /// # Errors
    ///
    /// Errors abort the surrounding put.
    fn post_put(&self, _id: Id, _is_new: bool, _store: &Store) -> CoreResult<()> {
        Ok(())
    }

    /// Points the to-one relation `property_id` at `target`.
    ///
    /// Called when a to-many backlink is applied from the other side.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the entity has no such to-one relation.
    fn set_to_one_relation(&self, property_id: PropertyId, _target: Option<Id>) -> CoreResult<()> {
        Err(CoreError::illegal_state(format!(
            "{} has no to-one relation with property id {property_id}",
            Self::INFO.name
        )))
    }
}
