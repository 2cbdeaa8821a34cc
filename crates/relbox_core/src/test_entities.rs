//! Hand-written bindings used by the unit tests.

use crate::entity::{Entity, EntityInfo};
use crate::error::{CoreError, CoreResult};
use crate::id::{EntityId, IdCell};
use crate::property::{Property, PropertyType};
use crate::relation::{BuilderExt, ReaderExt, RelationKind, ToMany, ToOne};
use crate::store::Store;
use relbox_codec::{FlatBufferBuilder, FlatBufferReader, PropertyId};
use relbox_store::{Id, RelationId};
use std::sync::atomic::{AtomicBool, Ordering};

/// Link table between `Parent.favorites` and `Child.fans`.
const FAVORITES: RelationId = 1;

pub(crate) struct Parent {
    pub id: IdCell,
    pub name: String,
    /// Makes `collect` fail, for rollback tests.
    pub fail_collect: AtomicBool,
    pub children: ToMany<Child>,
    pub favorites: ToMany<Child>,
}

impl Parent {
    const ID: Property<Parent, Id> = Property::new(1, PropertyType::Long, true);
    const NAME: Property<Parent, String> = Property::new(2, PropertyType::String, false);

    pub fn new(name: &str) -> Self {
        Self::with_id(0, name)
    }

    pub fn with_id(id: Id, name: &str) -> Self {
        Self {
            id: IdCell::new(id),
            name: name.to_string(),
            fail_collect: AtomicBool::new(false),
            children: ToMany::new(),
            favorites: ToMany::new(),
        }
    }

    fn children_kind(owner_id: Id) -> RelationKind {
        RelationKind::ToOneBacklink {
            property_id: Child::PARENT.id(),
            owner_id,
        }
    }

    fn favorites_kind(owner_id: Id) -> RelationKind {
        RelationKind::Standalone {
            relation_id: FAVORITES,
            owner_id,
        }
    }
}

impl Entity for Parent {
    const INFO: EntityInfo = EntityInfo::new("Parent", 1);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, _store: &Store) -> CoreResult<()> {
        if self.fail_collect.load(Ordering::Relaxed) {
            return Err(CoreError::illegal_argument("collect failure requested"));
        }
        let name = builder.prepare_string(Some(self.name.as_str()))?;
        builder.collect(id, Self::ID.slot())?;
        builder.collect_offset(name, Self::NAME.slot())?;
        Ok(())
    }

    fn create_entity(reader: &FlatBufferReader<'_>, store: &Store) -> CoreResult<Self> {
        let id = reader.read_id(Self::ID.slot())?;
        Ok(Self {
            id: IdCell::new(id),
            name: reader.read_string(Self::NAME.slot())?,
            fail_collect: AtomicBool::new(false),
            children: ToMany::bound(Self::children_kind(id), store),
            favorites: ToMany::bound(Self::favorites_kind(id), store),
        })
    }

    fn post_put(&self, id: Id, _is_new: bool, store: &Store) -> CoreResult<()> {
        if !self.children.is_bound() {
            self.children.bind(Self::children_kind(id), store)?;
        }
        if !self.favorites.is_bound() {
            self.favorites.bind(Self::favorites_kind(id), store)?;
        }
        self.children.apply_to_db()?;
        self.favorites.apply_to_db()
    }
}

pub(crate) struct Child {
    pub id: IdCell,
    pub name: String,
    pub parent: ToOne<Parent>,
    pub fans: ToMany<Parent>,
}

impl Child {
    const ID: Property<Child, Id> = Property::new(1, PropertyType::Long, true);
    const NAME: Property<Child, String> = Property::new(2, PropertyType::String, false);
    pub const PARENT: Property<Child, EntityId<Parent>> =
        Property::new(3, PropertyType::Relation, false);

    pub fn new(name: &str) -> Self {
        Self::with_id(0, name)
    }

    pub fn with_id(id: Id, name: &str) -> Self {
        Self {
            id: IdCell::new(id),
            name: name.to_string(),
            parent: ToOne::empty(),
            fans: ToMany::new(),
        }
    }

    fn fans_kind(owner_id: Id) -> RelationKind {
        RelationKind::StandaloneBacklink {
            relation_id: FAVORITES,
            owner_id,
        }
    }
}

impl Entity for Child {
    const INFO: EntityInfo = EntityInfo::new("Child", 2);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, store: &Store) -> CoreResult<()> {
        let name = builder.prepare_string(Some(self.name.as_str()))?;
        builder.collect(id, Self::ID.slot())?;
        builder.collect_offset(name, Self::NAME.slot())?;
        builder.collect_to_one(&self.parent, Self::PARENT.slot(), store)?;
        Ok(())
    }

    fn create_entity(reader: &FlatBufferReader<'_>, store: &Store) -> CoreResult<Self> {
        let id = reader.read_id(Self::ID.slot())?;
        Ok(Self {
            id: IdCell::new(id),
            name: reader.read_string(Self::NAME.slot())?,
            parent: reader.read_to_one(Self::PARENT.slot(), store)?,
            fans: ToMany::bound(Self::fans_kind(id), store),
        })
    }

    fn post_put(&self, id: Id, _is_new: bool, store: &Store) -> CoreResult<()> {
        if !self.fans.is_bound() {
            self.fans.bind(Self::fans_kind(id), store)?;
        }
        self.fans.apply_to_db()
    }

    fn set_to_one_relation(&self, property_id: PropertyId, target: Option<Id>) -> CoreResult<()> {
        if property_id != Self::PARENT.id() {
            return Err(CoreError::illegal_state(format!(
                "Child has no to-one relation with property id {property_id}"
            )));
        }
        self.parent.point_to(target);
        Ok(())
    }
}
