//! Fixture entities with hand-written bindings.
//!
//! The bindings are written the way generated ones look: one `Property`
//! constant per field, every payload prepared before the first collect,
//! relations bound in `create_entity` and applied in `post_put`.
//!
//! | entity | relations |
//! |---|---|
//! | [`Author`] | `notes`: backlink of `Note.author` |
//! | [`Note`] | `author`: to-one |
//! | [`Teacher`] | `students`: standalone relation [`TEACHES`] |
//! | [`Student`] | `teachers`: backlink of [`TEACHES`] |
//! | [`Sample`] | none, one field of every stored type |

use relbox_codec::{FlatBufferBuilder, FlatBufferReader, PropertyId};
use relbox_core::{
    BuilderExt, CoreError, CoreResult, Entity, EntityId, EntityInfo, Id, IdCell, Property,
    PropertyType, ReaderExt, RelationId, RelationKind, Store, ToMany, ToOne,
};
use std::time::{SystemTime, UNIX_EPOCH};

/// Link table between [`Teacher::students`] and [`Student::teachers`].
pub const TEACHES: RelationId = 1;

/// Owner of notes, reached through the backlink of [`Note::author`].
#[derive(Debug)]
pub struct Author {
    /// Entity id.
    pub id: IdCell,
    /// Display name.
    pub name: String,
    /// Notes whose `author` points here.
    pub notes: ToMany<Note>,
}

impl Author {
    /// Id property.
    pub const ID: Property<Author, Id> = Property::new(1, PropertyType::Long, true);
    /// Name property.
    pub const NAME: Property<Author, String> = Property::new(2, PropertyType::String, false);

    /// A new, unsaved author.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: IdCell::default(),
            name: name.to_string(),
            notes: ToMany::new(),
        }
    }

    fn notes_kind(owner_id: Id) -> RelationKind {
        RelationKind::ToOneBacklink {
            property_id: Note::AUTHOR.id(),
            owner_id,
        }
    }
}

impl Entity for Author {
    const INFO: EntityInfo = EntityInfo::new("Author", 1);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, _store: &Store) -> CoreResult<()> {
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
            notes: ToMany::bound(Self::notes_kind(id), store),
        })
    }

    fn post_put(&self, id: Id, _is_new: bool, store: &Store) -> CoreResult<()> {
        if !self.notes.is_bound() {
            self.notes.bind(Self::notes_kind(id), store)?;
        }
        self.notes.apply_to_db()
    }
}

/// A note with an optional author.
#[derive(Debug)]
pub struct Note {
    /// Entity id.
    pub id: IdCell,
    /// Body text.
    pub text: String,
    /// Creation date, millisecond precision.
    pub created: Option<SystemTime>,
    /// Who wrote it.
    pub author: ToOne<Author>,
}

impl Note {
    /// Id property.
    pub const ID: Property<Note, Id> = Property::new(1, PropertyType::Long, true);
    /// Text property.
    pub const TEXT: Property<Note, String> = Property::new(2, PropertyType::String, false);
    /// Creation date property.
    pub const CREATED: Property<Note, SystemTime> = Property::new(3, PropertyType::Date, false);
    /// Author relation property.
    pub const AUTHOR: Property<Note, EntityId<Author>> =
        Property::new(4, PropertyType::Relation, false);

    /// A new, unsaved note without author.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            id: IdCell::default(),
            text: text.to_string(),
            created: None,
            author: ToOne::empty(),
        }
    }
}

impl Entity for Note {
    const INFO: EntityInfo = EntityInfo::new("Note", 2);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, store: &Store) -> CoreResult<()> {
        let text = builder.prepare_string(Some(self.text.as_str()))?;
        builder.collect(id, Self::ID.slot())?;
        builder.collect_offset(text, Self::TEXT.slot())?;
        builder.collect_date(self.created, Self::CREATED.slot())?;
        builder.collect_to_one(&self.author, Self::AUTHOR.slot(), store)?;
        Ok(())
    }

    fn create_entity(reader: &FlatBufferReader<'_>, store: &Store) -> CoreResult<Self> {
        Ok(Self {
            id: IdCell::new(reader.read_id(Self::ID.slot())?),
            text: reader.read_string(Self::TEXT.slot())?,
            created: reader.read_optional_date(Self::CREATED.slot())?,
            author: reader.read_to_one(Self::AUTHOR.slot(), store)?,
        })
    }

    fn set_to_one_relation(&self, property_id: PropertyId, target: Option<Id>) -> CoreResult<()> {
        if property_id != Self::AUTHOR.id() {
            return Err(CoreError::illegal_state(format!(
                "Note has no to-one relation with property id {property_id}"
            )));
        }
        self.author.point_to(target);
        Ok(())
    }
}

/// Owner side of the [`TEACHES`] link table.
#[derive(Debug)]
pub struct Teacher {
    /// Entity id.
    pub id: IdCell,
    /// Display name.
    pub name: String,
    /// Linked students.
    pub students: ToMany<Student>,
}

impl Teacher {
    /// Id property.
    pub const ID: Property<Teacher, Id> = Property::new(1, PropertyType::Long, true);
    /// Name property.
    pub const NAME: Property<Teacher, String> = Property::new(2, PropertyType::String, false);

    /// A new, unsaved teacher.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: IdCell::default(),
            name: name.to_string(),
            students: ToMany::new(),
        }
    }

    fn students_kind(owner_id: Id) -> RelationKind {
        RelationKind::Standalone {
            relation_id: TEACHES,
            owner_id,
        }
    }
}

impl Entity for Teacher {
    const INFO: EntityInfo = EntityInfo::new("Teacher", 3);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, _store: &Store) -> CoreResult<()> {
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
            students: ToMany::bound(Self::students_kind(id), store),
        })
    }

    fn post_put(&self, id: Id, _is_new: bool, store: &Store) -> CoreResult<()> {
        if !self.students.is_bound() {
            self.students.bind(Self::students_kind(id), store)?;
        }
        self.students.apply_to_db()
    }
}

/// Target side of the [`TEACHES`] link table.
#[derive(Debug)]
pub struct Student {
    /// Entity id.
    pub id: IdCell,
    /// Display name.
    pub name: String,
    /// Teachers linking to this student.
    pub teachers: ToMany<Teacher>,
}

impl Student {
    /// Id property.
    pub const ID: Property<Student, Id> = Property::new(1, PropertyType::Long, true);
    /// Name property.
    pub const NAME: Property<Student, String> = Property::new(2, PropertyType::String, false);

    /// A new, unsaved student.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: IdCell::default(),
            name: name.to_string(),
            teachers: ToMany::new(),
        }
    }

    fn teachers_kind(owner_id: Id) -> RelationKind {
        RelationKind::StandaloneBacklink {
            relation_id: TEACHES,
            owner_id,
        }
    }
}

impl Entity for Student {
    const INFO: EntityInfo = EntityInfo::new("Student", 4);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, _store: &Store) -> CoreResult<()> {
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
            teachers: ToMany::bound(Self::teachers_kind(id), store),
        })
    }

    fn post_put(&self, id: Id, _is_new: bool, store: &Store) -> CoreResult<()> {
        if !self.teachers.is_bound() {
            self.teachers.bind(Self::teachers_kind(id), store)?;
        }
        self.teachers.apply_to_db()
    }
}

/// One field of every stored type.
///
/// Property ids are deliberately not in declaration order, and payloads
/// are prepared in a different order than they are collected.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Entity id.
    pub id: IdCell,
    /// `bool`.
    pub flag: bool,
    /// `i8`.
    pub tiny: i8,
    /// `i16`.
    pub small: i16,
    /// `i32`.
    pub int: i32,
    /// `i64`.
    pub long: i64,
    /// `u32`.
    pub unsigned: u32,
    /// `f32`.
    pub float: f32,
    /// `f64`.
    pub double: f64,
    /// Non-optional string.
    pub text: String,
    /// Optional string.
    pub label: Option<String>,
    /// Non-optional bytes.
    pub blob: Vec<u8>,
    /// Optional bytes.
    pub attachment: Option<Vec<u8>>,
    /// Optional integer.
    pub rank: Option<i32>,
    /// Millisecond date.
    pub date: SystemTime,
    /// Optional millisecond date.
    pub due: Option<SystemTime>,
    /// Nanosecond date.
    pub precise: SystemTime,
}

impl Sample {
    /// Id property.
    pub const ID: Property<Sample, Id> = Property::new(1, PropertyType::Long, true);
    /// `text` property.
    pub const TEXT: Property<Sample, String> = Property::new(9, PropertyType::String, false);
    /// `flag` property.
    pub const FLAG: Property<Sample, bool> = Property::new(2, PropertyType::Bool, false);
    /// `tiny` property.
    pub const TINY: Property<Sample, i8> = Property::new(3, PropertyType::Byte, false);
    /// `small` property.
    pub const SMALL: Property<Sample, i16> = Property::new(4, PropertyType::Short, false);
    /// `int` property.
    pub const INT: Property<Sample, i32> = Property::new(5, PropertyType::Int, false);
    /// `long` property.
    pub const LONG: Property<Sample, i64> = Property::new(6, PropertyType::Long, false);
    /// `unsigned` property.
    pub const UNSIGNED: Property<Sample, u32> = Property::new(16, PropertyType::Int, false);
    /// `float` property.
    pub const FLOAT: Property<Sample, f32> = Property::new(7, PropertyType::Float, false);
    /// `double` property.
    pub const DOUBLE: Property<Sample, f64> = Property::new(8, PropertyType::Double, false);
    /// `label` property.
    pub const LABEL: Property<Sample, Option<String>> =
        Property::new(10, PropertyType::String, false);
    /// `blob` property.
    pub const BLOB: Property<Sample, Vec<u8>> = Property::new(11, PropertyType::ByteVector, false);
    /// `attachment` property.
    pub const ATTACHMENT: Property<Sample, Option<Vec<u8>>> =
        Property::new(12, PropertyType::ByteVector, false);
    /// `rank` property.
    pub const RANK: Property<Sample, Option<i32>> = Property::new(13, PropertyType::Int, false);
    /// `date` property.
    pub const DATE: Property<Sample, SystemTime> = Property::new(14, PropertyType::Date, false);
    /// `due` property.
    pub const DUE: Property<Sample, Option<SystemTime>> =
        Property::new(15, PropertyType::Date, false);
    /// `precise` property.
    pub const PRECISE: Property<Sample, SystemTime> =
        Property::new(17, PropertyType::DateNano, false);
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            id: IdCell::default(),
            flag: false,
            tiny: 0,
            small: 0,
            int: 0,
            long: 0,
            unsigned: 0,
            float: 0.0,
            double: 0.0,
            text: String::new(),
            label: None,
            blob: Vec::new(),
            attachment: None,
            rank: None,
            date: UNIX_EPOCH,
            due: None,
            precise: UNIX_EPOCH,
        }
    }
}

impl Entity for Sample {
    const INFO: EntityInfo = EntityInfo::new("Sample", 5);

    fn id_cell(&self) -> &IdCell {
        &self.id
    }

    fn collect(&self, id: Id, builder: &mut FlatBufferBuilder, _store: &Store) -> CoreResult<()> {
        let attachment = builder.prepare_bytes(self.attachment.as_deref())?;
        let label = builder.prepare_string(self.label.as_deref())?;
        let blob = builder.prepare_bytes(Some(self.blob.as_slice()))?;
        let text = builder.prepare_string(Some(self.text.as_str()))?;

        builder.collect(id, Self::ID.slot())?;
        builder.collect_offset(text, Self::TEXT.slot())?;
        builder.collect(self.flag, Self::FLAG.slot())?;
        builder.collect(self.tiny, Self::TINY.slot())?;
        builder.collect(self.small, Self::SMALL.slot())?;
        builder.collect(self.int, Self::INT.slot())?;
        builder.collect(self.long, Self::LONG.slot())?;
        builder.collect(self.unsigned, Self::UNSIGNED.slot())?;
        builder.collect(self.float, Self::FLOAT.slot())?;
        builder.collect(self.double, Self::DOUBLE.slot())?;
        builder.collect_offset(label, Self::LABEL.slot())?;
        builder.collect_offset(blob, Self::BLOB.slot())?;
        builder.collect_offset(attachment, Self::ATTACHMENT.slot())?;
        builder.collect_optional(self.rank, Self::RANK.slot())?;
        builder.collect_date(Some(self.date), Self::DATE.slot())?;
        builder.collect_date(self.due, Self::DUE.slot())?;
        builder.collect_date_nanos(Some(self.precise), Self::PRECISE.slot())?;
        Ok(())
    }

    fn create_entity(reader: &FlatBufferReader<'_>, _store: &Store) -> CoreResult<Self> {
        Ok(Self {
            id: IdCell::new(reader.read_id(Self::ID.slot())?),
            flag: reader.read(Self::FLAG.slot())?,
            tiny: reader.read(Self::TINY.slot())?,
            small: reader.read(Self::SMALL.slot())?,
            int: reader.read(Self::INT.slot())?,
            long: reader.read(Self::LONG.slot())?,
            unsigned: reader.read(Self::UNSIGNED.slot())?,
            float: reader.read(Self::FLOAT.slot())?,
            double: reader.read(Self::DOUBLE.slot())?,
            text: reader.read_string(Self::TEXT.slot())?,
            label: reader
                .read_optional_string(Self::LABEL.slot())?
                .map(str::to_string),
            blob: reader.read_bytes(Self::BLOB.slot())?,
            attachment: reader
                .read_optional_bytes(Self::ATTACHMENT.slot())?
                .map(<[u8]>::to_vec),
            rank: reader.read_optional(Self::RANK.slot())?,
            date: reader.read_date(Self::DATE.slot())?,
            due: reader.read_optional_date(Self::DUE.slot())?,
            precise: reader.read_date_nanos(Self::PRECISE.slot())?,
        })
    }
}
