//! Property descriptors.

use relbox_codec::{property_slot, PropertyId};
use std::fmt;
use std::marker::PhantomData;

/// Stored type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// `bool`, one byte.
    Bool,
    /// `i8` / `u8`.
    Byte,
    /// `i16` / `u16`.
    Short,
    /// `i32` / `u32`.
    Int,
    /// `i64` / `u64`.
    Long,
    /// `f32`.
    Float,
    /// `f64`.
    Double,
    /// UTF-8 string payload.
    String,
    /// Byte vector payload.
    ByteVector,
    /// Milliseconds since the epoch.
    Date,
    /// Nanoseconds since the epoch.
    DateNano,
    /// To-one target id.
    Relation,
}

/// Compile-time metadata for property `V` of entity `E`.
///
/// Bindings declare one `const` per property; the id is the only thing the
/// codec needs from it.
pub struct Property<E, V> {
    id: PropertyId,
    property_type: PropertyType,
    is_primary_key: bool,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Property<E, V> {
    /// Declares a property.
    #[must_use]
    pub const fn new(id: PropertyId, property_type: PropertyType, is_primary_key: bool) -> Self {
        Self {
            id,
            property_type,
            is_primary_key,
            _marker: PhantomData,
        }
    }

    /// Numeric property id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PropertyId {
        self.id
    }

    /// Stored type.
    #[inline]
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Whether this is the entity's id property.
    #[inline]
    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    /// Vtable slot of this property.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> u16 {
        property_slot(self.id)
    }
}

impl<E, V> Clone for Property<E, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, V> Copy for Property<E, V> {}

impl<E, V> fmt::Debug for Property<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &self.property_type)
            .field("primary_key", &self.is_primary_key)
            .finish()
    }
}
