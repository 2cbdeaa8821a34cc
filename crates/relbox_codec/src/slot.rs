//! Property id to slot mapping.
//!
//! A slot is the byte position of a field's entry inside the table's vtable.
//! Slots are derived from the property id, never from declaration order, so
//! adding properties to an entity does not move existing fields.

use crate::error::{CodecError, CodecResult};

/// Numeric property id as declared in the entity model. Ids start at 1.
pub type PropertyId = u16;

/// Size of the vtable header (`u16` vtable length + `u16` table length),
/// minus the two bytes accounted for by property id 1.
pub const SLOT_BASE: u16 = 2;

/// First valid slot (property id 1).
pub const MIN_SLOT: u16 = SLOT_BASE + 2;

/// Largest property id whose vtable, one entry past its slot, still has a
/// `u16` length.
pub const MAX_PROPERTY_ID: PropertyId = (u16::MAX - SLOT_BASE - 2) / 2;

/// Slot of [`MAX_PROPERTY_ID`].
pub const MAX_SLOT: u16 = SLOT_BASE + 2 * MAX_PROPERTY_ID;

/// Returns the slot for a property id: `SLOT_BASE + 2 * id`.
///
/// Intended for generated constants; panics (at compile time when used in a
/// `const`) for id 0 or ids above [`MAX_PROPERTY_ID`].
#[must_use]
pub const fn property_slot(id: PropertyId) -> u16 {
    assert!(id >= 1 && id <= MAX_PROPERTY_ID, "property id out of range");
    SLOT_BASE + 2 * id
}

/// Checked variant of [`property_slot`].
///
/// # Errors
///
/// Returns `IllegalArgument` for id 0 or ids above [`MAX_PROPERTY_ID`].
pub fn checked_property_slot(id: PropertyId) -> CodecResult<u16> {
    if id == 0 || id > MAX_PROPERTY_ID {
        return Err(CodecError::illegal_argument(format!(
            "property id {id} outside 1..={MAX_PROPERTY_ID}"
        )));
    }
    Ok(SLOT_BASE + 2 * id)
}

/// Inverse of [`property_slot`]. Returns `None` for invalid slots.
#[must_use]
pub fn property_id_for_slot(slot: u16) -> Option<PropertyId> {
    if slot < MIN_SLOT || slot > MAX_SLOT || slot % 2 != 0 {
        return None;
    }
    Some((slot - SLOT_BASE) / 2)
}

pub(crate) fn validate_slot(slot: u16) -> CodecResult<()> {
    if slot < MIN_SLOT || slot > MAX_SLOT || slot % 2 != 0 {
        return Err(CodecError::InvalidSlot {
            slot,
            min: MIN_SLOT,
            max: MAX_SLOT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_formula() {
        assert_eq!(property_slot(1), 4);
        assert_eq!(property_slot(2), 6);
        assert_eq!(property_slot(6), 14);
    }

    #[test]
    fn slot_roundtrip() {
        for id in [1, 2, 17, 300, MAX_PROPERTY_ID] {
            assert_eq!(property_id_for_slot(property_slot(id)), Some(id));
        }
    }

    #[test]
    fn checked_rejects_out_of_range() {
        assert!(checked_property_slot(0).is_err());
        assert!(checked_property_slot(MAX_PROPERTY_ID + 1).is_err());
        assert_eq!(checked_property_slot(3).unwrap(), 8);
    }

    #[test]
    fn invalid_slots() {
        assert!(validate_slot(0).is_err());
        assert!(validate_slot(2).is_err());
        assert!(validate_slot(5).is_err());
        assert!(validate_slot(4).is_ok());
        assert!(validate_slot(MAX_SLOT).is_ok());
        assert!(validate_slot(MAX_SLOT + 2).is_err());
        assert_eq!(property_id_for_slot(MAX_SLOT + 2), None);
        assert_eq!(property_id_for_slot(3), None);
    }
}
