//! Flat table reader.
//!
//! Reads never fail because a field is missing: absent slots yield the
//! type's default (`0`, `false`, empty string, empty bytes, epoch) or `None`
//! from the `*_optional` variants. Errors are reserved for buffers whose
//! structure is broken.

use crate::error::{CodecError, CodecResult};
use crate::scalar::{from_unix_millis, from_unix_nanos, Scalar};
use crate::slot::{property_id_for_slot, validate_slot, PropertyId, MIN_SLOT};
use std::time::{SystemTime, UNIX_EPOCH};

const HEADER_SIZE: usize = 4;
const VTABLE_HEADER_SIZE: usize = 4;
const TABLE_MARKER_SIZE: usize = 4;

/// A present field as stored, without type information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField<'a> {
    /// Vtable slot.
    pub slot: u16,
    /// Property id derived from the slot.
    pub property_id: PropertyId,
    /// Inline bytes of the field.
    pub bytes: &'a [u8],
}

/// Typed view over one finished flat table.
#[derive(Debug, Clone, Copy)]
pub struct FlatBufferReader<'a> {
    buf: &'a [u8],
    vtable: usize,
    vtable_len: usize,
    table: usize,
    table_len: usize,
}

impl<'a> FlatBufferReader<'a> {
    /// Validates the header, vtable and table bounds of `buf`.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the buffer is truncated or its header is
    /// inconsistent.
    pub fn new(buf: &'a [u8]) -> CodecResult<Self> {
        if buf.len() < HEADER_SIZE + VTABLE_HEADER_SIZE + TABLE_MARKER_SIZE {
            return Err(CodecError::malformed(format!(
                "buffer of {} bytes is too short",
                buf.len()
            )));
        }

        let vtable = u32_at(buf, 0)? as usize;
        if vtable < HEADER_SIZE || vtable + VTABLE_HEADER_SIZE > buf.len() {
            return Err(CodecError::malformed(format!(
                "vtable position {vtable} outside buffer of {} bytes",
                buf.len()
            )));
        }

        let vtable_len = usize::from(u16_at(buf, vtable)?);
        let table_len = usize::from(u16_at(buf, vtable + 2)?);
        if vtable_len < VTABLE_HEADER_SIZE || vtable_len % 2 != 0 {
            return Err(CodecError::malformed(format!(
                "invalid vtable length {vtable_len}"
            )));
        }
        if table_len < TABLE_MARKER_SIZE {
            return Err(CodecError::malformed(format!(
                "invalid table length {table_len}"
            )));
        }

        let table = vtable + vtable_len;
        if table + table_len > buf.len() {
            return Err(CodecError::malformed(format!(
                "table at {table} with length {table_len} exceeds buffer of {} bytes",
                buf.len()
            )));
        }

        Ok(Self {
            buf,
            vtable,
            vtable_len,
            table,
            table_len,
        })
    }

    /// The underlying bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Returns true if `slot` holds a value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` for an invalid slot, or `OutOfBounds` if the
    /// vtable entry points outside the table.
    pub fn has_field(&self, slot: u16) -> CodecResult<bool> {
        Ok(self.field_position(slot)?.is_some())
    }

    /// Reads a scalar, or its default when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read<T: Scalar>(&self, slot: u16) -> CodecResult<T> {
        Ok(self.read_optional(slot)?.unwrap_or(T::DEFAULT))
    }

    /// Reads a scalar, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_optional<T: Scalar>(&self, slot: u16) -> CodecResult<Option<T>> {
        let Some(position) = self.field_position(slot)? else {
            return Ok(None);
        };
        let end = self.table + self.table_len;
        if position + T::SIZE > end {
            return Err(CodecError::out_of_bounds(position, T::SIZE, end));
        }
        Ok(Some(T::read_le(&self.buf[position..position + T::SIZE])))
    }

    /// Reads an entity id (`u64`); `0` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_id(&self, slot: u16) -> CodecResult<u64> {
        self.read::<u64>(slot)
    }

    /// Reads a string, or `""` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot`, `OutOfBounds` or `InvalidUtf8`.
    pub fn read_string(&self, slot: u16) -> CodecResult<String> {
        Ok(self
            .read_optional_string(slot)?
            .map(str::to_owned)
            .unwrap_or_default())
    }

    /// Borrows a string, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot`, `OutOfBounds` or `InvalidUtf8`.
    pub fn read_optional_string(&self, slot: u16) -> CodecResult<Option<&'a str>> {
        match self.payload(slot)? {
            Some(bytes) => std::str::from_utf8(bytes)
                .map(Some)
                .map_err(|_| CodecError::InvalidUtf8 { slot }),
            None => Ok(None),
        }
    }

    /// Reads a byte vector, or an empty one when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_bytes(&self, slot: u16) -> CodecResult<Vec<u8>> {
        Ok(self
            .read_optional_bytes(slot)?
            .map(<[u8]>::to_vec)
            .unwrap_or_default())
    }

    /// Borrows a byte payload, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_optional_bytes(&self, slot: u16) -> CodecResult<Option<&'a [u8]>> {
        self.payload(slot)
    }

    /// Reads a millisecond date, or the epoch when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_date(&self, slot: u16) -> CodecResult<SystemTime> {
        Ok(self.read_optional_date(slot)?.unwrap_or(UNIX_EPOCH))
    }

    /// Reads a millisecond date, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_optional_date(&self, slot: u16) -> CodecResult<Option<SystemTime>> {
        Ok(self.read_optional::<i64>(slot)?.map(from_unix_millis))
    }

    /// Reads a nanosecond date, or the epoch when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_date_nanos(&self, slot: u16) -> CodecResult<SystemTime> {
        Ok(self.read_optional_date_nanos(slot)?.unwrap_or(UNIX_EPOCH))
    }

    /// Reads a nanosecond date, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` or `OutOfBounds`.
    pub fn read_optional_date_nanos(&self, slot: u16) -> CodecResult<Option<SystemTime>> {
        Ok(self.read_optional::<i64>(slot)?.map(from_unix_nanos))
    }

    /// Lists every present field in slot order.
    ///
    /// The width of each field is inferred from the next field's offset,
    /// which is exact for tables written by [`FlatBufferBuilder`](crate::FlatBufferBuilder).
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` if a vtable entry points outside the table.
    pub fn fields(&self) -> CodecResult<Vec<RawField<'a>>> {
        let mut present = Vec::new();
        let mut slot = MIN_SLOT;
        while usize::from(slot) + 2 <= self.vtable_len {
            if let Some(position) = self.field_position(slot)? {
                present.push((slot, position));
            }
            slot += 2;
        }

        let mut by_position = present.clone();
        by_position.sort_unstable_by_key(|&(_, position)| position);
        let end = self.table + self.table_len;

        let mut fields = Vec::with_capacity(present.len());
        for (slot, position) in present {
            let next = by_position
                .iter()
                .map(|&(_, p)| p)
                .find(|&p| p > position)
                .unwrap_or(end);
            let Some(property_id) = property_id_for_slot(slot) else {
                continue;
            };
            fields.push(RawField {
                slot,
                property_id,
                bytes: &self.buf[position..next],
            });
        }
        Ok(fields)
    }

    fn field_position(&self, slot: u16) -> CodecResult<Option<usize>> {
        validate_slot(slot)?;
        let entry = usize::from(slot);
        if entry + 2 > self.vtable_len {
            return Ok(None);
        }
        let offset = usize::from(u16_at(self.buf, self.vtable + entry)?);
        if offset == 0 {
            return Ok(None);
        }
        if offset < TABLE_MARKER_SIZE || offset >= self.table_len {
            return Err(CodecError::out_of_bounds(
                self.table + offset,
                0,
                self.table + self.table_len,
            ));
        }
        Ok(Some(self.table + offset))
    }

    fn payload(&self, slot: u16) -> CodecResult<Option<&'a [u8]>> {
        let Some(offset) = self.read_optional::<u32>(slot)? else {
            return Ok(None);
        };
        let start = offset as usize;
        // payloads live between the header and the vtable
        if start < HEADER_SIZE || start + 4 > self.vtable {
            return Err(CodecError::out_of_bounds(start, 4, self.vtable));
        }
        let len = u32_at(self.buf, start)? as usize;
        let data = start + 4;
        if data + len > self.vtable {
            return Err(CodecError::out_of_bounds(data, len, self.vtable));
        }
        Ok(Some(&self.buf[data..data + len]))
    }
}

fn u16_at(buf: &[u8], position: usize) -> CodecResult<u16> {
    buf.get(position..position + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| CodecError::out_of_bounds(position, 2, buf.len()))
}

fn u32_at(buf: &[u8], position: usize) -> CodecResult<u32> {
    buf.get(position..position + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| CodecError::out_of_bounds(position, 4, buf.len()))
}
