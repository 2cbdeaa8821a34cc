//! Flat table builder (the "collector").
//!
//! Records are written in two phases. All variable-length values are
//! prepared first: their payload is appended to the buffer and a
//! [`DataOffset`] is handed back. Then every field, scalar or offset, is
//! collected into its slot. The first collect switches the builder into
//! collecting mode, after which preparing is rejected.
//!
//! ## Layout
//!
//! ```text
//! +----------------+-------------+---------------------------------------+------------------------+
//! | u32 vtable_pos | payloads... | vtable: u16 len, u16 table_len, u16[] | table: u32 len, fields |
//! +----------------+-------------+---------------------------------------+------------------------+
//! ```
//!
//! - A payload is `u32 len` followed by the bytes; strings carry a trailing NUL.
//! - The vtable entry at byte position `slot` holds the field's offset from
//!   the table start, or 0 when the field is absent.
//! - Slots past the end of the vtable are absent too, which is how records
//!   written by an older schema read back.
//! - All integers are little-endian.

use crate::error::{CodecError, CodecResult};
use crate::scalar::{to_unix_millis, to_unix_nanos, Scalar};
use crate::slot::{validate_slot, MIN_SLOT, SLOT_BASE};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::SystemTime;

/// Default initial capacity for a new builder.
pub const DEFAULT_BUILDER_CAPACITY: usize = 1024;

const HEADER_SIZE: usize = 4;
const TABLE_MARKER_SIZE: usize = 4;

/// Position of a prepared payload inside the buffer being built.
///
/// `DataOffset::NONE` is returned for absent values and makes the matching
/// [`FlatBufferBuilder::collect_offset`] a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataOffset(u32);

impl DataOffset {
    /// Sentinel for "nothing was prepared".
    pub const NONE: Self = Self(0);

    /// Returns true if this is the absent sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw buffer position.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Field {
    slot: u16,
    len: u8,
    value: [u8; 8],
}

/// Builds one flat table at a time.
///
/// A builder is reusable: [`finish`](Self::finish) hands out the record and
/// leaves the builder empty but with its allocation intact. Use a
/// [`BuilderPool`](crate::BuilderPool) to share builders between puts.
#[derive(Debug)]
pub struct FlatBufferBuilder {
    buf: BytesMut,
    fields: Vec<Field>,
    collecting: bool,
}

impl FlatBufferBuilder {
    /// Creates a builder with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUILDER_CAPACITY)
    }

    /// Creates a builder with the given initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity.max(HEADER_SIZE)),
            fields: Vec::new(),
            collecting: false,
        }
    }

    /// Whether a field has been collected since the last reset.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Current capacity of the underlying buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Number of bytes written so far (header and payloads).
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.fields.is_empty()
    }

    /// Discards everything written so far, keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.fields.clear();
        self.collecting = false;
    }

    /// Copies a string payload into the buffer.
    ///
    /// Returns [`DataOffset::NONE`] for `None`.
    ///
    /// # Errors
    ///
    /// Returns `PrepareAfterCollect` once collecting has started, or
    /// `PayloadTooLarge` if the buffer would exceed 32-bit addressing.
    pub fn prepare_string(&mut self, value: Option<&str>) -> CodecResult<DataOffset> {
        match value {
            Some(s) => self.prepare_payload(s.as_bytes(), true),
            None => Ok(DataOffset::NONE),
        }
    }

    /// Copies a byte payload into the buffer.
    ///
    /// Returns [`DataOffset::NONE`] for `None`.
    ///
    /// # Errors
    ///
    /// Same as [`prepare_string`](Self::prepare_string).
    pub fn prepare_bytes(&mut self, value: Option<&[u8]>) -> CodecResult<DataOffset> {
        match value {
            Some(b) => self.prepare_payload(b, false),
            None => Ok(DataOffset::NONE),
        }
    }

    /// Writes a scalar into `slot`. Collecting the same slot twice keeps the
    /// last value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` if `slot` is not a valid field position.
    pub fn collect<T: Scalar>(&mut self, value: T, slot: u16) -> CodecResult<()> {
        validate_slot(slot)?;
        self.collecting = true;

        let mut raw = [0u8; 8];
        value.write_le(&mut raw[..T::SIZE]);
        #[allow(clippy::cast_possible_truncation)]
        let field = Field {
            slot,
            len: T::SIZE as u8,
            value: raw,
        };

        match self.fields.iter_mut().find(|f| f.slot == slot) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        Ok(())
    }

    /// Writes a scalar if present; `None` leaves the slot absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` if `slot` is not a valid field position.
    pub fn collect_optional<T: Scalar>(&mut self, value: Option<T>, slot: u16) -> CodecResult<()> {
        match value {
            Some(v) => self.collect(v, slot),
            None => Ok(()),
        }
    }

    /// Writes a prepared payload's offset into `slot`. No-op for
    /// [`DataOffset::NONE`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidSlot` if `slot` is not a valid field position.
    pub fn collect_offset(&mut self, offset: DataOffset, slot: u16) -> CodecResult<()> {
        if offset.is_none() {
            return Ok(());
        }
        self.collect(offset.get(), slot)
    }

    /// Writes a date as milliseconds since the epoch.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if the date does not fit into an `i64`.
    pub fn collect_date(&mut self, value: Option<SystemTime>, slot: u16) -> CodecResult<()> {
        match value {
            Some(time) => self.collect(to_unix_millis(time)?, slot),
            None => Ok(()),
        }
    }

    /// Writes a date as nanoseconds since the epoch.
    ///
    /// # Errors
    ///
    /// Returns `IllegalArgument` if the date does not fit into an `i64`.
    pub fn collect_date_nanos(&mut self, value: Option<SystemTime>, slot: u16) -> CodecResult<()> {
        match value {
            Some(time) => self.collect(to_unix_nanos(time)?, slot),
            None => Ok(()),
        }
    }

    /// Lays out the vtable and table and returns the finished record.
    ///
    /// The builder is reset afterwards and can be reused.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if the table does not fit 16-bit field
    /// offsets or the buffer does not fit 32-bit positions.
    pub fn finish(&mut self) -> CodecResult<Bytes> {
        self.ensure_header();
        self.fields.sort_unstable_by_key(|f| f.slot);

        let max_slot = self.fields.last().map_or(SLOT_BASE, |f| f.slot);
        let vtable_len = usize::from(max_slot) + 2;
        let vtable_len_u16 = u16::try_from(vtable_len)
            .map_err(|_| CodecError::PayloadTooLarge { size: vtable_len })?;
        let table_len = TABLE_MARKER_SIZE
            + self
                .fields
                .iter()
                .map(|f| usize::from(f.len))
                .sum::<usize>();
        let table_len_u16 =
            u16::try_from(table_len).map_err(|_| CodecError::PayloadTooLarge { size: table_len })?;

        let vtable_pos = self.buf.len();
        let total = vtable_pos + vtable_len + table_len;
        let vtable_pos_u32 =
            u32::try_from(vtable_pos).map_err(|_| CodecError::PayloadTooLarge { size: total })?;
        u32::try_from(total).map_err(|_| CodecError::PayloadTooLarge { size: total })?;

        self.buf.reserve(vtable_len + table_len);

        self.buf.put_u16_le(vtable_len_u16);
        self.buf.put_u16_le(table_len_u16);

        let mut next_field = self.fields.iter().peekable();
        let mut field_offset = TABLE_MARKER_SIZE;
        let mut slot = MIN_SLOT;
        while slot < vtable_len_u16 {
            match next_field.peek() {
                Some(field) if field.slot == slot => {
                    #[allow(clippy::cast_possible_truncation)]
                    self.buf.put_u16_le(field_offset as u16);
                    field_offset += usize::from(field.len);
                    next_field.next();
                }
                _ => self.buf.put_u16_le(0),
            }
            slot += 2;
        }

        self.buf.put_u32_le(u32::from(table_len_u16));
        for field in &self.fields {
            self.buf.put_slice(&field.value[..usize::from(field.len)]);
        }

        self.buf[..HEADER_SIZE].copy_from_slice(&vtable_pos_u32.to_le_bytes());

        let record = self.buf.split().freeze();
        tracing::trace!(
            size = record.len(),
            fields = self.fields.len(),
            "finished flat table"
        );
        self.reset();
        Ok(record)
    }

    fn ensure_header(&mut self) {
        if self.buf.is_empty() {
            self.buf.put_u32_le(0);
        }
    }

    fn prepare_payload(&mut self, payload: &[u8], nul_terminated: bool) -> CodecResult<DataOffset> {
        if self.collecting {
            return Err(CodecError::PrepareAfterCollect);
        }
        self.ensure_header();

        let offset = self.buf.len();
        let needed = 4 + payload.len() + usize::from(nul_terminated);
        let end = offset + needed;
        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::PayloadTooLarge { size: payload.len() })?;
        u32::try_from(end).map_err(|_| CodecError::PayloadTooLarge { size: end })?;
        let position =
            u32::try_from(offset).map_err(|_| CodecError::PayloadTooLarge { size: end })?;

        self.buf.reserve(needed);
        self.buf.put_u32_le(len);
        self.buf.put_slice(payload);
        if nul_terminated {
            self.buf.put_u8(0);
        }

        Ok(DataOffset(position))
    }
}

impl Default for FlatBufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}
