//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building or reading a flat table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The slot is not a valid field position.
    #[error("invalid slot {slot}: slots are even and within {min}..={max}")]
    InvalidSlot {
        /// The offending slot.
        slot: u16,
        /// Smallest valid slot.
        min: u16,
        /// Largest valid slot.
        max: u16,
    },

    /// A variable-length value was prepared after the first field was collected.
    #[error("cannot prepare a payload after collecting has started")]
    PrepareAfterCollect,

    /// A read reached past the end of the buffer.
    #[error("read out of bounds: offset {offset}, len {len}, buffer size {size}")]
    OutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Size of the buffer.
        size: usize,
    },

    /// The buffer does not have the expected structure.
    #[error("malformed buffer: {message}")]
    Malformed {
        /// Description of the structural problem.
        message: String,
    },

    /// A value cannot be represented in the target encoding.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// Description of the rejected value.
        message: String,
    },

    /// A payload or table grew beyond what 32-bit offsets can address.
    #[error("payload too large: {size} bytes")]
    PayloadTooLarge {
        /// Size that was requested.
        size: usize,
    },

    /// A string field does not hold valid UTF-8.
    #[error("invalid UTF-8 in string at slot {slot}")]
    InvalidUtf8 {
        /// The slot that was read.
        slot: u16,
    },
}

impl CodecError {
    /// Create a malformed buffer error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Create an out-of-bounds error.
    pub fn out_of_bounds(offset: usize, len: usize, size: usize) -> Self {
        Self::OutOfBounds { offset, len, size }
    }
}
