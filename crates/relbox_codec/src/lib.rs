//! # relbox Codec
//!
//! Slot-addressed flat table encoding for relbox entities.
//!
//! Every entity is stored as one flat table. A field lives at a *slot*
//! derived from its property id (`slot = 2 + 2 * id`), so records written
//! before a property was added still read back, with the new field reported
//! as absent.
//!
//! Writing happens in two phases:
//!
//! 1. **Prepare**: copy variable-length values (strings, byte vectors) into
//!    the buffer and keep the returned [`DataOffset`]s.
//! 2. **Collect**: write every scalar and every prepared offset into its slot.
//!
//! Preparing after the first collect is an error.
//!
//! ## Usage
//!
//! ```
//! use relbox_codec::{property_slot, FlatBufferBuilder, FlatBufferReader};
//!
//! const ID: u16 = property_slot(1);
//! const NAME: u16 = property_slot(2);
//! const SCORE: u16 = property_slot(3);
//!
//! let mut builder = FlatBufferBuilder::new();
//! let name = builder.prepare_string(Some("Ada")).unwrap();
//! builder.collect(1u64, ID).unwrap();
//! builder.collect_offset(name, NAME).unwrap();
//! let bytes = builder.finish().unwrap();
//!
//! let reader = FlatBufferReader::new(&bytes).unwrap();
//! assert_eq!(reader.read_id(ID).unwrap(), 1);
//! assert_eq!(reader.read_string(NAME).unwrap(), "Ada");
//! assert_eq!(reader.read::<i32>(SCORE).unwrap(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod error;
mod pool;
mod reader;
mod scalar;
mod slot;

pub use builder::{DataOffset, FlatBufferBuilder, DEFAULT_BUILDER_CAPACITY};
pub use error::{CodecError, CodecResult};
pub use pool::{BuilderPool, PoolStats, PooledBuilder, DEFAULT_MAX_RETAINED_CAPACITY};
pub use reader::{FlatBufferReader, RawField};
pub use scalar::{from_unix_millis, from_unix_nanos, to_unix_millis, to_unix_nanos, Scalar};
pub use slot::{
    checked_property_slot, property_id_for_slot, property_slot, PropertyId, MAX_PROPERTY_ID,
    MAX_SLOT, MIN_SLOT, SLOT_BASE,
};
