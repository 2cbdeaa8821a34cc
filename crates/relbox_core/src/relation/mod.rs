//! Lazy relations between entities.
//!
//! - [`ToOne`] holds one optional target and loads it on first access.
//! - [`ToMany`] holds an ordered list of targets with pending edits that
//!   are written by [`ToMany::apply_to_db`].
//! - [`BuilderExt`] and [`ReaderExt`] write and read to-one ids in entity
//!   bindings.
//!
//! # Lock order
//!
//! Store writer, then a `ToMany` lock, then `ToOne` locks. Reads never take
//! the writer lock.

mod codec;
mod state;
mod to_many;
mod to_one;

pub use codec::{BuilderExt, ReaderExt};
pub use state::{RelationState, StateKind};
pub use to_many::{RelationKind, ToMany};
pub use to_one::ToOne;
