//! # relbox Core
//!
//! Entity boxes, transactions and lazy relations.
//!
//! This crate provides:
//! - [`Store`]: transactions that flatten when nested, snapshot persistence
//! - [`EntityBox`]: typed put / get / remove for one entity type
//! - [`Entity`]: the binding trait each entity type implements
//! - [`ToOne`] and [`ToMany`]: relations that load on first access and
//!   track edits until they are applied
//!
//! Records are encoded with `relbox_codec` and kept by a
//! `relbox_store` backend.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod entity_box;
mod error;
mod id;
mod property;
pub mod relation;
mod store;

#[cfg(test)]
mod test_entities;

pub use config::StoreConfig;
pub use entity::{Entity, EntityInfo};
pub use entity_box::EntityBox;
pub use error::{CoreError, CoreResult};
pub use id::{EntityId, IdCell};
pub use property::{Property, PropertyType};
pub use relation::{
    BuilderExt, ReaderExt, RelationKind, RelationState, StateKind, ToMany, ToOne,
};
pub use store::{Store, StoreRef};

pub use relbox_codec::PropertyId;
pub use relbox_store::{EntityTypeId, Id, RelationId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
