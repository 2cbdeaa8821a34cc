//! # relbox Storage
//!
//! Storage backend trait and implementations for relbox.
//!
//! Backends keep finished flat tables as opaque records keyed by entity
//! type and id, plus the links of standalone relations. They know nothing
//! about entities, relations or change tracking; that lives in
//! `relbox_core`.
//!
//! ## Design Principles
//!
//! - One write transaction at a time, owned by one thread
//! - The writer reads its own changes; everybody else reads committed state
//! - Read transactions pin a snapshot per thread
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - In-memory tables, optionally persisted as snapshot files
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use relbox_store::{MemoryBackend, StoreBackend};
//!
//! let backend = MemoryBackend::new();
//! backend.begin_write().unwrap();
//! backend.add_link(1, 10, 20).unwrap();
//! backend.commit_write().unwrap();
//! assert_eq!(backend.relation_target_ids(1, 10).unwrap(), vec![20]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod snapshot;
mod tables;

pub use backend::{EntityTypeId, Id, RelationId, StoreBackend};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use snapshot::{read_snapshot, write_snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use tables::{EntityTable, Tables};
