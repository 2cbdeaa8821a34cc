//! # relbox Testkit
//!
//! Test utilities for relbox.
//!
//! This crate provides:
//! - Fixture entities covering every relation kind and stored type
//! - Test stores and scenario helpers
//! - A call counting backend with failure injection
//! - Property-based test generators using proptest
//! - Cross-crate integration checks
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relbox_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         let author = Author::new("Ada");
//!         store.box_for::<Author>().put(&author).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod counting;
pub mod entities;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::counting::*;
    pub use crate::entities::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use counting::{CallCounts, CountingBackend};
pub use entities::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
