//! Store configuration.

use relbox_codec::{DEFAULT_BUILDER_CAPACITY, DEFAULT_MAX_RETAINED_CAPACITY};
use std::path::PathBuf;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file to load on open and, with `save_on_close`, to write on close.
    pub snapshot_path: Option<PathBuf>,

    /// Whether closing (or dropping) the store writes the snapshot.
    pub save_on_close: bool,

    /// Initial capacity of newly created flat table builders.
    pub initial_builder_capacity: usize,

    /// Builders that grew beyond this are dropped instead of pooled.
    pub max_retained_builder_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            save_on_close: true,
            initial_builder_capacity: DEFAULT_BUILDER_CAPACITY,
            max_retained_builder_capacity: DEFAULT_MAX_RETAINED_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot file.
    #[must_use]
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Sets whether to write the snapshot on close.
    #[must_use]
    pub const fn save_on_close(mut self, value: bool) -> Self {
        self.save_on_close = value;
        self
    }

    /// Sets the initial builder capacity.
    #[must_use]
    pub const fn initial_builder_capacity(mut self, bytes: usize) -> Self {
        self.initial_builder_capacity = bytes;
        self
    }

    /// Sets the largest builder capacity kept in the pool.
    #[must_use]
    pub const fn max_retained_builder_capacity(mut self, bytes: usize) -> Self {
        self.max_retained_builder_capacity = bytes;
        self
    }
}
