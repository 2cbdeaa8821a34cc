//! Error types for storage operations.

use relbox_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another thread holds the write transaction.
    #[error("a write transaction is already in progress")]
    WriteInProgress,

    /// A mutation was attempted outside of a write transaction owned by the
    /// calling thread.
    #[error("no write transaction active on this thread")]
    NoWriteTransaction,

    /// A snapshot file could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Stored data is inconsistent.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A stored record could not be decoded while scanning.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl StoreError {
    /// Create a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }

    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
