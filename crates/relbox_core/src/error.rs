//! Error types for relbox core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in relbox core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Flat table codec error.
    #[error("codec error: {0}")]
    Codec(#[from] relbox_codec::CodecError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Store(#[from] relbox_store::StoreError),

    /// A relation change needs an id that one of the participants lacks.
    #[error("cannot relate unsaved entities: {message}")]
    CannotRelateUnsavedEntities {
        /// Which participant is missing its id.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of the violated precondition.
        message: String,
    },

    /// An argument is outside the accepted range.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,
}

impl CoreError {
    /// Creates a cannot-relate-unsaved-entities error.
    pub fn cannot_relate(message: impl Into<String>) -> Self {
        Self::CannotRelateUnsavedEntities {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }
}
