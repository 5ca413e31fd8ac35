//! Partition error types.

use thiserror::Error;

/// Result type for partition operations.
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Result type for backing store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a backing store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not complete an I/O operation.
    #[error("I/O error during {operation}: {message}")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Error description.
        message: String,
    },

    /// The store holds data it cannot interpret.
    #[error("store corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl StoreError {
    /// Returns true if retrying the whole invocation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Errors that abort a whole processor invocation.
///
/// Per-element offer failures are not errors; they are reported in
/// [`crate::OfferResult::errors`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The backing store failed.
    #[error("backing store failure: {0}")]
    Store(#[from] StoreError),

    /// A request argument or limit was violated.
    #[error(transparent)]
    Invalid(#[from] folio_core::Error),

    /// Encoded entry data could not be decoded.
    #[error("corrupt entry data: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl PartitionError {
    /// Returns true if retrying the whole invocation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Invalid(_) | Self::Corruption { .. } => false,
        }
    }
}
