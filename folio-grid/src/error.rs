//! Grid error types.

use folio_core::{MemberId, PartitionId};
use folio_partition::PartitionError;
use thiserror::Error;

use crate::ownership::PartitionState;

/// Result type for grid operations.
pub type GridResult<T> = Result<T, GridError>;

/// Errors surfaced to callers of a member.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// The partition is not owned by this member.
    #[error("partition {partition} not owned locally (state: {state})")]
    NotOwned {
        /// Target partition.
        partition: PartitionId,
        /// Local ownership state.
        state: PartitionState,
    },

    /// The partition is being transferred out.
    #[error("partition {partition} is transferring to {to}")]
    TransferInProgress {
        /// Target partition.
        partition: PartitionId,
        /// Receiving member.
        to: MemberId,
    },

    /// A COMMITTING interceptor vetoed the mutation.
    #[error("aborted by interceptor '{interceptor}': {reason}")]
    Aborted {
        /// Interceptor name.
        interceptor: String,
        /// Reason it gave.
        reason: String,
    },

    /// The requested ownership change is not allowed from the current state.
    #[error("invalid transition '{transition}' for partition {partition} in state {from}")]
    InvalidTransition {
        /// Target partition.
        partition: PartitionId,
        /// Current state.
        from: PartitionState,
        /// Requested transition.
        transition: &'static str,
    },

    /// An interceptor with this name is already registered.
    #[error("interceptor '{name}' already registered")]
    DuplicateInterceptor {
        /// Interceptor name.
        name: String,
    },

    /// The partition processor failed.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// The invocation service has shut down.
    #[error("invocation service has shut down")]
    ServiceShutdown,
}

impl GridError {
    /// Returns true if retrying the whole invocation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NotOwned { .. } | Self::TransferInProgress { .. } => true,
            Self::Partition(e) => e.is_retryable(),
            Self::Aborted { .. }
            | Self::InvalidTransition { .. }
            | Self::DuplicateInterceptor { .. }
            | Self::ServiceShutdown => false,
        }
    }
}
