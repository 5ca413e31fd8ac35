//! Event interceptors and their registry.
//!
//! Interceptors are registered by name when a member is built and are
//! invoked synchronously, in registration order, while the partition lock
//! is held. Only a COMMITTING interceptor can affect the outcome: its error
//! cancels the mutation. Errors from every other event are logged and
//! otherwise ignored.

use std::fmt;
use std::sync::Arc;

use folio_core::PartitionId;
use folio_partition::ChangeSet;
use thiserror::Error;
use tracing::warn;

use crate::error::{GridError, GridResult};
use crate::event::{TransactionEvent, TransferEvent, UnsolicitedCommitEvent};

/// Refusal returned by an interceptor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct Abort {
    /// Why the interceptor refused.
    pub reason: String,
}

impl Abort {
    /// Creates an abort with a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Observer of partition events.
///
/// All methods default to accepting the event.
pub trait Interceptor: Send + Sync {
    /// Called with COMMITTING and COMMITTED transaction events.
    ///
    /// # Errors
    /// An error on COMMITTING aborts the mutation; on COMMITTED it is logged.
    fn on_transaction(&self, event: &mut TransactionEvent<'_>) -> Result<(), Abort> {
        let _ = event;
        Ok(())
    }

    /// Called with transfer events.
    ///
    /// # Errors
    /// Errors are logged only.
    fn on_transfer(&self, event: &TransferEvent<'_>) -> Result<(), Abort> {
        let _ = event;
        Ok(())
    }

    /// Called with unsolicited commit events.
    ///
    /// # Errors
    /// Errors are logged only.
    fn on_unsolicited_commit(&self, event: &UnsolicitedCommitEvent<'_>) -> Result<(), Abort> {
        let _ = event;
        Ok(())
    }
}

/// Ordered list of named interceptors.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    entries: Vec<(String, Arc<dyn Interceptor>)>,
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl InterceptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor.
    ///
    /// # Errors
    /// Returns an error if the name is already registered.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        interceptor: Arc<dyn Interceptor>,
    ) -> GridResult<()> {
        let name = name.into();
        if self.entries.iter().any(|(existing, _)| *existing == name) {
            return Err(GridError::DuplicateInterceptor { name });
        }
        self.entries.push((name, interceptor));
        Ok(())
    }

    /// Builder form of [`Self::register`].
    ///
    /// # Errors
    /// Returns an error if the name is already registered.
    pub fn with(
        mut self,
        name: impl Into<String>,
        interceptor: Arc<dyn Interceptor>,
    ) -> GridResult<Self> {
        self.register(name, interceptor)?;
        Ok(self)
    }

    /// Removes an interceptor by name. Returns true if it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != name);
        self.entries.len() != before
    }

    /// Returns registered names in invocation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Returns the number of interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no interceptor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatches COMMITTING. The first refusal stops dispatch and aborts.
    ///
    /// # Errors
    /// Returns `Aborted` naming the interceptor that refused.
    pub fn dispatch_committing(
        &self,
        partition: PartitionId,
        entries: &mut ChangeSet,
    ) -> GridResult<()> {
        for (name, interceptor) in &self.entries {
            let mut event = TransactionEvent::Committing {
                partition,
                entries: &mut *entries,
            };
            if let Err(abort) = interceptor.on_transaction(&mut event) {
                return Err(GridError::Aborted {
                    interceptor: name.clone(),
                    reason: abort.reason,
                });
            }
        }
        Ok(())
    }

    /// Dispatches COMMITTED. Refusals are logged.
    pub fn dispatch_committed(&self, partition: PartitionId, entries: &ChangeSet) {
        for (name, interceptor) in &self.entries {
            let mut event = TransactionEvent::Committed { partition, entries };
            if let Err(abort) = interceptor.on_transaction(&mut event) {
                warn!(
                    interceptor = %name,
                    partition = %partition,
                    reason = %abort.reason,
                    "interceptor failed on COMMITTED event"
                );
            }
        }
    }

    /// Dispatches a transfer event. Refusals are logged.
    pub fn dispatch_transfer(&self, event: &TransferEvent<'_>) {
        for (name, interceptor) in &self.entries {
            if let Err(abort) = interceptor.on_transfer(event) {
                warn!(
                    interceptor = %name,
                    partition = %event.partition,
                    kind = %event.kind,
                    reason = %abort.reason,
                    "interceptor failed on transfer event"
                );
            }
        }
    }

    /// Dispatches an unsolicited commit event. Refusals are logged.
    pub fn dispatch_unsolicited(&self, event: &UnsolicitedCommitEvent<'_>) {
        for (name, interceptor) in &self.entries {
            if let Err(abort) = interceptor.on_unsolicited_commit(event) {
                warn!(
                    interceptor = %name,
                    partition = %event.partition,
                    reason = %abort.reason,
                    "interceptor failed on unsolicited commit event"
                );
            }
        }
    }
}
