//! Partition commands and their single dispatch point.

use crate::error::PartitionResult;
use crate::initialise::{initialise, InitialiseResult};
use crate::offer::{offer, OfferRequest, OfferResult};
use crate::poll::{poll, PollRequest, PollResult};
use crate::retention::{compact, CompactResult};
use crate::subscription::{
    subscribe, unsubscribe, SubscribeRequest, SubscribeResult, UnsubscribeRequest,
    UnsubscribeResult,
};
use crate::tail::{advance_tail, TailAdvanceRequest, TailAdvanceResult};
use crate::txn::PartitionTxn;

/// An operation against one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ensure usage metadata exists.
    Initialise,
    /// Advance the publication tail.
    TailAdvance(TailAdvanceRequest),
    /// Append elements.
    Offer(OfferRequest),
    /// Consume elements for a subscriber group.
    Poll(PollRequest),
    /// Register a subscriber group.
    Subscribe(SubscribeRequest),
    /// Remove a subscriber group.
    Unsubscribe(UnsubscribeRequest),
    /// Remove consumed pages.
    Compact,
}

impl Command {
    /// Returns a short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Initialise => "initialise",
            Self::TailAdvance(_) => "tail_advance",
            Self::Offer(_) => "offer",
            Self::Poll(_) => "poll",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Compact => "compact",
        }
    }
}

/// The result of a [`Command`], one variant per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Result of [`Command::Initialise`].
    Initialised(InitialiseResult),
    /// Result of [`Command::TailAdvance`].
    TailAdvanced(TailAdvanceResult),
    /// Result of [`Command::Offer`].
    Offered(OfferResult),
    /// Result of [`Command::Poll`].
    Polled(PollResult),
    /// Result of [`Command::Subscribe`].
    Subscribed(SubscribeResult),
    /// Result of [`Command::Unsubscribe`].
    Unsubscribed(UnsubscribeResult),
    /// Result of [`Command::Compact`].
    Compacted(CompactResult),
}

/// Runs a command inside a transaction.
///
/// # Errors
/// Returns an error if the command is invalid or the backing store fails.
/// The transaction's writes must then be discarded.
pub fn execute(txn: &mut PartitionTxn<'_>, command: &Command) -> PartitionResult<CommandResult> {
    match command {
        Command::Initialise => initialise(txn).map(CommandResult::Initialised),
        Command::TailAdvance(request) => {
            advance_tail(txn, *request).map(CommandResult::TailAdvanced)
        }
        Command::Offer(request) => offer(txn, request).map(CommandResult::Offered),
        Command::Poll(request) => poll(txn, *request).map(CommandResult::Polled),
        Command::Subscribe(request) => subscribe(txn, *request).map(CommandResult::Subscribed),
        Command::Unsubscribe(request) => {
            unsubscribe(txn, *request).map(CommandResult::Unsubscribed)
        }
        Command::Compact => compact(txn).map(CommandResult::Compacted),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use folio_core::{Limits, PageId, PartitionId, TopicConfig};

    use super::*;
    use crate::store::{MemoryStore, SimulatedStore};
    use crate::txn::PartitionStore;

    #[test]
    fn test_command_names() {
        assert_eq!(Command::Initialise.name(), "initialise");
        assert_eq!(Command::Compact.name(), "compact");
        assert_eq!(
            Command::TailAdvance(TailAdvanceRequest::new(PageId::new(1))).name(),
            "tail_advance"
        );
    }

    #[test]
    fn test_prepare_does_not_apply() {
        let store = PartitionStore::new(
            PartitionId::new(0),
            Arc::new(TopicConfig::new("t")),
            Limits::new(),
            Box::new(MemoryStore::new()),
        );
        let (result, changes) = store.prepare(&Command::Initialise).unwrap();
        assert!(matches!(
            result,
            CommandResult::Initialised(InitialiseResult { created: true, .. })
        ));
        assert_eq!(changes.len(), 1);
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_aborts_invocation() {
        let backing = SimulatedStore::new(1);
        let mut store = PartitionStore::new(
            PartitionId::new(0),
            Arc::new(TopicConfig::new("t")),
            Limits::new(),
            Box::new(backing.clone()),
        );

        backing.fault_config().force_apply_fail = true;
        let err = store.invoke(&Command::Initialise).unwrap_err();
        assert!(err.is_retryable());
        assert!(backing.committed().is_empty());

        // A plain retry succeeds.
        store.invoke(&Command::Initialise).unwrap();
        assert!(backing.committed().usage.is_some());
    }
}
