//! Topic initialisation.

use folio_core::Position;
use tracing::debug;

use crate::error::PartitionResult;
use crate::model::Usage;
use crate::txn::PartitionTxn;

/// Outcome of initialising a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialiseResult {
    /// Publication tail after the call.
    pub publication_tail: Position,
    /// True if this call created the usage entry.
    pub created: bool,
}

/// Ensures the partition's usage entry exists.
///
/// Running it against an initialised partition is a no-op that reports the
/// existing tail.
///
/// # Errors
/// Returns an error if the backing store fails.
pub fn initialise(txn: &mut PartitionTxn<'_>) -> PartitionResult<InitialiseResult> {
    let (usage, created) = load_or_create_usage(txn)?;
    Ok(InitialiseResult {
        publication_tail: usage.publication_tail,
        created,
    })
}

/// Reads the usage entry, creating it (and enlisting the write) if absent.
pub(crate) fn load_or_create_usage(txn: &mut PartitionTxn<'_>) -> PartitionResult<(Usage, bool)> {
    if let Some(usage) = txn.usage()? {
        return Ok((usage, false));
    }

    let usage = Usage::new();
    debug!(partition = %txn.partition(), "initialised partition usage");
    txn.put_usage(usage.clone());
    Ok((usage, true))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use folio_core::{Limits, PartitionId, TopicConfig};

    use super::*;
    use crate::store::MemoryStore;
    use crate::txn::PartitionStore;

    fn store() -> PartitionStore {
        PartitionStore::new(
            PartitionId::new(1),
            Arc::new(TopicConfig::new("t")),
            Limits::new(),
            Box::new(MemoryStore::new()),
        )
    }

    #[test]
    fn test_initialise_creates_usage() {
        let store = store();
        let mut txn = store.begin();
        let result = initialise(&mut txn).unwrap();

        assert!(result.created);
        assert_eq!(result.publication_tail, Position::origin());
        let usage = txn.usage().unwrap().unwrap();
        assert!(usage.subscribers.is_empty());
        assert!(usage.partition_head.is_none());
    }

    #[test]
    fn test_initialise_is_idempotent() {
        let mut store = store();
        let (_, changes) = {
            let mut txn = store.begin();
            let result = initialise(&mut txn).unwrap();
            (result, txn.into_changes())
        };
        store.apply(&changes).unwrap();

        let mut txn = store.begin();
        let again = initialise(&mut txn).unwrap();
        assert!(!again.created);
        assert!(txn.changes().is_empty());
    }
}
