//! Partition events delivered to interceptors.
//!
//! Events are ephemeral: they borrow the entries they describe and exist
//! only for the duration of one dispatch. Nothing here is persisted.

use std::fmt;

use folio_core::{MemberId, PartitionId};
use folio_partition::{ChangeSet, PartitionSnapshot};

// -----------------------------------------------------------------------------
// Transfer Events
// -----------------------------------------------------------------------------

/// Kind of a partition transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferEventType {
    /// Ownership assigned during initial distribution; no data yet.
    Assigned,
    /// Entries landed locally, from a peer or from the local backup.
    Arrived,
    /// A transfer-out started; entries are locked until it settles.
    Departing,
    /// The transfer-out completed; local data was dropped.
    Departed,
    /// All copies were lost; the partition restarts empty.
    Lost,
    /// Entries were restored from persistent storage.
    Recovered,
    /// The transfer-out failed; local ownership continues unchanged.
    Rollback,
}

impl fmt::Display for TransferEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Assigned => "ASSIGNED",
            Self::Arrived => "ARRIVED",
            Self::Departing => "DEPARTING",
            Self::Departed => "DEPARTED",
            Self::Lost => "LOST",
            Self::Recovered => "RECOVERED",
            Self::Rollback => "ROLLBACK",
        };
        f.write_str(name)
    }
}

/// A change of partition ownership involving the local member.
#[derive(Debug, Clone, Copy)]
pub struct TransferEvent<'a> {
    /// Event kind.
    pub kind: TransferEventType,
    /// Partition being transferred.
    pub partition: PartitionId,
    /// The member raising the event.
    pub local_member: MemberId,
    /// The other side of the transfer, if any.
    pub remote_member: Option<MemberId>,
    /// Entries moved by the transfer, read-only.
    pub entries: Option<&'a PartitionSnapshot>,
}

impl<'a> TransferEvent<'a> {
    /// Creates an event without a remote member or entries.
    #[must_use]
    pub const fn new(kind: TransferEventType, partition: PartitionId, local_member: MemberId) -> Self {
        Self {
            kind,
            partition,
            local_member,
            remote_member: None,
            entries: None,
        }
    }

    /// Builder: set the remote member.
    #[must_use]
    pub const fn with_remote(mut self, remote: MemberId) -> Self {
        self.remote_member = Some(remote);
        self
    }

    /// Builder: attach the transferred entries.
    #[must_use]
    pub const fn with_entries(mut self, entries: &'a PartitionSnapshot) -> Self {
        self.entries = Some(entries);
        self
    }

    /// Returns true if arrived entries came from this member's own backup
    /// rather than from a peer.
    #[must_use]
    pub fn is_local_restore(&self) -> bool {
        self.kind == TransferEventType::Arrived && self.remote_member == Some(self.local_member)
    }
}

// -----------------------------------------------------------------------------
// Transaction Events
// -----------------------------------------------------------------------------

/// Kind of a transaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionEventType {
    /// Entries are about to be applied; they may still be changed, and an
    /// interceptor error cancels the mutation.
    Committing,
    /// Entries were applied; observation only.
    Committed,
}

/// All entries written by one partition-bound request.
#[derive(Debug)]
pub enum TransactionEvent<'a> {
    /// Before apply; entries are mutable and the partition lock is held.
    Committing {
        /// Target partition.
        partition: PartitionId,
        /// Pending writes.
        entries: &'a mut ChangeSet,
    },
    /// After apply; entries are immutable.
    Committed {
        /// Target partition.
        partition: PartitionId,
        /// Applied writes.
        entries: &'a ChangeSet,
    },
}

impl TransactionEvent<'_> {
    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> TransactionEventType {
        match self {
            Self::Committing { .. } => TransactionEventType::Committing,
            Self::Committed { .. } => TransactionEventType::Committed,
        }
    }

    /// Returns the target partition.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        match self {
            Self::Committing { partition, .. } | Self::Committed { partition, .. } => *partition,
        }
    }

    /// Returns the entries, read-only.
    #[must_use]
    pub fn entries(&self) -> &ChangeSet {
        match self {
            Self::Committing { entries, .. } => &**entries,
            Self::Committed { entries, .. } => *entries,
        }
    }

    /// Returns the entries for modification; `None` once committed.
    pub fn entries_mut(&mut self) -> Option<&mut ChangeSet> {
        match self {
            Self::Committing { entries, .. } => Some(&mut **entries),
            Self::Committed { .. } => None,
        }
    }
}

// -----------------------------------------------------------------------------
// Unsolicited Commit Events
// -----------------------------------------------------------------------------

/// Kind of an unsolicited commit event. There is only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsolicitedCommitEventType {
    /// Entries were changed; observation only.
    Committed,
}

/// Entries changed by something other than a request, such as eviction.
#[derive(Debug, Clone, Copy)]
pub struct UnsolicitedCommitEvent<'a> {
    /// Affected partition.
    pub partition: PartitionId,
    /// Applied writes.
    pub entries: &'a ChangeSet,
}

impl UnsolicitedCommitEvent<'_> {
    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> UnsolicitedCommitEventType {
        UnsolicitedCommitEventType::Committed
    }
}
