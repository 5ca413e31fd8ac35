//! Per-partition ownership state, as seen by one member.
//!
//! ```text
//! Unowned ─assign─► Assigned ─activate─► Owned ─depart─► Departing
//! Departing ─complete─► Unowned
//! Departing ─rollback─► Owned
//! Unowned | Assigned ─arrive | recover─► Owned
//! Unowned | Assigned | Owned ─lose─► Owned (empty)
//! ```

use std::fmt;

use folio_core::MemberId;

/// Ownership state of one partition on the local member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionState {
    /// Not owned; holds no data.
    #[default]
    Unowned,
    /// Ownership assigned during initial distribution; data not populated.
    Assigned,
    /// Owned; requests are served.
    Owned,
    /// Transfer-out in progress; requests are rejected until it settles.
    Departing {
        /// Member receiving the partition.
        to: MemberId,
    },
}

/// A requested ownership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Initial assignment by the coordinator.
    Assign,
    /// Start serving an assigned partition with empty data.
    Activate,
    /// Entries arrived from a peer or the local backup.
    Arrive,
    /// Entries restored from persistent storage.
    Recover,
    /// All copies lost; start over empty.
    Lose,
    /// Start transferring the partition out.
    Depart {
        /// Member receiving the partition.
        to: MemberId,
    },
    /// The transfer-out succeeded.
    CompleteDeparture,
    /// The transfer-out failed; keep ownership.
    Rollback,
}

impl Transition {
    /// Returns a short name for errors and logging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Activate => "activate",
            Self::Arrive => "arrive",
            Self::Recover => "recover",
            Self::Lose => "lose",
            Self::Depart { .. } => "depart",
            Self::CompleteDeparture => "complete_departure",
            Self::Rollback => "rollback",
        }
    }
}

impl PartitionState {
    /// Returns true if requests against the partition are served.
    #[must_use]
    pub const fn is_owned(self) -> bool {
        matches!(self, Self::Owned)
    }

    /// Returns the state reached by `transition`, or `None` if it is not
    /// allowed from this state.
    #[must_use]
    pub const fn apply(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (Self::Unowned, Transition::Assign) => Some(Self::Assigned),
            (Self::Assigned, Transition::Activate) => Some(Self::Owned),
            (
                Self::Unowned | Self::Assigned,
                Transition::Arrive | Transition::Recover,
            )
            | (Self::Unowned | Self::Assigned | Self::Owned, Transition::Lose)
            | (Self::Departing { .. }, Transition::Rollback) => Some(Self::Owned),
            (Self::Owned, Transition::Depart { to }) => Some(Self::Departing { to }),
            (Self::Departing { .. }, Transition::CompleteDeparture) => Some(Self::Unowned),
            _ => None,
        }
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unowned => write!(f, "unowned"),
            Self::Assigned => write!(f, "assigned"),
            Self::Owned => write!(f, "owned"),
            Self::Departing { to } => write!(f, "departing to {to}"),
        }
    }
}
