//! Invariant checkers over partition state.
//!
//! Checkers inspect a [`PartitionSnapshot`] (or a delivery log) and return
//! every violation found, so a failing seed reports all broken invariants at
//! once.

use std::collections::BTreeSet;
use std::fmt;

use folio_core::{PageId, Position, SubscriberGroupId};
use folio_partition::PartitionSnapshot;

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violated partition invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Entries exist but the usage entry does not.
    MissingUsage,
    /// The publication tail moved backwards.
    TailRegressed {
        /// Tail before the operation.
        before: Position,
        /// Tail after the operation.
        after: Position,
    },
    /// A subscriber head is past the publication tail.
    HeadBeyondTail {
        /// Offending group.
        group: SubscriberGroupId,
        /// Its head.
        head: Position,
        /// The publication tail.
        tail: Position,
    },
    /// A page's reference count differs from the heads on it.
    ReferenceCountMismatch {
        /// Page.
        page: PageId,
        /// Count stored on the page.
        stored: u32,
        /// Heads actually on the page.
        heads: u32,
    },
    /// Recorded stored bytes differ from the element payloads.
    StoredBytesMismatch {
        /// Value in the usage entry.
        recorded: u64,
        /// Sum of element payload lengths.
        actual: u64,
    },
    /// An element sits beyond its page's tail, or on a missing page.
    OrphanElement {
        /// Element position.
        position: Position,
    },
    /// A page linked to a successor is not sealed.
    UnsealedInteriorPage {
        /// Page.
        page: PageId,
    },
    /// An element was delivered more than once.
    DuplicateDelivery {
        /// Element position.
        position: Position,
    },
    /// An offered element was never delivered.
    MissedDelivery {
        /// Element position.
        position: Position,
    },
    /// Elements were delivered out of offer order.
    OutOfOrderDelivery {
        /// Position delivered first.
        earlier: Position,
        /// Position delivered after it.
        later: Position,
    },
}

impl fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingUsage => write!(f, "entries present without a usage entry"),
            Self::TailRegressed { before, after } => {
                write!(f, "publication tail regressed from {before} to {after}")
            }
            Self::HeadBeyondTail { group, head, tail } => {
                write!(f, "{group} head {head} is beyond tail {tail}")
            }
            Self::ReferenceCountMismatch { page, stored, heads } => {
                write!(f, "{page} reference count {stored} but {heads} heads on it")
            }
            Self::StoredBytesMismatch { recorded, actual } => {
                write!(f, "stored bytes recorded as {recorded}, actual {actual}")
            }
            Self::OrphanElement { position } => write!(f, "orphan element at {position}"),
            Self::UnsealedInteriorPage { page } => write!(f, "{page} has a successor but is open"),
            Self::DuplicateDelivery { position } => write!(f, "{position} delivered twice"),
            Self::MissedDelivery { position } => write!(f, "{position} never delivered"),
            Self::OutOfOrderDelivery { earlier, later } => {
                write!(f, "{earlier} delivered before {later}")
            }
        }
    }
}

// ============================================================================
// Checkers
// ============================================================================

/// Checks structural invariants of one partition.
#[must_use]
pub fn check_partition(snapshot: &PartitionSnapshot) -> Vec<PropertyViolation> {
    let mut violations = Vec::new();

    let Some(usage) = &snapshot.usage else {
        if !snapshot.is_empty() {
            violations.push(PropertyViolation::MissingUsage);
        }
        return violations;
    };

    for (group, head) in &usage.subscribers {
        if *head > usage.publication_tail {
            violations.push(PropertyViolation::HeadBeyondTail {
                group: *group,
                head: *head,
                tail: usage.publication_tail,
            });
        }
    }

    for (id, page) in &snapshot.pages {
        let heads = usage.references_to(*id);
        if page.reference_count != heads {
            violations.push(PropertyViolation::ReferenceCountMismatch {
                page: *id,
                stored: page.reference_count,
                heads,
            });
        }
        if page.next_page.is_some() && !page.sealed {
            violations.push(PropertyViolation::UnsealedInteriorPage { page: *id });
        }
    }

    let mut actual: u64 = 0;
    for (position, value) in &snapshot.elements {
        actual += value.len() as u64;
        let in_page = snapshot
            .pages
            .get(&position.page)
            .is_some_and(|page| position.offset < page.tail);
        if !in_page {
            violations.push(PropertyViolation::OrphanElement {
                position: *position,
            });
        }
    }
    if actual != usage.stored_bytes {
        violations.push(PropertyViolation::StoredBytesMismatch {
            recorded: usage.stored_bytes,
            actual,
        });
    }

    violations
}

/// Checks that the publication tail did not move backwards.
#[must_use]
pub fn check_tail_monotonic(before: Position, after: Position) -> Option<PropertyViolation> {
    (after < before).then_some(PropertyViolation::TailRegressed { before, after })
}

/// Checks that `delivered` contains every `offered` position exactly once,
/// in offer order.
#[must_use]
pub fn check_exactly_once(offered: &[Position], delivered: &[Position]) -> Vec<PropertyViolation> {
    let mut violations = Vec::new();

    let mut seen = BTreeSet::new();
    for position in delivered {
        if !seen.insert(*position) {
            violations.push(PropertyViolation::DuplicateDelivery {
                position: *position,
            });
        }
    }
    for pair in delivered.windows(2) {
        if pair[1] <= pair[0] {
            violations.push(PropertyViolation::OutOfOrderDelivery {
                earlier: pair[0],
                later: pair[1],
            });
        }
    }
    for position in offered {
        if !seen.contains(position) {
            violations.push(PropertyViolation::MissedDelivery {
                position: *position,
            });
        }
    }

    violations
}

/// Panics with every violation if any were found.
///
/// # Panics
///
/// Panics if `violations` is not empty.
pub fn assert_no_violations(context: &str, violations: &[PropertyViolation]) {
    if violations.is_empty() {
        return;
    }
    let listed: Vec<String> = violations.iter().map(ToString::to_string).collect();
    panic!("{context}: {} violation(s):\n  {}", listed.len(), listed.join("\n  "));
}
