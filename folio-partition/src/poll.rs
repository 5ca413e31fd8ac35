//! Poll processor: the read path.
//!
//! Returns up to N elements from a subscriber group's head and advances the
//! head in the same transaction. A caller that supplies the head it last
//! saw can retry freely: once the head has moved, a retry reports
//! `AlreadyApplied` instead of draining again.

use folio_core::{PageId, Position, SubscriberGroupId};
use tracing::{debug, warn};

use crate::error::PartitionResult;
use crate::initialise::load_or_create_usage;
use crate::model::{Element, Usage};
use crate::subscription::{attach_head, move_head};
use crate::txn::PartitionTxn;

/// Request to consume elements for a subscriber group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRequest {
    /// Consuming group.
    pub group: SubscriberGroupId,
    /// Head position the caller last observed.
    pub expected: Option<Position>,
    /// Maximum number of elements to return.
    pub max_elements: u32,
}

impl PollRequest {
    /// Creates a request without an expected head.
    #[must_use]
    pub const fn new(group: SubscriberGroupId, max_elements: u32) -> Self {
        Self {
            group,
            expected: None,
            max_elements,
        }
    }

    /// Builder: set the head the caller last observed.
    #[must_use]
    pub const fn with_expected(mut self, expected: Position) -> Self {
        self.expected = Some(expected);
        self
    }
}

/// Outcome category of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Elements (possibly none) were drained from the caller's head.
    Delivered,
    /// The stored head differs from the caller's expected head; nothing was
    /// drained and `next_index` is the stored head.
    AlreadyApplied,
    /// The stored head referenced data that no longer exists. The head was
    /// moved to `resumed_at`; poll again from there.
    PositionSkew {
        /// Earliest available position the head now points at.
        resumed_at: Position,
    },
}

/// Outcome of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    /// Outcome category.
    pub status: PollStatus,
    /// Consumed elements, in partition order.
    pub elements: Vec<Element>,
    /// Elements between the new head and the publication tail.
    pub remaining_element_count: u64,
    /// Head to resume from.
    pub next_index: Position,
}

/// Drains elements from the group's head.
///
/// # Errors
/// Returns an error if `max_elements` is zero, the group limit is reached
/// while registering a new group, or the backing store fails.
pub fn poll(txn: &mut PartitionTxn<'_>, request: PollRequest) -> PartitionResult<PollResult> {
    if request.max_elements == 0 {
        return Err(folio_core::Error::InvalidArgument {
            name: "max_elements",
            reason: "must be positive",
        }
        .into());
    }

    let config = txn.config();
    let max_elements = request.max_elements.min(txn.limits().max_poll_elements) as usize;

    let (mut usage, _) = load_or_create_usage(txn)?;
    let stored = match usage.subscribers.get(&request.group) {
        Some(head) => *head,
        None => {
            let head = usage.earliest();
            attach_head(txn, &mut usage, request.group, head)?;
            txn.put_usage(usage.clone());
            head
        }
    };

    if let Some(expected) = request.expected {
        if expected != stored {
            debug!(
                partition = %txn.partition(),
                group = %request.group,
                expected = %expected,
                stored = %stored,
                "poll already applied"
            );
            return Ok(PollResult {
                status: PollStatus::AlreadyApplied,
                elements: Vec::new(),
                remaining_element_count: count_remaining(txn, &usage, stored)?,
                next_index: stored,
            });
        }
    }

    let head = match resolve_head(txn, &usage, stored)? {
        HeadState::Ready(head) => head,
        HeadState::Skewed(resumed_at) => {
            warn!(
                partition = %txn.partition(),
                group = %request.group,
                stored = %stored,
                resumed_at = %resumed_at,
                "subscriber head references removed data"
            );
            move_head(txn, &mut usage, request.group, resumed_at)?;
            let remaining = count_remaining(txn, &usage, resumed_at)?;
            txn.put_usage(usage);
            return Ok(PollResult {
                status: PollStatus::PositionSkew { resumed_at },
                elements: Vec::new(),
                remaining_element_count: remaining,
                next_index: resumed_at,
            });
        }
    };

    let mut elements = Vec::new();
    let mut bytes: u64 = 0;
    let mut position = head;

    while elements.len() < max_elements && bytes < config.max_poll_bytes {
        if position >= usage.publication_tail {
            break;
        }
        let Some(page) = txn.page(position.page)? else {
            break;
        };
        if position.offset >= page.tail {
            match page.next_page {
                Some(next) if page.sealed => {
                    position = Position::page_start(next);
                    continue;
                }
                // Last page, sealed by a tail advance: wait at the tail.
                None if page.sealed => {
                    position = usage.publication_tail;
                    break;
                }
                _ => break,
            }
        }
        // Evicted elements leave a hole; skip it.
        if let Some(value) = txn.element(position)? {
            bytes += value.len() as u64;
            elements.push(Element::new(position, value));
        }
        position = position.next_offset();
    }

    if position != stored {
        move_head(txn, &mut usage, request.group, position)?;
        txn.put_usage(usage.clone());
    }

    // Postcondition: the head never passes the tail.
    debug_assert!(position <= usage.publication_tail || elements.is_empty());

    Ok(PollResult {
        status: PollStatus::Delivered,
        remaining_element_count: count_remaining(txn, &usage, position)?,
        elements,
        next_index: position,
    })
}

enum HeadState {
    Ready(Position),
    Skewed(Position),
}

/// Checks that the head still points at stored data.
///
/// A head below the first existing page was overtaken by retention and is
/// skewed. A head on a page that was never created (skipped by a tail
/// advance) moves forward to the next existing page without loss.
fn resolve_head(
    txn: &PartitionTxn<'_>,
    usage: &Usage,
    head: Position,
) -> PartitionResult<HeadState> {
    let removed = match usage.partition_head {
        Some(first) => head.page < first,
        None => usage.partition_max.is_some_and(|max| head.page <= max),
    };
    if removed {
        return Ok(HeadState::Skewed(usage.earliest()));
    }

    if txn.page(head.page)?.is_some() {
        return Ok(HeadState::Ready(head));
    }

    Ok(match first_page_after(txn, usage, head.page)? {
        Some(next) => HeadState::Ready(Position::page_start(next)),
        None => HeadState::Ready(head),
    })
}

/// Finds the first existing page with an id above `page`.
fn first_page_after(
    txn: &PartitionTxn<'_>,
    usage: &Usage,
    page: PageId,
) -> PartitionResult<Option<PageId>> {
    let mut cursor = usage.partition_head;
    while let Some(id) = cursor {
        if id > page {
            return Ok(Some(id));
        }
        cursor = txn.page(id)?.and_then(|p| p.next_page);
    }
    Ok(None)
}

/// Counts stored elements between `from` and the publication tail.
pub(crate) fn count_remaining(
    txn: &PartitionTxn<'_>,
    usage: &Usage,
    from: Position,
) -> PartitionResult<u64> {
    let mut count: u64 = 0;
    let mut position = from;
    while position < usage.publication_tail {
        let Some(page) = txn.page(position.page)? else {
            break;
        };
        let span = page.tail.saturating_sub(position.offset);
        count += if page.evicted == 0 {
            u64::from(span)
        } else if position.offset == 0 {
            u64::from(span.saturating_sub(page.evicted))
        } else {
            // Holes may sit behind the head; look at each slot.
            let mut live = 0;
            for offset in position.offset..page.tail {
                if txn.element(Position::new(position.page, offset))?.is_some() {
                    live += 1;
                }
            }
            live
        };
        match page.next_page {
            Some(next) if page.sealed => position = Position::page_start(next),
            _ => break,
        }
    }
    Ok(count)
}
