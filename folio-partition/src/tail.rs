//! Publication tail advancement.
//!
//! Moves the publication tail of a partition forward to the start of a
//! given page without touching page content. The operation is a
//! `max` merge, so it is idempotent and commutative: any number of calls in
//! any order leave the tail at the largest requested page.

use folio_core::{PageId, Position};
use tracing::debug;

use crate::error::PartitionResult;
use crate::initialise::load_or_create_usage;
use crate::txn::PartitionTxn;

/// Request to advance the publication tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailAdvanceRequest {
    /// Page the tail should reach at least.
    pub new_tail: PageId,
}

impl TailAdvanceRequest {
    /// Creates a request.
    #[must_use]
    pub const fn new(new_tail: PageId) -> Self {
        Self { new_tail }
    }
}

/// Outcome of a tail advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailAdvanceResult {
    /// Tail page after the call, possibly unchanged.
    pub new_tail: PageId,
}

/// Sets the publication tail to `max(current, (new_tail, 0))`.
///
/// When the tail moves to a later page, the previous tail page is sealed so
/// that it accepts no further offers.
///
/// # Errors
/// Returns an error if the backing store fails.
pub fn advance_tail(
    txn: &mut PartitionTxn<'_>,
    request: TailAdvanceRequest,
) -> PartitionResult<TailAdvanceResult> {
    let (mut usage, _) = load_or_create_usage(txn)?;
    let current = usage.publication_tail;
    let target = Position::page_start(request.new_tail);

    if target <= current {
        return Ok(TailAdvanceResult {
            new_tail: current.page,
        });
    }

    // A target at offset 0 beyond the current tail is always on a later page.
    debug_assert!(target.page > current.page);

    if let Some(mut page) = txn.page(current.page)? {
        if !page.sealed {
            page.sealed = true;
            txn.put_page(current.page, page);
            debug!(
                partition = %txn.partition(),
                page = current.page.get(),
                "sealed page on tail advance"
            );
        }
    }

    usage.publication_tail = target;
    txn.put_usage(usage);

    Ok(TailAdvanceResult {
        new_tail: target.page,
    })
}
