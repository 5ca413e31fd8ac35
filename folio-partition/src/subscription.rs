//! Subscriber group registration and head bookkeeping.
//!
//! A group's head lives in the partition's usage entry; the page it sits on
//! counts it in `reference_count`. Every head movement goes through
//! [`move_head`] so the two stay in step.

use folio_core::{Position, SubscriberGroupId};
use tracing::debug;

use crate::error::PartitionResult;
use crate::initialise::load_or_create_usage;
use crate::model::Usage;
use crate::txn::PartitionTxn;

/// Where a newly subscribed group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriberStart {
    /// The earliest element still stored.
    #[default]
    Earliest,
    /// The current publication tail; only elements offered later are seen.
    Latest,
}

/// Request to register a subscriber group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Group to register.
    pub group: SubscriberGroupId,
    /// Starting position for a new registration.
    pub start: SubscriberStart,
}

/// Outcome of a subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeResult {
    /// Head of the group after the call.
    pub head: Position,
    /// True if this call registered the group.
    pub created: bool,
}

/// Request to remove a subscriber group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeRequest {
    /// Group to remove.
    pub group: SubscriberGroupId,
}

/// Outcome of an unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeResult {
    /// Head the group had, if it was registered.
    pub removed: Option<Position>,
}

/// Registers a group. An existing registration is left unchanged.
///
/// # Errors
/// Returns an error if the group limit is reached or the store fails.
pub fn subscribe(
    txn: &mut PartitionTxn<'_>,
    request: SubscribeRequest,
) -> PartitionResult<SubscribeResult> {
    let (mut usage, _) = load_or_create_usage(txn)?;
    if let Some(head) = usage.subscribers.get(&request.group) {
        return Ok(SubscribeResult {
            head: *head,
            created: false,
        });
    }

    let head = match request.start {
        SubscriberStart::Earliest => usage.earliest(),
        SubscriberStart::Latest => usage.publication_tail,
    };
    attach_head(txn, &mut usage, request.group, head)?;
    txn.put_usage(usage);

    Ok(SubscribeResult {
        head,
        created: true,
    })
}

/// Removes a group and detaches it from its page.
///
/// # Errors
/// Returns an error if the backing store fails.
pub fn unsubscribe(
    txn: &mut PartitionTxn<'_>,
    request: UnsubscribeRequest,
) -> PartitionResult<UnsubscribeResult> {
    let Some(mut usage) = txn.usage()? else {
        return Ok(UnsubscribeResult { removed: None });
    };
    let Some(head) = usage.subscribers.remove(&request.group) else {
        return Ok(UnsubscribeResult { removed: None });
    };

    if let Some(mut page) = txn.page(head.page)? {
        page.reference_count = page.reference_count.saturating_sub(1);
        txn.put_page(head.page, page);
    }
    txn.put_usage(usage);
    debug!(partition = %txn.partition(), group = %request.group, "unsubscribed");

    Ok(UnsubscribeResult {
        removed: Some(head),
    })
}

/// Adds a group at `head`.
pub(crate) fn attach_head(
    txn: &mut PartitionTxn<'_>,
    usage: &mut Usage,
    group: SubscriberGroupId,
    head: Position,
) -> PartitionResult<()> {
    let max = txn.limits().max_subscriber_groups;
    if usage.subscribers.len() >= max as usize {
        return Err(folio_core::Error::LimitExceeded {
            limit: "subscriber_groups",
            max: u64::from(max),
            actual: usage.subscribers.len() as u64 + 1,
        }
        .into());
    }

    // Precondition: heads never run ahead of the tail.
    debug_assert!(head <= usage.publication_tail);

    usage.subscribers.insert(group, head);
    if let Some(mut page) = txn.page(head.page)? {
        page.reference_count += 1;
        txn.put_page(head.page, page);
    }
    debug!(partition = %txn.partition(), group = %group, head = %head, "subscribed");
    Ok(())
}

/// Moves a registered group's head, keeping page references in step.
pub(crate) fn move_head(
    txn: &mut PartitionTxn<'_>,
    usage: &mut Usage,
    group: SubscriberGroupId,
    to: Position,
) -> PartitionResult<()> {
    let Some(from) = usage.subscribers.insert(group, to) else {
        return Ok(());
    };
    if from.page == to.page {
        return Ok(());
    }

    if let Some(mut page) = txn.page(from.page)? {
        page.reference_count = page.reference_count.saturating_sub(1);
        txn.put_page(from.page, page);
    }
    if let Some(mut page) = txn.page(to.page)? {
        page.reference_count += 1;
        txn.put_page(to.page, page);
    }
    Ok(())
}
