//! Retention: removal of consumed pages and evicted elements.

use std::collections::BTreeMap;

use folio_core::{PageId, Position};
use tracing::debug;

use crate::error::PartitionResult;
use crate::txn::PartitionTxn;

/// Outcome of a compaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompactResult {
    /// Pages removed, in ascending order.
    pub removed_pages: Vec<PageId>,
    /// First page still stored afterwards.
    pub partition_head: Option<PageId>,
}

/// Removes sealed pages every subscriber group has moved past.
///
/// With no groups registered, every sealed page below the publication tail
/// page is eligible. Nothing is removed when the topic retains consumed
/// pages.
///
/// # Errors
/// Returns an error if the backing store fails.
pub fn compact(txn: &mut PartitionTxn<'_>) -> PartitionResult<CompactResult> {
    let Some(mut usage) = txn.usage()? else {
        return Ok(CompactResult::default());
    };
    if txn.config().retain_consumed {
        return Ok(CompactResult {
            removed_pages: Vec::new(),
            partition_head: usage.partition_head,
        });
    }

    let limit = usage
        .min_subscriber_page()
        .unwrap_or(usage.publication_tail.page)
        .min(usage.publication_tail.page);

    let mut removed = Vec::new();
    let mut cursor = usage.partition_head;
    while let Some(id) = cursor {
        if id >= limit {
            break;
        }
        let Some(page) = txn.page(id)? else {
            break;
        };
        if !page.sealed || page.reference_count > 0 {
            break;
        }

        for offset in 0..page.tail {
            let position = Position::new(id, offset);
            if let Some(value) = txn.element(position)? {
                usage.stored_bytes = usage.stored_bytes.saturating_sub(value.len() as u64);
                txn.remove_element(position);
            }
        }
        txn.remove_page(id);
        removed.push(id);
        cursor = page.next_page;
    }

    if !removed.is_empty() {
        usage.partition_head = cursor;
        if cursor.is_none() {
            usage.partition_tail = None;
        }
        debug!(
            partition = %txn.partition(),
            removed = removed.len(),
            head = ?usage.partition_head,
            "compacted pages"
        );
        txn.put_usage(usage.clone());
    }

    Ok(CompactResult {
        removed_pages: removed,
        partition_head: usage.partition_head,
    })
}

/// Removes individual elements outside of any request (expiry, eviction).
///
/// Returns the positions that held an element. Heads are left alone and
/// polls skip the holes; each page counts the holes it carries.
///
/// # Errors
/// Returns an error if the backing store fails.
pub fn evict(txn: &mut PartitionTxn<'_>, positions: &[Position]) -> PartitionResult<Vec<Position>> {
    let Some(mut usage) = txn.usage()? else {
        return Ok(Vec::new());
    };

    let mut evicted = Vec::new();
    let mut holes: BTreeMap<PageId, u32> = BTreeMap::new();
    for position in positions {
        if let Some(value) = txn.element(*position)? {
            usage.stored_bytes = usage.stored_bytes.saturating_sub(value.len() as u64);
            txn.remove_element(*position);
            evicted.push(*position);
            *holes.entry(position.page).or_default() += 1;
        }
    }

    for (id, count) in holes {
        if let Some(mut page) = txn.page(id)? {
            page.evicted = page.evicted.saturating_add(count);
            txn.put_page(id, page);
        }
    }
    if !evicted.is_empty() {
        txn.put_usage(usage);
    }
    Ok(evicted)
}
