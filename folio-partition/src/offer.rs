//! Offer processor: the write path.
//!
//! Appends a batch of elements to the tail page of a partition, rolling to a
//! new page whenever the current one cannot take the next element. Element
//! validation failures are recorded per batch index and do not abort the
//! rest of the batch.

use std::collections::BTreeMap;

use bytes::Bytes;
use folio_core::{PageId, Position};
use thiserror::Error;
use tracing::debug;

use crate::error::PartitionResult;
use crate::initialise::load_or_create_usage;
use crate::model::{Page, Usage};
use crate::txn::PartitionTxn;

/// Request to append elements to a partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OfferRequest {
    /// Serialized elements, in order.
    pub elements: Vec<Bytes>,
    /// Seal the final page after appending.
    pub seal: bool,
}

impl OfferRequest {
    /// Creates a request that does not seal.
    #[must_use]
    pub const fn new(elements: Vec<Bytes>) -> Self {
        Self {
            elements,
            seal: false,
        }
    }

    /// Builder: request that the final page be sealed.
    #[must_use]
    pub const fn with_seal(mut self, seal: bool) -> Self {
        self.seal = seal;
        self
    }
}

/// Overall outcome of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    /// Elements were appended; the final page is still open.
    Success,
    /// The final page was sealed by this offer.
    PageSealed,
    /// The partition reached its storage capacity.
    TopicFull,
}

/// Why a single element was not accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OfferError {
    /// Zero-length payload.
    #[error("element is empty")]
    Empty,
    /// Payload larger than the topic allows.
    #[error("element too large: {size} > {max} bytes")]
    TooLarge {
        /// Payload size.
        size: usize,
        /// Maximum allowed size.
        max: u32,
    },
    /// The partition is at capacity.
    #[error("topic partition is full")]
    TopicFull,
}

/// Outcome of an offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferResult {
    /// Overall status.
    pub status: OfferStatus,
    /// Number of elements appended.
    pub accepted_count: u32,
    /// Capacity left on the final page, in the topic's capacity unit.
    pub page_capacity_remaining: u64,
    /// Rejected elements, keyed by batch index.
    pub errors: BTreeMap<u32, OfferError>,
    /// Position of the first appended element.
    pub offset: Option<Position>,
}

/// Appends a batch to the partition's tail page.
///
/// # Errors
/// Returns an error if the batch exceeds the element limit or the backing
/// store fails. Nothing is written in either case.
pub fn offer(txn: &mut PartitionTxn<'_>, request: &OfferRequest) -> PartitionResult<OfferResult> {
    let config = txn.config();
    let capacity = config.page_capacity;

    let batch_len = request.elements.len();
    if batch_len > txn.limits().max_batch_elements as usize {
        return Err(folio_core::Error::LimitExceeded {
            limit: "batch_elements",
            max: u64::from(txn.limits().max_batch_elements),
            actual: batch_len as u64,
        }
        .into());
    }

    if request.elements.is_empty() {
        let remaining = match txn.usage()? {
            Some(usage) => txn
                .page(usage.publication_tail.page)?
                .map_or(u64::from(capacity), |page| page.remaining(capacity)),
            None => u64::from(capacity),
        };
        return Ok(OfferResult {
            status: OfferStatus::Success,
            accepted_count: 0,
            page_capacity_remaining: remaining,
            errors: BTreeMap::new(),
            offset: None,
        });
    }

    let (mut usage, _) = load_or_create_usage(txn)?;
    let original_usage = usage.clone();
    let tail_page = usage.publication_tail.page;
    let mut current = txn.page(tail_page)?.map(|page| (tail_page, page));
    let mut dirty = false;

    let mut errors = BTreeMap::new();
    let mut accepted: u32 = 0;
    let mut first: Option<Position> = None;
    let mut full = false;

    for (index, value) in request.elements.iter().enumerate() {
        // Bounded by max_batch_elements above.
        #[allow(clippy::cast_possible_truncation)]
        let index = index as u32;

        if value.is_empty() {
            errors.insert(index, OfferError::Empty);
            continue;
        }
        if value.len() > config.max_element_bytes as usize {
            errors.insert(
                index,
                OfferError::TooLarge {
                    size: value.len(),
                    max: config.max_element_bytes,
                },
            );
            continue;
        }
        if full {
            errors.insert(index, OfferError::TopicFull);
            continue;
        }

        let units = config.units_of(value.len());
        let fits = current
            .as_ref()
            .is_some_and(|(_, page)| page.fits(units, capacity));

        if !fits {
            if config.server_capacity > 0 && usage.stored_bytes >= config.server_capacity {
                debug!(
                    partition = %txn.partition(),
                    stored_bytes = usage.stored_bytes,
                    "partition full"
                );
                full = true;
                errors.insert(index, OfferError::TopicFull);
                continue;
            }

            let next_id = match current.as_ref() {
                Some((id, _)) => id.checked_next(),
                None => Some(usage.publication_tail.page),
            };
            let Some(next_id) = next_id else {
                debug!(partition = %txn.partition(), "page ids exhausted");
                full = true;
                errors.insert(index, OfferError::TopicFull);
                continue;
            };
            if let Some((id, mut page)) = current.take() {
                page.sealed = true;
                txn.put_page(id, page);
            }
            let page = open_page(txn, &mut usage, next_id)?;
            usage.publication_tail = Position::page_start(next_id);
            current = Some((next_id, page));
        }

        let Some((id, page)) = current.as_mut() else {
            continue;
        };
        let position = Position::new(*id, page.tail);
        txn.put_element(position, value.clone());
        page.tail += 1;
        page.used += units;
        usage.stored_bytes += value.len() as u64;
        usage.publication_tail = Position::new(*id, page.tail);
        dirty = true;
        accepted += 1;
        first.get_or_insert(position);

        if page.used >= u64::from(capacity) {
            page.sealed = true;
            debug!(partition = %txn.partition(), page = id.get(), "sealed full page");
        }
    }

    let mut sealed_now = false;
    if let Some((id, page)) = current.as_mut() {
        if request.seal && !page.sealed {
            page.sealed = true;
            dirty = true;
            debug!(partition = %txn.partition(), page = id.get(), "sealed page on request");
        }
        sealed_now = dirty && page.sealed;
    }

    let remaining = current
        .as_ref()
        .map_or(u64::from(capacity), |(_, page)| page.remaining(capacity));
    if dirty {
        if let Some((id, page)) = current {
            txn.put_page(id, page);
        }
    }
    if usage != original_usage {
        txn.put_usage(usage);
    }

    let status = if full {
        OfferStatus::TopicFull
    } else if sealed_now {
        OfferStatus::PageSealed
    } else {
        OfferStatus::Success
    };

    Ok(OfferResult {
        status,
        accepted_count: accepted,
        page_capacity_remaining: remaining,
        errors,
        offset: first,
    })
}

/// Creates page `id` at the end of the partition.
///
/// Links and seals the previous last page, and counts the subscriber groups
/// already waiting at the new page.
fn open_page(txn: &mut PartitionTxn<'_>, usage: &mut Usage, id: PageId) -> PartitionResult<Page> {
    if let Some(previous) = usage.partition_tail.filter(|prev| *prev != id) {
        if let Some(mut page) = txn.page(previous)? {
            page.sealed = true;
            page.next_page = Some(id);
            txn.put_page(previous, page);
        }
    }

    usage.partition_tail = Some(id);
    usage.partition_head.get_or_insert(id);
    usage.partition_max = Some(usage.partition_max.map_or(id, |max| max.max(id)));

    debug!(partition = %txn.partition(), page = id.get(), "opened page");
    Ok(Page::new(usage.references_to(id)))
}
