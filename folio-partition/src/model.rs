//! Page, usage and element entries of a paged partition.
//!
//! # Entry Encoding
//!
//! Pages and usage records encode to a stable little-endian layout so that
//! two equal states always produce identical bytes:
//!
//! - Page: tail (u32), used (u64), flags (u8), next page (u64, if flagged),
//!   reference count (u32), evicted count (u32)
//! - Usage: publication tail (u64 + u32), head/tail/max pages (u8 presence +
//!   u64 each), stored bytes (u64), subscriber count (u32), then
//!   `(group u64, page u64, offset u32)` per subscriber in group order
//! - Snapshot: usage presence (u8) + usage, page count (u32) + `(id, page)`,
//!   element count (u32) + `(page, offset, len u32, bytes)`

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use folio_core::{PageId, Position, SubscriberGroupId};

use crate::error::{PartitionError, PartitionResult};

const PAGE_FLAG_SEALED: u8 = 0b01;
const PAGE_FLAG_HAS_NEXT: u8 = 0b10;

// -----------------------------------------------------------------------------
// Page
// -----------------------------------------------------------------------------

/// One bounded segment of a partition's element log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    /// Number of elements appended; also the next free offset.
    pub tail: u32,
    /// Capacity consumed, in the topic's capacity unit.
    pub used: u64,
    /// A sealed page accepts no further elements.
    pub sealed: bool,
    /// The page that follows this one in the partition, once created.
    pub next_page: Option<PageId>,
    /// Number of subscriber groups whose head is on this page.
    pub reference_count: u32,
    /// Number of elements removed from the page by eviction.
    pub evicted: u32,
}

impl Page {
    /// Creates an empty open page with the given number of attached groups.
    #[must_use]
    pub const fn new(reference_count: u32) -> Self {
        Self {
            tail: 0,
            used: 0,
            sealed: false,
            next_page: None,
            reference_count,
            evicted: 0,
        }
    }

    /// Returns true if no element was ever appended to the page.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tail == 0
    }

    /// Returns the remaining capacity given the page capacity.
    #[must_use]
    pub fn remaining(&self, capacity: u32) -> u64 {
        if self.sealed {
            0
        } else {
            u64::from(capacity).saturating_sub(self.used)
        }
    }

    /// Returns true if an element of `units` fits on this page.
    ///
    /// The first element of a page always fits, so oversized elements still
    /// make progress.
    #[must_use]
    pub fn fits(&self, units: u64, capacity: u32) -> bool {
        !self.sealed && (self.is_empty() || self.used + units <= u64::from(capacity))
    }

    /// Appends the encoded page to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.tail);
        buf.put_u64_le(self.used);
        let mut flags = 0;
        if self.sealed {
            flags |= PAGE_FLAG_SEALED;
        }
        if self.next_page.is_some() {
            flags |= PAGE_FLAG_HAS_NEXT;
        }
        buf.put_u8(flags);
        if let Some(next) = self.next_page {
            buf.put_u64_le(next.get());
        }
        buf.put_u32_le(self.reference_count);
        buf.put_u32_le(self.evicted);
    }

    /// Decodes a page from `buf`.
    ///
    /// # Errors
    /// Returns an error if the buffer is truncated.
    pub fn decode(buf: &mut impl Buf) -> PartitionResult<Self> {
        ensure_remaining(buf, 13, "page")?;
        let tail = buf.get_u32_le();
        let used = buf.get_u64_le();
        let flags = buf.get_u8();
        let next_page = if flags & PAGE_FLAG_HAS_NEXT == 0 {
            None
        } else {
            ensure_remaining(buf, 8, "page.next_page")?;
            Some(PageId::new(buf.get_u64_le()))
        };
        ensure_remaining(buf, 8, "page.reference_count")?;
        let reference_count = buf.get_u32_le();
        let evicted = buf.get_u32_le();

        Ok(Self {
            tail,
            used,
            sealed: flags & PAGE_FLAG_SEALED != 0,
            next_page,
            reference_count,
            evicted,
        })
    }
}

// -----------------------------------------------------------------------------
// Usage
// -----------------------------------------------------------------------------

/// Per-partition paging metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Usage {
    /// Next write position. Never decreases.
    pub publication_tail: Position,
    /// First existing page, if any.
    pub partition_head: Option<PageId>,
    /// Last existing page, if any.
    pub partition_tail: Option<PageId>,
    /// Highest page id ever created.
    pub partition_max: Option<PageId>,
    /// Payload bytes of all stored elements.
    pub stored_bytes: u64,
    /// Head position of each subscriber group.
    pub subscribers: BTreeMap<SubscriberGroupId, Position>,
}

impl Usage {
    /// Creates usage for a fresh partition: tail at page 0 offset 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the earliest position still holding data.
    ///
    /// This is the start of the first existing page, or the publication
    /// tail when the partition holds no pages.
    #[must_use]
    pub fn earliest(&self) -> Position {
        self.partition_head
            .map_or(self.publication_tail, Position::page_start)
    }

    /// Returns the number of groups whose head is on `page`.
    #[must_use]
    pub fn references_to(&self, page: PageId) -> u32 {
        let count = self.subscribers.values().filter(|p| p.page == page).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Returns the lowest head page over all subscribers.
    #[must_use]
    pub fn min_subscriber_page(&self) -> Option<PageId> {
        self.subscribers.values().map(|p| p.page).min()
    }

    /// Appends the encoded usage to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        encode_position(buf, self.publication_tail);
        encode_optional_page(buf, self.partition_head);
        encode_optional_page(buf, self.partition_tail);
        encode_optional_page(buf, self.partition_max);
        buf.put_u64_le(self.stored_bytes);
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32_le(self.subscribers.len() as u32);
        for (group, head) in &self.subscribers {
            buf.put_u64_le(group.get());
            encode_position(buf, *head);
        }
    }

    /// Decodes usage from `buf`.
    ///
    /// # Errors
    /// Returns an error if the buffer is truncated.
    pub fn decode(buf: &mut impl Buf) -> PartitionResult<Self> {
        let publication_tail = decode_position(buf)?;
        let partition_head = decode_optional_page(buf)?;
        let partition_tail = decode_optional_page(buf)?;
        let partition_max = decode_optional_page(buf)?;
        ensure_remaining(buf, 12, "usage")?;
        let stored_bytes = buf.get_u64_le();
        let count = buf.get_u32_le();

        let mut subscribers = BTreeMap::new();
        for _ in 0..count {
            ensure_remaining(buf, 8, "usage.subscriber")?;
            let group = SubscriberGroupId::new(buf.get_u64_le());
            subscribers.insert(group, decode_position(buf)?);
        }

        Ok(Self {
            publication_tail,
            partition_head,
            partition_tail,
            partition_max,
            stored_bytes,
            subscribers,
        })
    }
}

// -----------------------------------------------------------------------------
// Element
// -----------------------------------------------------------------------------

/// An element returned by a poll, tagged with where it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Position of the element within the partition.
    pub position: Position,
    /// Opaque serialized payload.
    pub value: Bytes,
}

impl Element {
    /// Creates an element.
    #[must_use]
    pub const fn new(position: Position, value: Bytes) -> Self {
        Self { position, value }
    }
}

// -----------------------------------------------------------------------------
// Snapshot
// -----------------------------------------------------------------------------

/// Every entry of one partition, in key order.
///
/// Snapshots are what transfer events carry and what a store restores from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionSnapshot {
    /// Usage entry, absent for an uninitialised partition.
    pub usage: Option<Usage>,
    /// Page entries.
    pub pages: BTreeMap<PageId, Page>,
    /// Element entries.
    pub elements: BTreeMap<Position, Bytes>,
}

impl PartitionSnapshot {
    /// Returns true if the snapshot holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usage.is_none() && self.pages.is_empty() && self.elements.is_empty()
    }

    /// Returns the total number of entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        usize::from(self.usage.is_some()) + self.pages.len() + self.elements.len()
    }

    /// Encodes the snapshot deterministically.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        match &self.usage {
            Some(usage) => {
                buf.put_u8(1);
                usage.encode(&mut buf);
            }
            None => buf.put_u8(0),
        }

        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32_le(self.pages.len() as u32);
        for (id, page) in &self.pages {
            buf.put_u64_le(id.get());
            page.encode(&mut buf);
        }

        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32_le(self.elements.len() as u32);
        for (position, value) in &self.elements {
            encode_position(&mut buf, *position);
            #[allow(clippy::cast_possible_truncation)]
            buf.put_u32_le(value.len() as u32);
            buf.put_slice(value);
        }

        buf.freeze()
    }

    /// Decodes a snapshot produced by [`Self::encode`].
    ///
    /// # Errors
    /// Returns an error if the data is truncated or has trailing bytes.
    pub fn decode(mut data: Bytes) -> PartitionResult<Self> {
        let buf = &mut data;
        ensure_remaining(buf, 1, "snapshot")?;
        let usage = match buf.get_u8() {
            0 => None,
            1 => Some(Usage::decode(buf)?),
            other => {
                return Err(PartitionError::Corruption {
                    message: format!("invalid usage presence flag {other}"),
                })
            }
        };

        ensure_remaining(buf, 4, "snapshot.pages")?;
        let page_count = buf.get_u32_le();
        let mut pages = BTreeMap::new();
        for _ in 0..page_count {
            ensure_remaining(buf, 8, "snapshot.page_id")?;
            let id = PageId::new(buf.get_u64_le());
            pages.insert(id, Page::decode(buf)?);
        }

        ensure_remaining(buf, 4, "snapshot.elements")?;
        let element_count = buf.get_u32_le();
        let mut elements = BTreeMap::new();
        for _ in 0..element_count {
            let position = decode_position(buf)?;
            ensure_remaining(buf, 4, "snapshot.element_len")?;
            let len = buf.get_u32_le() as usize;
            ensure_remaining(buf, len, "snapshot.element")?;
            elements.insert(position, buf.copy_to_bytes(len));
        }

        if buf.has_remaining() {
            return Err(PartitionError::Corruption {
                message: format!("{} trailing bytes after snapshot", buf.remaining()),
            });
        }

        Ok(Self {
            usage,
            pages,
            elements,
        })
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn ensure_remaining(buf: &impl Buf, need: usize, what: &str) -> PartitionResult<()> {
    if buf.remaining() < need {
        return Err(PartitionError::Corruption {
            message: format!("truncated {what}: need {need} bytes, have {}", buf.remaining()),
        });
    }
    Ok(())
}

fn encode_position(buf: &mut impl BufMut, position: Position) {
    buf.put_u64_le(position.page.get());
    buf.put_u32_le(position.offset);
}

fn decode_position(buf: &mut impl Buf) -> PartitionResult<Position> {
    ensure_remaining(buf, 12, "position")?;
    let page = PageId::new(buf.get_u64_le());
    Ok(Position::new(page, buf.get_u32_le()))
}

fn encode_optional_page(buf: &mut impl BufMut, page: Option<PageId>) {
    match page {
        Some(id) => {
            buf.put_u8(1);
            buf.put_u64_le(id.get());
        }
        None => buf.put_u8(0),
    }
}

fn decode_optional_page(buf: &mut impl Buf) -> PartitionResult<Option<PageId>> {
    ensure_remaining(buf, 1, "optional page")?;
    if buf.get_u8() == 0 {
        return Ok(None);
    }
    ensure_remaining(buf, 8, "optional page")?;
    Ok(Some(PageId::new(buf.get_u64_le())))
}
