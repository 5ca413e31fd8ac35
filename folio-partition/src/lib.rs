//! Folio Partition - paged-topic partition processors.
//!
//! A topic partition stores its elements in a chain of bounded pages and
//! tracks publication and subscriber positions in a single usage entry.
//! Every operation is a [`Command`] executed against a [`PartitionTxn`]
//! borrowed from the partition's [`PartitionStore`]; its writes are
//! collected in a [`ChangeSet`] and applied atomically.
//!
//! # Operations
//!
//! - `Initialise`: create usage metadata, idempotently
//! - `TailAdvance`: move the publication tail forward (max merge)
//! - `Offer`: append a batch, rolling pages at capacity
//! - `Poll`: consume from a subscriber group's head
//! - `Subscribe` / `Unsubscribe`: manage subscriber groups
//! - `Compact`: remove pages every group has passed
//!
//! # `TigerStyle` Principles
//!
//! - Explicit limits on batch size, poll size and subscriber groups
//! - No locking inside processors; the owner serialises access
//! - No unsafe code

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod command;
mod error;
mod initialise;
mod model;
mod offer;
mod poll;
mod retention;
mod store;
mod subscription;
mod tail;
mod txn;

pub use command::{execute, Command, CommandResult};
pub use error::{PartitionError, PartitionResult, StoreError, StoreResult};
pub use initialise::{initialise, InitialiseResult};
pub use model::{Element, Page, PartitionSnapshot, Usage};
pub use offer::{offer, OfferError, OfferRequest, OfferResult, OfferStatus};
pub use poll::{poll, PollRequest, PollResult, PollStatus};
pub use retention::{compact, evict, CompactResult};
pub use store::{BackingStore, MemoryStore, SimulatedStore, StoreFaultConfig};
pub use subscription::{
    subscribe, unsubscribe, SubscribeRequest, SubscribeResult, SubscriberStart,
    UnsubscribeRequest, UnsubscribeResult,
};
pub use tail::{advance_tail, TailAdvanceRequest, TailAdvanceResult};
pub use txn::{Change, ChangeSet, PartitionStore, PartitionTxn};
