//! Folio Grid - partition hosting for grid members.
//!
//! A [`Member`] hosts partition stores, tracks each partition's ownership
//! state and runs commands under the partition lock. Around every mutation
//! it raises events to the registered [`Interceptor`]s:
//!
//! - transaction events (COMMITTING, COMMITTED) for request-driven writes
//! - transfer events as partitions arrive, depart, are lost or recovered
//! - unsolicited commit events for writes no request asked for
//!
//! The [`InvocationService`] puts a per-partition async worker in front of
//! a member so callers can pipeline commands while keeping unit-of-order.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod actor;
mod error;
mod event;
mod interceptor;
mod member;
mod ownership;

pub use actor::{InvocationConfig, InvocationService, PendingInvocation};
pub use error::{GridError, GridResult};
pub use event::{
    TransactionEvent, TransactionEventType, TransferEvent, TransferEventType,
    UnsolicitedCommitEvent, UnsolicitedCommitEventType,
};
pub use interceptor::{Abort, Interceptor, InterceptorRegistry};
pub use member::{Member, StoreFactory};
pub use ownership::{PartitionState, Transition};
