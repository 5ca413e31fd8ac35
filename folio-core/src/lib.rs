//! Folio Core - Strongly-typed identifiers and configuration for Folio.
//!
//! This crate provides the vocabulary shared by every Folio crate: the ID
//! newtypes for partitions, pages, members and subscriber groups, the
//! [`Position`] of an element inside a partition's page sequence, and the
//! per-topic [`TopicConfig`].
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up a `PageId` with a `PartitionId`
//! - **Explicit limits**: Every resource has a bounded maximum
//! - **Explicit types**: Use u32/u64, not usize
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod limits;
mod position;
mod types;

pub use config::{CapacityUnit, ConfigError, TopicConfig};
pub use error::{Error, Result};
pub use limits::Limits;
pub use position::Position;
pub use types::{MemberId, PageId, PartitionId, SubscriberGroupId};
