//! Partition transactions.
//!
//! A [`PartitionStore`] is the only handle through which a partition's
//! entries are mutated. Each invocation borrows it as a [`PartitionTxn`],
//! which reads through its own pending changes and collects every write into
//! a [`ChangeSet`]. Nothing reaches the backing store until the change set is
//! applied, so a failed or vetoed invocation leaves no partial state.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use folio_core::{Limits, PageId, PartitionId, Position, TopicConfig};

use crate::command::{execute, Command, CommandResult};
use crate::error::PartitionResult;
use crate::model::{Page, PartitionSnapshot, Usage};
use crate::store::BackingStore;

// -----------------------------------------------------------------------------
// Change Set
// -----------------------------------------------------------------------------

/// A pending write to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    /// Insert or replace the entry.
    Put(T),
    /// Remove the entry.
    Remove,
}

impl<T> Change<T> {
    /// Returns the new value, or `None` for a removal.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Put(value) => Some(value),
            Self::Remove => None,
        }
    }
}

/// Every entry written by one invocation.
///
/// Usage is never removed by a request, so its slot is simply the new value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    /// New usage entry, if changed.
    pub usage: Option<Usage>,
    /// Page writes.
    pub pages: BTreeMap<PageId, Change<Page>>,
    /// Element writes.
    pub elements: BTreeMap<Position, Change<Bytes>>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the invocation wrote nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usage.is_none() && self.pages.is_empty() && self.elements.is_empty()
    }

    /// Returns the number of entries written.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.usage.is_some()) + self.pages.len() + self.elements.len()
    }
}

// -----------------------------------------------------------------------------
// Partition Transaction
// -----------------------------------------------------------------------------

/// One invocation's view of a partition: committed entries overlaid with
/// pending writes.
#[derive(Debug)]
pub struct PartitionTxn<'a> {
    partition: PartitionId,
    config: &'a TopicConfig,
    limits: &'a Limits,
    backing: &'a dyn BackingStore,
    changes: ChangeSet,
}

impl<'a> PartitionTxn<'a> {
    /// Returns the partition this transaction targets.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Returns the topic configuration.
    #[must_use]
    pub const fn config(&self) -> &'a TopicConfig {
        self.config
    }

    /// Returns the hard limits.
    #[must_use]
    pub const fn limits(&self) -> &'a Limits {
        self.limits
    }

    /// Reads the usage entry.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn usage(&self) -> PartitionResult<Option<Usage>> {
        if let Some(usage) = &self.changes.usage {
            return Ok(Some(usage.clone()));
        }
        Ok(self.backing.usage()?)
    }

    /// Reads a page entry.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn page(&self, id: PageId) -> PartitionResult<Option<Page>> {
        if let Some(change) = self.changes.pages.get(&id) {
            return Ok(change.value().cloned());
        }
        Ok(self.backing.page(id)?)
    }

    /// Reads an element entry.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn element(&self, position: Position) -> PartitionResult<Option<Bytes>> {
        if let Some(change) = self.changes.elements.get(&position) {
            return Ok(change.value().cloned());
        }
        Ok(self.backing.element(position)?)
    }

    /// Writes the usage entry.
    pub fn put_usage(&mut self, usage: Usage) {
        self.changes.usage = Some(usage);
    }

    /// Writes a page entry.
    pub fn put_page(&mut self, id: PageId, page: Page) {
        self.changes.pages.insert(id, Change::Put(page));
    }

    /// Removes a page entry.
    pub fn remove_page(&mut self, id: PageId) {
        self.changes.pages.insert(id, Change::Remove);
    }

    /// Writes an element entry.
    pub fn put_element(&mut self, position: Position, value: Bytes) {
        self.changes.elements.insert(position, Change::Put(value));
    }

    /// Removes an element entry.
    pub fn remove_element(&mut self, position: Position) {
        self.changes.elements.insert(position, Change::Remove);
    }

    /// Returns the writes collected so far.
    #[must_use]
    pub const fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Consumes the transaction, returning its writes.
    #[must_use]
    pub fn into_changes(self) -> ChangeSet {
        self.changes
    }
}

// -----------------------------------------------------------------------------
// Partition Store
// -----------------------------------------------------------------------------

/// Exclusive handle to one partition's entries.
///
/// Whoever holds a `&mut PartitionStore` may mutate the partition; the
/// hosting member keeps it behind the partition lock.
#[derive(Debug)]
pub struct PartitionStore {
    partition: PartitionId,
    config: Arc<TopicConfig>,
    limits: Limits,
    backing: Box<dyn BackingStore>,
}

impl PartitionStore {
    /// Creates a handle over a backing store.
    ///
    /// `config` is expected to have passed [`TopicConfig::validate`] under
    /// `limits`; [`TopicConfig::from_toml`] and the grid member check it.
    #[must_use]
    pub fn new(
        partition: PartitionId,
        config: Arc<TopicConfig>,
        limits: Limits,
        backing: Box<dyn BackingStore>,
    ) -> Self {
        Self {
            partition,
            config,
            limits,
            backing,
        }
    }

    /// Returns the partition ID.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Returns the topic configuration.
    #[must_use]
    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// Returns the hard limits.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Starts a transaction over the committed entries.
    #[must_use]
    pub fn begin(&self) -> PartitionTxn<'_> {
        PartitionTxn {
            partition: self.partition,
            config: &self.config,
            limits: &self.limits,
            backing: self.backing.as_ref(),
            changes: ChangeSet::new(),
        }
    }

    /// Runs a command without applying its writes.
    ///
    /// # Errors
    /// Returns an error if the command fails; nothing is written.
    pub fn prepare(&self, command: &Command) -> PartitionResult<(CommandResult, ChangeSet)> {
        let mut txn = self.begin();
        let result = execute(&mut txn, command)?;
        Ok((result, txn.into_changes()))
    }

    /// Applies a change set atomically.
    ///
    /// # Errors
    /// Returns an error if the backing store rejects the write.
    pub fn apply(&mut self, changes: &ChangeSet) -> PartitionResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.backing.apply(changes)?;
        Ok(())
    }

    /// Runs a command and applies its writes.
    ///
    /// # Errors
    /// Returns an error if the command or the write fails; nothing is written.
    pub fn invoke(&mut self, command: &Command) -> PartitionResult<CommandResult> {
        let (result, changes) = self.prepare(command)?;
        self.apply(&changes)?;
        Ok(result)
    }

    /// Captures every entry.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn snapshot(&self) -> PartitionResult<PartitionSnapshot> {
        Ok(self.backing.snapshot()?)
    }

    /// Replaces every entry with the snapshot's.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub fn restore(&mut self, snapshot: &PartitionSnapshot) -> PartitionResult<()> {
        Ok(self.backing.restore(snapshot)?)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.backing.clear();
    }

    /// Returns the payload bytes of all stored elements.
    #[must_use]
    pub fn stored_bytes(&self) -> u64 {
        self.backing.stored_bytes()
    }
}
