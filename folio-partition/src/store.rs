//! Backing storage for one partition's entries.
//!
//! Provides the `BackingStore` trait the processors read through,
//! `MemoryStore` for normal operation, and `SimulatedStore` for
//! deterministic fault injection in tests.

#![allow(clippy::significant_drop_tightening)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use folio_core::{PageId, Position};

use crate::error::{StoreError, StoreResult};
use crate::model::{Page, PartitionSnapshot, Usage};
use crate::txn::{Change, ChangeSet};

// -----------------------------------------------------------------------------
// Backing Store Trait
// -----------------------------------------------------------------------------

/// Per-partition entry storage.
///
/// Reads return committed state only. `apply` installs a whole change set
/// or nothing.
pub trait BackingStore: Send + std::fmt::Debug {
    /// Reads the usage entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn usage(&self) -> StoreResult<Option<Usage>>;

    /// Reads a page entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn page(&self, id: PageId) -> StoreResult<Option<Page>>;

    /// Reads an element entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn element(&self, position: Position) -> StoreResult<Option<Bytes>>;

    /// Applies every change in the set atomically.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written; nothing is applied.
    fn apply(&mut self, changes: &ChangeSet) -> StoreResult<()>;

    /// Captures every entry.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn snapshot(&self) -> StoreResult<PartitionSnapshot>;

    /// Replaces all entries with the snapshot's.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn restore(&mut self, snapshot: &PartitionSnapshot) -> StoreResult<()>;

    /// Drops all entries.
    fn clear(&mut self);

    /// Returns the payload bytes of all stored elements.
    fn stored_bytes(&self) -> u64;
}

// -----------------------------------------------------------------------------
// Memory Store
// -----------------------------------------------------------------------------

/// In-memory entry maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    usage: Option<Usage>,
    pages: BTreeMap<PageId, Page>,
    elements: BTreeMap<Position, Bytes>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of page entries.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns the number of element entries.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    fn apply_unchecked(&mut self, changes: &ChangeSet) {
        if let Some(usage) = &changes.usage {
            self.usage = Some(usage.clone());
        }
        for (id, change) in &changes.pages {
            match change {
                Change::Put(page) => {
                    self.pages.insert(*id, page.clone());
                }
                Change::Remove => {
                    self.pages.remove(id);
                }
            }
        }
        for (position, change) in &changes.elements {
            match change {
                Change::Put(value) => {
                    self.elements.insert(*position, value.clone());
                }
                Change::Remove => {
                    self.elements.remove(position);
                }
            }
        }
    }
}

impl BackingStore for MemoryStore {
    fn usage(&self) -> StoreResult<Option<Usage>> {
        Ok(self.usage.clone())
    }

    fn page(&self, id: PageId) -> StoreResult<Option<Page>> {
        Ok(self.pages.get(&id).cloned())
    }

    fn element(&self, position: Position) -> StoreResult<Option<Bytes>> {
        Ok(self.elements.get(&position).cloned())
    }

    fn apply(&mut self, changes: &ChangeSet) -> StoreResult<()> {
        self.apply_unchecked(changes);
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<PartitionSnapshot> {
        Ok(PartitionSnapshot {
            usage: self.usage.clone(),
            pages: self.pages.clone(),
            elements: self.elements.clone(),
        })
    }

    fn restore(&mut self, snapshot: &PartitionSnapshot) -> StoreResult<()> {
        self.usage.clone_from(&snapshot.usage);
        self.pages.clone_from(&snapshot.pages);
        self.elements.clone_from(&snapshot.elements);
        Ok(())
    }

    fn clear(&mut self) {
        self.usage = None;
        self.pages.clear();
        self.elements.clear();
    }

    fn stored_bytes(&self) -> u64 {
        self.elements.values().map(|v| v.len() as u64).sum()
    }
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Fault configuration for the simulated store.
#[derive(Debug, Clone, Default)]
pub struct StoreFaultConfig {
    /// Probability of a read failing (0.0 - 1.0).
    pub read_fail_rate: f64,
    /// Probability of an apply failing (0.0 - 1.0).
    pub apply_fail_rate: f64,
    /// Force the next read to fail (one-shot).
    pub force_read_fail: bool,
    /// Force the next apply to fail (one-shot).
    pub force_apply_fail: bool,
}

impl StoreFaultConfig {
    /// No faults.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            read_fail_rate: 0.0,
            apply_fail_rate: 0.0,
            force_read_fail: false,
            force_apply_fail: false,
        }
    }

    /// Flaky configuration for stress testing.
    #[must_use]
    pub const fn flaky() -> Self {
        Self {
            read_fail_rate: 0.02,
            apply_fail_rate: 0.05,
            force_read_fail: false,
            force_apply_fail: false,
        }
    }

    /// Builder: set read fail rate.
    #[must_use]
    pub const fn with_read_fail_rate(mut self, rate: f64) -> Self {
        self.read_fail_rate = rate;
        self
    }

    /// Builder: set apply fail rate.
    #[must_use]
    pub const fn with_apply_fail_rate(mut self, rate: f64) -> Self {
        self.apply_fail_rate = rate;
        self
    }
}

// -----------------------------------------------------------------------------
// Simulated Store
// -----------------------------------------------------------------------------

/// In-memory store with deterministic fault injection.
///
/// Clones share state via `Arc`, so a test can keep a handle for inspection
/// and fault control after moving another into a partition.
#[derive(Debug, Clone)]
pub struct SimulatedStore {
    inner: Arc<Mutex<MemoryStore>>,
    fault_config: Arc<Mutex<StoreFaultConfig>>,
    seed: u64,
    counter: Arc<AtomicU64>,
}

impl SimulatedStore {
    /// Creates a simulated store with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, StoreFaultConfig::none())
    }

    /// Creates a simulated store with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: StoreFaultConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStore::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns fault config for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, StoreFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Returns a copy of the committed entries (bypasses faults).
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn committed(&self) -> PartitionSnapshot {
        let inner = self.inner.lock().expect("store lock poisoned");
        PartitionSnapshot {
            usage: inner.usage.clone(),
            pages: inner.pages.clone(),
            elements: inner.elements.clone(),
        }
    }

    /// Uses `(seed + counter) * M` for reproducible fault injection.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    fn check_read(&self, operation: &'static str) -> StoreResult<()> {
        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_read_fail {
                config.force_read_fail = false;
                return Err(StoreError::Io {
                    operation,
                    message: "simulated failure (forced)".into(),
                });
            }
        }

        let rate = self.fault_config.lock().expect("lock poisoned").read_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(StoreError::Io {
                operation,
                message: "simulated failure (random)".into(),
            });
        }
        Ok(())
    }

    fn check_write(&self, operation: &'static str) -> StoreResult<()> {
        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_apply_fail {
                config.force_apply_fail = false;
                return Err(StoreError::Io {
                    operation,
                    message: "simulated failure (forced)".into(),
                });
            }
        }

        let rate = self.fault_config.lock().expect("lock poisoned").apply_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(StoreError::Io {
                operation,
                message: "simulated failure (random)".into(),
            });
        }
        Ok(())
    }
}

impl BackingStore for SimulatedStore {
    fn usage(&self) -> StoreResult<Option<Usage>> {
        self.check_read("usage")?;
        self.inner.lock().expect("store lock poisoned").usage()
    }

    fn page(&self, id: PageId) -> StoreResult<Option<Page>> {
        self.check_read("page")?;
        self.inner.lock().expect("store lock poisoned").page(id)
    }

    fn element(&self, position: Position) -> StoreResult<Option<Bytes>> {
        self.check_read("element")?;
        self.inner
            .lock()
            .expect("store lock poisoned")
            .element(position)
    }

    fn apply(&mut self, changes: &ChangeSet) -> StoreResult<()> {
        self.check_write("apply")?;
        self.inner
            .lock()
            .expect("store lock poisoned")
            .apply_unchecked(changes);
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<PartitionSnapshot> {
        self.check_read("snapshot")?;
        Ok(self.committed())
    }

    fn restore(&mut self, snapshot: &PartitionSnapshot) -> StoreResult<()> {
        self.check_write("restore")?;
        self.inner
            .lock()
            .expect("store lock poisoned")
            .restore(snapshot)
    }

    fn clear(&mut self) {
        self.inner.lock().expect("store lock poisoned").clear();
    }

    fn stored_bytes(&self) -> u64 {
        self.inner.lock().expect("store lock poisoned").stored_bytes()
    }
}
