//! Reusable fixtures for Folio tests.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use folio_core::{CapacityUnit, Limits, MemberId, PartitionId, TopicConfig};
use folio_grid::{
    Abort, Interceptor, InterceptorRegistry, Member, TransactionEvent, TransactionEventType,
    TransferEvent, TransferEventType, UnsolicitedCommitEvent,
};
use folio_partition::{BackingStore, PartitionStore, SimulatedStore};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to run per property.
    pub const CI_SEED_COUNT: u64 = 50;
}

/// Topic configuration presets.
pub mod topics {
    use super::{CapacityUnit, TopicConfig};

    /// Pages holding `capacity` elements each.
    #[must_use]
    pub fn element_pages(capacity: u32) -> TopicConfig {
        TopicConfig::new("test-topic").with_page_capacity(capacity, CapacityUnit::Elements)
    }

    /// Pages holding `capacity` payload bytes each.
    #[must_use]
    pub fn byte_pages(capacity: u32) -> TopicConfig {
        TopicConfig::new("test-topic").with_page_capacity(capacity, CapacityUnit::Bytes)
    }
}

/// Creates a partition store over a simulated backing store and returns a
/// second handle to the same backing entries.
#[must_use]
pub fn simulated_partition(config: TopicConfig, seed: u64) -> (PartitionStore, SimulatedStore) {
    let backing = SimulatedStore::new(seed);
    let store = PartitionStore::new(
        PartitionId::new(0),
        Arc::new(config),
        Limits::new(),
        Box::new(backing.clone()),
    );
    (store, backing)
}

/// Creates an in-memory member.
#[must_use]
pub fn member(id: u64, config: TopicConfig, registry: InterceptorRegistry) -> Member {
    Member::new(MemberId::new(id), Arc::new(config), registry).expect("valid test topic config")
}

/// Creates a member whose partitions all share one simulated backing store.
///
/// Only suitable for tests that host a single partition.
#[must_use]
pub fn simulated_member(
    id: u64,
    config: TopicConfig,
    registry: InterceptorRegistry,
    backing: &SimulatedStore,
) -> Member {
    let backing = backing.clone();
    Member::with_store_factory(
        MemberId::new(id),
        Arc::new(config),
        Limits::new(),
        registry,
        Arc::new(move |_: PartitionId| -> Box<dyn BackingStore> {
            Box::new(backing.clone())
        }),
    )
    .expect("valid test topic config")
}

/// Generates a non-empty payload of up to `max_len` bytes.
pub fn payload(rng: &mut ChaCha8Rng, max_len: usize) -> Bytes {
    let len = rng.gen_range(1..=max_len);
    let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    Bytes::from(data)
}

// ============================================================================
// Recording Interceptor
// ============================================================================

/// An event observed by a [`RecordingInterceptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A transaction event and the number of entries it carried.
    Transaction {
        /// Event kind.
        kind: TransactionEventType,
        /// Partition.
        partition: PartitionId,
        /// Entries in the change set.
        entries: usize,
    },
    /// A transfer event.
    Transfer {
        /// Event kind.
        kind: TransferEventType,
        /// Partition.
        partition: PartitionId,
        /// Other side of the transfer.
        remote: Option<MemberId>,
        /// Entries carried, if any.
        entries: Option<usize>,
    },
    /// An unsolicited commit and the number of entries it carried.
    Unsolicited {
        /// Partition.
        partition: PartitionId,
        /// Entries in the change set.
        entries: usize,
    },
}

/// Interceptor that records every event and can be told to refuse some.
#[derive(Debug, Default)]
pub struct RecordingInterceptor {
    events: Mutex<Vec<RecordedEvent>>,
    refuse_committing: Mutex<Option<String>>,
    refuse_committed: Mutex<bool>,
    refuse_transfer: Mutex<bool>,
}

impl RecordingInterceptor {
    /// Creates an interceptor that accepts everything.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns every event recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Returns the recorded transfer event kinds, in order.
    #[must_use]
    pub fn transfer_kinds(&self) -> Vec<TransferEventType> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Transfer { kind, .. } => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded events.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn clear(&self) {
        self.events.lock().expect("lock poisoned").clear();
    }

    /// Refuses COMMITTING events with `reason` until reset with `None`.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn refuse_committing(&self, reason: Option<&str>) {
        *self.refuse_committing.lock().expect("lock poisoned") = reason.map(str::to_owned);
    }

    /// Fails COMMITTED events.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn refuse_committed(&self, refuse: bool) {
        *self.refuse_committed.lock().expect("lock poisoned") = refuse;
    }

    /// Fails transfer events.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    pub fn refuse_transfer(&self, refuse: bool) {
        *self.refuse_transfer.lock().expect("lock poisoned") = refuse;
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }
}

impl Interceptor for RecordingInterceptor {
    fn on_transaction(&self, event: &mut TransactionEvent<'_>) -> Result<(), Abort> {
        self.record(RecordedEvent::Transaction {
            kind: event.kind(),
            partition: event.partition(),
            entries: event.entries().len(),
        });

        match event.kind() {
            TransactionEventType::Committing => {
                match self.refuse_committing.lock().expect("lock poisoned").as_deref() {
                    Some(reason) => Err(Abort::new(reason)),
                    None => Ok(()),
                }
            }
            TransactionEventType::Committed => {
                if *self.refuse_committed.lock().expect("lock poisoned") {
                    Err(Abort::new("committed observer failed"))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn on_transfer(&self, event: &TransferEvent<'_>) -> Result<(), Abort> {
        self.record(RecordedEvent::Transfer {
            kind: event.kind,
            partition: event.partition,
            remote: event.remote_member,
            entries: event.entries.map(folio_partition::PartitionSnapshot::entry_count),
        });
        if *self.refuse_transfer.lock().expect("lock poisoned") {
            return Err(Abort::new("transfer observer failed"));
        }
        Ok(())
    }

    fn on_unsolicited_commit(&self, event: &UnsolicitedCommitEvent<'_>) -> Result<(), Abort> {
        self.record(RecordedEvent::Unsolicited {
            partition: event.partition,
            entries: event.entries.len(),
        });
        Ok(())
    }
}

/// Builds a registry holding one recording interceptor.
///
/// # Panics
///
/// Never; a fresh registry has no duplicate names.
#[must_use]
pub fn recording_registry() -> (InterceptorRegistry, Arc<RecordingInterceptor>) {
    let recorder = RecordingInterceptor::new();
    let registry = InterceptorRegistry::new()
        .with("recorder", Arc::clone(&recorder) as Arc<dyn Interceptor>)
        .expect("fresh registry");
    (registry, recorder)
}
