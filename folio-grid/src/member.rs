//! A cluster member hosting partition stores.
//!
//! The member owns one [`PartitionStore`] per partition behind that
//! partition's mutex. Requests, ownership transitions and evictions all run
//! under the lock, so processors see uncontended state and interceptors
//! observe entries that nothing else can change during dispatch.

#![allow(clippy::significant_drop_tightening)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use folio_core::{Limits, MemberId, PartitionId, Position, TopicConfig};
use folio_partition::{
    evict, BackingStore, Command, CommandResult, MemoryStore, PartitionSnapshot, PartitionStore,
};
use tracing::{debug, info};

use crate::error::{GridError, GridResult};
use crate::event::{TransferEvent, TransferEventType, UnsolicitedCommitEvent};
use crate::interceptor::InterceptorRegistry;
use crate::ownership::{PartitionState, Transition};

/// Creates the backing store for a partition the member starts hosting.
pub type StoreFactory = Arc<dyn Fn(PartitionId) -> Box<dyn BackingStore> + Send + Sync>;

/// One hosted partition: its ownership state and entries.
#[derive(Debug)]
struct HostedPartition {
    state: PartitionState,
    store: PartitionStore,
}

/// A member of the grid.
pub struct Member {
    id: MemberId,
    config: Arc<TopicConfig>,
    limits: Limits,
    registry: InterceptorRegistry,
    store_factory: StoreFactory,
    partitions: RwLock<BTreeMap<PartitionId, Arc<Mutex<HostedPartition>>>>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("topic", &self.config.name)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Member {
    /// Creates a member whose partitions live in memory.
    ///
    /// # Errors
    /// Returns an error if `config` is invalid under the default limits.
    pub fn new(
        id: MemberId,
        config: Arc<TopicConfig>,
        registry: InterceptorRegistry,
    ) -> GridResult<Self> {
        Self::with_store_factory(
            id,
            config,
            Limits::new(),
            registry,
            Arc::new(|_: PartitionId| -> Box<dyn BackingStore> {
                Box::new(MemoryStore::new())
            }),
        )
    }

    /// Creates a member with custom limits and backing stores.
    ///
    /// # Errors
    /// Returns an error if `config` is invalid under `limits`.
    pub fn with_store_factory(
        id: MemberId,
        config: Arc<TopicConfig>,
        limits: Limits,
        registry: InterceptorRegistry,
        store_factory: StoreFactory,
    ) -> GridResult<Self> {
        config
            .validate(&limits)
            .map_err(|e| GridError::Partition(e.into()))?;

        Ok(Self {
            id,
            config,
            limits,
            registry,
            store_factory,
            partitions: RwLock::new(BTreeMap::new()),
        })
    }

    /// Returns the member ID.
    #[must_use]
    pub const fn id(&self) -> MemberId {
        self.id
    }

    /// Returns the topic configuration.
    #[must_use]
    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// Returns the interceptor registry.
    #[must_use]
    pub const fn registry(&self) -> &InterceptorRegistry {
        &self.registry
    }

    /// Returns the local ownership state of a partition.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    #[must_use]
    pub fn state(&self, partition: PartitionId) -> PartitionState {
        let partitions = self.partitions.read().expect("partitions lock poisoned");
        partitions.get(&partition).map_or(PartitionState::Unowned, |hosted| {
            hosted.lock().expect("partition lock poisoned").state
        })
    }

    /// Returns the partitions this member currently owns.
    ///
    /// # Panics
    ///
    /// Panics if a lock is poisoned.
    #[must_use]
    pub fn owned_partitions(&self) -> Vec<PartitionId> {
        let partitions = self.partitions.read().expect("partitions lock poisoned");
        partitions
            .iter()
            .filter(|(_, hosted)| hosted.lock().expect("partition lock poisoned").state.is_owned())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Captures a partition's entries, whatever its state. A partition this
    /// member never hosted has no entries.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn snapshot(&self, partition: PartitionId) -> GridResult<PartitionSnapshot> {
        let Some(hosted) = self.lookup(partition) else {
            return Ok(PartitionSnapshot::default());
        };
        let guard = hosted.lock().expect("partition lock poisoned");
        Ok(guard.store.snapshot()?)
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Runs a command against an owned partition.
    ///
    /// The command's writes are offered to COMMITTING interceptors, applied,
    /// then announced as COMMITTED. A command that writes nothing raises no
    /// transaction events.
    ///
    /// # Errors
    /// Returns `NotOwned` or `TransferInProgress` (both retryable) if the
    /// partition cannot serve requests, `Aborted` if an interceptor refused,
    /// or the processor's error. Nothing is written on error.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn invoke(&self, partition: PartitionId, command: &Command) -> GridResult<CommandResult> {
        let hosted = self.lookup(partition).ok_or(GridError::NotOwned {
            partition,
            state: PartitionState::Unowned,
        })?;
        let mut guard = hosted.lock().expect("partition lock poisoned");
        Self::ensure_serving(partition, guard.state)?;

        let (result, mut changes) = guard.store.prepare(command)?;
        if changes.is_empty() {
            return Ok(result);
        }

        self.registry.dispatch_committing(partition, &mut changes)?;
        guard.store.apply(&changes)?;
        self.registry.dispatch_committed(partition, &changes);

        debug!(
            member = %self.id,
            partition = %partition,
            command = command.name(),
            entries = changes.len(),
            "committed"
        );
        Ok(result)
    }

    /// Removes elements outside of any request and raises an unsolicited
    /// commit event for them.
    ///
    /// # Errors
    /// Returns `NotOwned`/`TransferInProgress` or a store error.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn evict(&self, partition: PartitionId, positions: &[Position]) -> GridResult<Vec<Position>> {
        let hosted = self.lookup(partition).ok_or(GridError::NotOwned {
            partition,
            state: PartitionState::Unowned,
        })?;
        let mut guard = hosted.lock().expect("partition lock poisoned");
        Self::ensure_serving(partition, guard.state)?;

        let (evicted, changes) = {
            let mut txn = guard.store.begin();
            let evicted = evict(&mut txn, positions)?;
            (evicted, txn.into_changes())
        };
        if changes.is_empty() {
            return Ok(evicted);
        }

        guard.store.apply(&changes)?;
        self.registry.dispatch_unsolicited(&UnsolicitedCommitEvent {
            partition,
            entries: &changes,
        });
        debug!(member = %self.id, partition = %partition, count = evicted.len(), "evicted elements");
        Ok(evicted)
    }

    // -------------------------------------------------------------------------
    // Ownership Transitions
    // -------------------------------------------------------------------------

    /// Records initial assignment of a partition to this member.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the partition is unowned.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn assign(&self, partition: PartitionId) -> GridResult<()> {
        let hosted = self.hosted(partition);
        let mut guard = hosted.lock().expect("partition lock poisoned");
        guard.state = Self::next_state(partition, guard.state, Transition::Assign)?;

        self.announce(TransferEvent::new(
            TransferEventType::Assigned,
            partition,
            self.id,
        ));
        Ok(())
    }

    /// Starts serving an assigned partition with empty data.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the partition is assigned.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn activate(&self, partition: PartitionId) -> GridResult<()> {
        let hosted = self.existing(partition, Transition::Activate)?;
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let next = Self::next_state(partition, guard.state, Transition::Activate)?;
        guard.store.clear();
        guard.state = next;
        info!(member = %self.id, partition = %partition, "partition activated");
        Ok(())
    }

    /// Installs entries received from `from`, which is this member itself
    /// when restoring from the local backup.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the partition is owned or departing,
    /// or a store error.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn arrive(
        &self,
        partition: PartitionId,
        from: MemberId,
        entries: &PartitionSnapshot,
    ) -> GridResult<()> {
        let hosted = self.hosted(partition);
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let next = Self::next_state(partition, guard.state, Transition::Arrive)?;
        guard.store.restore(entries)?;
        guard.state = next;

        self.announce(
            TransferEvent::new(TransferEventType::Arrived, partition, self.id)
                .with_remote(from)
                .with_entries(entries),
        );
        Ok(())
    }

    /// Installs entries restored from persistent storage.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the partition is owned or departing,
    /// or a store error.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn recover(&self, partition: PartitionId, entries: &PartitionSnapshot) -> GridResult<()> {
        let hosted = self.hosted(partition);
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let next = Self::next_state(partition, guard.state, Transition::Recover)?;
        guard.store.restore(entries)?;
        guard.state = next;

        self.announce(
            TransferEvent::new(TransferEventType::Recovered, partition, self.id)
                .with_entries(entries),
        );
        Ok(())
    }

    /// Declares the partition's data lost and takes ownership with an empty
    /// store.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the partition is departing.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn declare_lost(&self, partition: PartitionId) -> GridResult<()> {
        let hosted = self.hosted(partition);
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let next = Self::next_state(partition, guard.state, Transition::Lose)?;
        guard.store.clear();
        guard.state = next;

        self.announce(TransferEvent::new(TransferEventType::Lost, partition, self.id));
        Ok(())
    }

    /// Starts transferring an owned partition to `to`.
    ///
    /// Returns the entries to ship. Requests are rejected with
    /// `TransferInProgress` until the departure completes or rolls back.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the partition is owned, or a store
    /// error.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn begin_departure(
        &self,
        partition: PartitionId,
        to: MemberId,
    ) -> GridResult<PartitionSnapshot> {
        let hosted = self.existing(partition, Transition::Depart { to })?;
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let next = Self::next_state(partition, guard.state, Transition::Depart { to })?;
        let entries = guard.store.snapshot()?;
        guard.state = next;

        self.announce(
            TransferEvent::new(TransferEventType::Departing, partition, self.id)
                .with_remote(to)
                .with_entries(&entries),
        );
        Ok(entries)
    }

    /// Completes a transfer-out: local data is dropped.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the partition is departing.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn complete_departure(&self, partition: PartitionId) -> GridResult<()> {
        let hosted = self.existing(partition, Transition::CompleteDeparture)?;
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let from = guard.state;
        let next = Self::next_state(partition, from, Transition::CompleteDeparture)?;
        guard.store.clear();
        guard.state = next;

        let mut event = TransferEvent::new(TransferEventType::Departed, partition, self.id);
        if let PartitionState::Departing { to } = from {
            event = event.with_remote(to);
        }
        self.announce(event);
        Ok(())
    }

    /// Abandons a transfer-out: ownership and entries are kept as they were.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the partition is departing.
    ///
    /// # Panics
    ///
    /// Panics if the partition lock is poisoned.
    pub fn rollback_departure(&self, partition: PartitionId) -> GridResult<()> {
        let hosted = self.existing(partition, Transition::Rollback)?;
        let mut guard = hosted.lock().expect("partition lock poisoned");
        let from = guard.state;
        guard.state = Self::next_state(partition, from, Transition::Rollback)?;

        let mut event = TransferEvent::new(TransferEventType::Rollback, partition, self.id);
        if let PartitionState::Departing { to } = from {
            event = event.with_remote(to);
        }
        self.announce(event);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn lookup(&self, partition: PartitionId) -> Option<Arc<Mutex<HostedPartition>>> {
        let partitions = self.partitions.read().expect("partitions lock poisoned");
        partitions.get(&partition).map(Arc::clone)
    }

    /// Looks up a partition for a transition that is invalid from
    /// `Unowned`.
    fn existing(
        &self,
        partition: PartitionId,
        transition: Transition,
    ) -> GridResult<Arc<Mutex<HostedPartition>>> {
        self.lookup(partition)
            .ok_or(GridError::InvalidTransition {
                partition,
                from: PartitionState::Unowned,
                transition: transition.name(),
            })
    }

    /// Returns the partition, creating an unowned entry on first use. Only
    /// transitions that can start from `Unowned` create entries.
    fn hosted(&self, partition: PartitionId) -> Arc<Mutex<HostedPartition>> {
        if let Some(hosted) = self.lookup(partition) {
            return hosted;
        }

        let mut partitions = self.partitions.write().expect("partitions lock poisoned");
        let hosted = partitions.entry(partition).or_insert_with(|| {
            let store = PartitionStore::new(
                partition,
                Arc::clone(&self.config),
                self.limits,
                (self.store_factory)(partition),
            );
            Arc::new(Mutex::new(HostedPartition {
                state: PartitionState::Unowned,
                store,
            }))
        });
        Arc::clone(hosted)
    }

    const fn ensure_serving(partition: PartitionId, state: PartitionState) -> GridResult<()> {
        match state {
            PartitionState::Owned => Ok(()),
            PartitionState::Departing { to } => {
                Err(GridError::TransferInProgress { partition, to })
            }
            PartitionState::Unowned | PartitionState::Assigned => {
                Err(GridError::NotOwned { partition, state })
            }
        }
    }

    fn next_state(
        partition: PartitionId,
        from: PartitionState,
        transition: Transition,
    ) -> GridResult<PartitionState> {
        from.apply(transition)
            .ok_or(GridError::InvalidTransition {
                partition,
                from,
                transition: transition.name(),
            })
    }

    fn announce(&self, event: TransferEvent<'_>) {
        info!(
            member = %self.id,
            partition = %event.partition,
            kind = %event.kind,
            remote = ?event.remote_member,
            "partition transfer event"
        );
        self.registry.dispatch_transfer(&event);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use folio_core::CapacityUnit;
    use folio_partition::OfferRequest;

    use super::*;

    const P: PartitionId = PartitionId::new(0);

    fn member() -> Member {
        Member::new(
            MemberId::new(1),
            Arc::new(TopicConfig::new("t").with_page_capacity(2, CapacityUnit::Elements)),
            InterceptorRegistry::new(),
        )
        .unwrap()
    }

    fn hosted_count(member: &Member) -> usize {
        member.partitions.read().unwrap().len()
    }

    fn offer(member: &Member, value: &'static [u8]) -> GridResult<CommandResult> {
        member.invoke(
            P,
            &Command::Offer(OfferRequest::new(vec![Bytes::from_static(value)])),
        )
    }

    #[test]
    fn test_unowned_partition_rejects_requests() {
        let member = member();
        let err = offer(&member, b"a").unwrap_err();
        assert!(matches!(err, GridError::NotOwned { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rejected_requests_host_nothing() {
        let member = member();
        for p in 0..100 {
            let partition = PartitionId::new(p);
            assert!(matches!(
                member.invoke(partition, &Command::Initialise),
                Err(GridError::NotOwned { .. })
            ));
            assert!(matches!(
                member.evict(partition, &[Position::origin()]),
                Err(GridError::NotOwned { .. })
            ));
            assert!(member.snapshot(partition).unwrap().is_empty());
            assert!(matches!(
                member.activate(partition),
                Err(GridError::InvalidTransition { .. })
            ));
        }
        assert_eq!(hosted_count(&member), 0);

        member.assign(P).unwrap();
        assert_eq!(hosted_count(&member), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        for config in [
            TopicConfig::new("t").with_max_poll_bytes(0),
            TopicConfig::new("t").with_page_capacity(0, CapacityUnit::Elements),
        ] {
            let err = Member::new(MemberId::new(1), Arc::new(config), InterceptorRegistry::new())
                .unwrap_err();
            assert!(!err.is_retryable());
            assert!(matches!(
                err,
                GridError::Partition(folio_partition::PartitionError::Invalid(
                    folio_core::Error::InvalidArgument { .. }
                ))
            ));
        }
    }

    #[test]
    fn test_assign_then_activate_serves() {
        let member = member();
        member.assign(P).unwrap();
        assert!(matches!(offer(&member, b"a"), Err(GridError::NotOwned { .. })));

        member.activate(P).unwrap();
        offer(&member, b"a").unwrap();
        assert_eq!(member.owned_partitions(), vec![P]);
    }

    #[test]
    fn test_departing_rejects_requests() {
        let member = member();
        member.declare_lost(P).unwrap();
        member.begin_departure(P, MemberId::new(2)).unwrap();

        let err = offer(&member, b"a").unwrap_err();
        assert!(matches!(err, GridError::TransferInProgress { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_complete_departure_drops_data() {
        let member = member();
        member.declare_lost(P).unwrap();
        offer(&member, b"a").unwrap();

        let shipped = member.begin_departure(P, MemberId::new(2)).unwrap();
        assert_eq!(shipped.elements.len(), 1);
        member.complete_departure(P).unwrap();

        assert_eq!(member.state(P), PartitionState::Unowned);
        assert!(member.snapshot(P).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_transition_reported() {
        let member = member();
        let err = member.rollback_departure(P).unwrap_err();
        assert!(matches!(
            err,
            GridError::InvalidTransition {
                transition: "rollback",
                ..
            }
        ));
    }

    #[test]
    fn test_arrive_installs_entries() {
        let source = member();
        source.declare_lost(P).unwrap();
        offer(&source, b"a").unwrap();
        let shipped = source.begin_departure(P, MemberId::new(2)).unwrap();

        let target = Member::new(
            MemberId::new(2),
            Arc::new(TopicConfig::new("t").with_page_capacity(2, CapacityUnit::Elements)),
            InterceptorRegistry::new(),
        )
        .unwrap();
        target.arrive(P, source.id(), &shipped).unwrap();
        assert_eq!(target.snapshot(P).unwrap(), shipped);
        assert!(target.state(P).is_owned());
    }
}
