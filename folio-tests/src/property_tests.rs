//! Randomized property tests over a single partition.
//!
//! Every property runs for the regression seeds plus `CI_SEED_COUNT` fresh
//! seeds. A failure names the seed so it can be replayed.

use bytes::Bytes;
use folio_core::{PageId, Position, SubscriberGroupId, TopicConfig};
use folio_partition::{
    Command, CommandResult, OfferRequest, PartitionStore, PollRequest, PollStatus,
    StoreFaultConfig, SubscribeRequest, SubscriberStart, TailAdvanceRequest, UnsubscribeRequest,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::properties::{
    assert_no_violations, check_exactly_once, check_partition, check_tail_monotonic,
};
use crate::scenarios::{payload, seeds, simulated_partition, topics};

/// Retries per invocation before a faulty store is considered stuck.
const MAX_ATTEMPTS: usize = 64;

fn all_seeds() -> impl Iterator<Item = u64> {
    seeds::REGRESSION_SEEDS
        .iter()
        .copied()
        .chain(1000..1000 + seeds::CI_SEED_COUNT)
}

fn publication_tail(store: &PartitionStore) -> Position {
    store
        .snapshot()
        .unwrap()
        .usage
        .map_or(Position::origin(), |usage| usage.publication_tail)
}

/// Invokes a command, retrying while the store reports retryable failures.
fn invoke_with_retry(store: &mut PartitionStore, command: &Command, seed: u64) -> CommandResult {
    for _ in 0..MAX_ATTEMPTS {
        match store.invoke(command) {
            Ok(result) => return result,
            Err(e) if e.is_retryable() => continue,
            Err(e) => panic!("seed {seed}: {} failed: {e}", command.name()),
        }
    }
    panic!("seed {seed}: {} kept failing", command.name());
}

fn random_config(rng: &mut ChaCha8Rng) -> TopicConfig {
    let config = if rng.gen_bool(0.5) {
        topics::element_pages(rng.gen_range(1..=6))
    } else {
        topics::byte_pages(rng.gen_range(8..=48))
    };
    if rng.gen_bool(0.25) {
        config.with_server_capacity(rng.gen_range(16..=128))
    } else {
        config
    }
}

// ============================================================================
// Tail Advance
// ============================================================================

#[test]
fn test_property_tail_advance_order_independent() {
    for seed in all_seeds() {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let requests: Vec<u64> = (0..rng.gen_range(1..20))
            .map(|_| rng.gen_range(0..50))
            .collect();
        let expected = requests.iter().copied().max().unwrap_or(0);

        let mut orders = vec![requests.clone(), requests.clone(), requests];
        orders[1].shuffle(&mut rng);
        orders[2].reverse();

        let mut finals = Vec::new();
        for order in &orders {
            let (mut store, backing) = simulated_partition(topics::element_pages(4), seed);
            for page in order {
                let before = publication_tail(&store);
                // Duplicates must be harmless.
                for _ in 0..rng.gen_range(1..=2) {
                    invoke_with_retry(
                        &mut store,
                        &Command::TailAdvance(TailAdvanceRequest::new(PageId::new(*page))),
                        seed,
                    );
                }
                let after = publication_tail(&store);
                if let Some(violation) = check_tail_monotonic(before, after) {
                    panic!("seed {seed}: {violation}");
                }
            }
            finals.push(backing.committed());
        }

        let tail = finals[0].usage.as_ref().unwrap().publication_tail;
        assert_eq!(
            tail,
            Position::page_start(PageId::new(expected)),
            "seed {seed}"
        );
        assert!(
            finals.windows(2).all(|w| w[0] == w[1]),
            "seed {seed}: orderings diverged"
        );
    }
}

// ============================================================================
// Structural Invariants
// ============================================================================

#[test]
fn test_property_random_operations_keep_partition_consistent() {
    crate::init_tracing();
    let groups: Vec<SubscriberGroupId> = (1..=3).map(SubscriberGroupId::new).collect();

    for seed in all_seeds() {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (mut store, backing) = simulated_partition(random_config(&mut rng), seed);

        for step in 0..200 {
            let group = *groups.choose(&mut rng).unwrap();
            let command = match rng.gen_range(0..100) {
                0..=39 => {
                    let elements = (0..rng.gen_range(0..5))
                        .map(|_| payload(&mut rng, 16))
                        .collect();
                    Command::Offer(OfferRequest::new(elements).with_seal(rng.gen_bool(0.1)))
                }
                40..=44 => {
                    let tail = publication_tail(&store).page.get();
                    Command::TailAdvance(TailAdvanceRequest::new(PageId::new(
                        tail + rng.gen_range(0..3),
                    )))
                }
                45..=79 => Command::Poll(PollRequest::new(group, rng.gen_range(1..8))),
                80..=86 => Command::Subscribe(SubscribeRequest {
                    group,
                    start: if rng.gen_bool(0.5) {
                        SubscriberStart::Earliest
                    } else {
                        SubscriberStart::Latest
                    },
                }),
                87..=91 => Command::Unsubscribe(UnsubscribeRequest { group }),
                _ => Command::Compact,
            };

            let before = publication_tail(&store);
            invoke_with_retry(&mut store, &command, seed);
            let after = publication_tail(&store);

            if let Some(violation) = check_tail_monotonic(before, after) {
                panic!("seed {seed} step {step}: {violation}");
            }
            assert_no_violations(
                &format!("seed {seed} step {step} ({})", command.name()),
                &check_partition(&backing.committed()),
            );
        }
    }
}

#[test]
fn test_property_failed_apply_leaves_no_trace() {
    for seed in all_seeds() {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (mut store, backing) = simulated_partition(topics::element_pages(3), seed);
        let group = SubscriberGroupId::new(1);

        for _ in 0..30 {
            let command = if rng.gen_bool(0.6) {
                let elements = (0..rng.gen_range(1..5))
                    .map(|_| payload(&mut rng, 8))
                    .collect();
                Command::Offer(OfferRequest::new(elements))
            } else {
                Command::Poll(PollRequest::new(group, rng.gen_range(1..4)))
            };

            let before = backing.committed();
            backing.fault_config().force_apply_fail = true;
            let err = store.invoke(&command);
            let after = backing.committed();

            // A command that writes nothing never reaches the store.
            match err {
                Err(e) => {
                    assert!(e.is_retryable(), "seed {seed}: {e}");
                    assert_eq!(before, after, "seed {seed}: partial write");
                }
                Ok(_) => assert_eq!(before, after, "seed {seed}: empty change set wrote"),
            }
            backing.fault_config().force_apply_fail = false;

            invoke_with_retry(&mut store, &command, seed);
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// A consumer that remembers the head it last saw and retries blindly.
struct Consumer {
    group: SubscriberGroupId,
    expected: Position,
    delivered: Vec<Position>,
    lost: Vec<Position>,
}

impl Consumer {
    fn poll(
        &mut self,
        store: &mut PartitionStore,
        rng: &mut ChaCha8Rng,
        lose_replies: bool,
        seed: u64,
    ) {
        let command = Command::Poll(
            PollRequest::new(self.group, rng.gen_range(1..6)).with_expected(self.expected),
        );
        let CommandResult::Polled(result) = invoke_with_retry(store, &command, seed) else {
            panic!("seed {seed}: poll returned another result");
        };

        match result.status {
            PollStatus::Delivered => {
                let positions = result.elements.iter().map(|e| e.position);
                if lose_replies && rng.gen_bool(0.2) {
                    // The head moved but the reply never arrived.
                    self.lost.extend(positions);
                } else {
                    self.delivered.extend(positions);
                    self.expected = result.next_index;
                }
            }
            PollStatus::AlreadyApplied => self.expected = result.next_index,
            PollStatus::PositionSkew { .. } => {
                panic!("seed {seed}: nothing is compacted, yet the head skewed")
            }
        }
    }
}

fn run_delivery(seed: u64, faults: StoreFaultConfig, lose_replies: bool) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (mut store, backing) = simulated_partition(topics::element_pages(3), seed);
    let group = SubscriberGroupId::new(7);

    let subscribe = Command::Subscribe(SubscribeRequest {
        group,
        start: SubscriberStart::Earliest,
    });
    let CommandResult::Subscribed(subscribed) = invoke_with_retry(&mut store, &subscribe, seed)
    else {
        panic!("seed {seed}: subscribe returned another result");
    };
    *backing.fault_config() = faults;

    let mut consumer = Consumer {
        group,
        expected: subscribed.head,
        delivered: Vec::new(),
        lost: Vec::new(),
    };

    for _ in 0..60 {
        if rng.gen_bool(0.5) {
            let elements: Vec<Bytes> = (0..rng.gen_range(1..4))
                .map(|_| payload(&mut rng, 8))
                .collect();
            invoke_with_retry(&mut store, &Command::Offer(OfferRequest::new(elements)), seed);
        } else {
            consumer.poll(&mut store, &mut rng, lose_replies, seed);
        }
    }

    // Drain what is left.
    *backing.fault_config() = StoreFaultConfig::none();
    let snapshot = backing.committed();
    let offered: Vec<Position> = snapshot.elements.keys().copied().collect();
    let tail = snapshot.usage.as_ref().unwrap().publication_tail;
    for _ in 0..MAX_ATTEMPTS {
        if consumer.expected >= tail {
            break;
        }
        consumer.poll(&mut store, &mut rng, false, seed);
    }

    let mut observed = Vec::new();
    let mut delivered = consumer.delivered.iter().peekable();
    let mut lost = consumer.lost.iter().peekable();
    // Merge in position order; each list is already ordered.
    loop {
        let next = match (delivered.peek(), lost.peek()) {
            (Some(d), Some(l)) if l < d => lost.next(),
            (Some(_), _) => delivered.next(),
            (None, Some(_)) => lost.next(),
            (None, None) => break,
        };
        observed.extend(next.copied());
    }

    assert_no_violations(
        &format!("seed {seed} delivered"),
        &check_exactly_once(&[], &consumer.delivered),
    );
    assert_no_violations(
        &format!("seed {seed} delivered or lost"),
        &check_exactly_once(&offered, &observed),
    );
    if !lose_replies {
        assert!(consumer.lost.is_empty());
    }
}

#[test]
fn test_property_poll_exactly_once_with_store_faults() {
    for seed in all_seeds() {
        run_delivery(seed, StoreFaultConfig::flaky(), false);
    }
}

#[test]
fn test_property_poll_retries_never_duplicate() {
    for seed in all_seeds() {
        run_delivery(seed, StoreFaultConfig::none(), true);
    }
}
