//! Offer and poll benchmarks.
//!
//! Measures processor throughput against the in-memory store for a few
//! page capacities.

#![allow(missing_docs)]

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use folio_core::{CapacityUnit, Limits, PartitionId, SubscriberGroupId, TopicConfig};
use folio_partition::{Command, MemoryStore, OfferRequest, PartitionStore, PollRequest};

const BATCH: usize = 64;
const PAYLOAD: &[u8] = &[0xAB; 256];

fn new_store(page_capacity: u32) -> PartitionStore {
    PartitionStore::new(
        PartitionId::new(0),
        Arc::new(TopicConfig::new("bench").with_page_capacity(page_capacity, CapacityUnit::Bytes)),
        Limits::new(),
        Box::new(MemoryStore::new()),
    )
}

fn batch() -> Vec<Bytes> {
    (0..BATCH).map(|_| Bytes::from_static(PAYLOAD)).collect()
}

fn bench_offer(c: &mut Criterion) {
    let mut group = c.benchmark_group("offer");
    group.throughput(Throughput::Elements(BATCH as u64));

    for capacity in [4 * 1024, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            let mut store = new_store(cap);
            let command = Command::Offer(OfferRequest::new(batch()));
            b.iter(|| black_box(store.invoke(&command).expect("offer failed")));
        });
    }
    group.finish();
}

fn bench_offer_then_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("offer_then_poll");
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("batch_64", |b| {
        let mut store = new_store(64 * 1024);
        let offer = Command::Offer(OfferRequest::new(batch()));
        #[allow(clippy::cast_possible_truncation)]
        let poll = Command::Poll(PollRequest::new(SubscriberGroupId::new(1), BATCH as u32));
        b.iter(|| {
            store.invoke(&offer).expect("offer failed");
            black_box(store.invoke(&poll).expect("poll failed"))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_offer, bench_offer_then_poll);
criterion_main!(benches);
