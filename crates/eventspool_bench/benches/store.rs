//! Log store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use eventspool_bench::{fill, generate_records, memory_store, random_data, BENCH_BLOCK_SIZE};
use eventspool_core::{Address, SegmentedLogStore, StoreConfig};
use tempfile::TempDir;

/// Benchmark single record stores without flushing.
fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = memory_store(BENCH_BLOCK_SIZE).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let cursor = store.store(black_box(&data)).unwrap();
                black_box(cursor);
            });
        });
    }
    group.finish();
}

/// Benchmark a batch of stores followed by one flush.
fn bench_store_flush_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_flush_batch");
    group.sample_size(20);

    for batch in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        let records = generate_records(*batch, 256);

        group.bench_with_input(BenchmarkId::new("memory", batch), &records, |b, records| {
            let store = memory_store(BENCH_BLOCK_SIZE).unwrap();
            b.iter(|| fill(&store, records).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("file", batch), &records, |b, records| {
            let temp_dir = TempDir::new().unwrap();
            let config = StoreConfig::new(temp_dir.path(), "bench").block_size(BENCH_BLOCK_SIZE);
            let store = SegmentedLogStore::open(config).unwrap();
            b.iter(|| fill(&store, records).unwrap());
        });
    }
    group.finish();
}

/// Benchmark store throughput when small segments force frequent rollover.
fn bench_rollover(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollover");
    group.sample_size(20);

    for block_size in [512u64, 4096, 65536].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(block_size),
            block_size,
            |b, &block_size| {
                let records = generate_records(1000, 128);
                b.iter(|| {
                    let store = memory_store(block_size).unwrap();
                    fill(&store, &records).unwrap();
                    black_box(store.state());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark replaying flushed records from the clean boundary.
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let store = memory_store(64 * 1024).unwrap();
            fill(&store, &generate_records(count, 128)).unwrap();

            b.iter(|| {
                let mut read = 0usize;
                let mut next = store.retrieve(Address::ZERO).unwrap();
                while let Some(record) = next {
                    read += record.payload.len();
                    next = store.retrieve_next().unwrap();
                }
                black_box(read);
            });
        });
    }
    group.finish();
}

/// Benchmark the store, flush, consume, clean cycle of a spooling consumer.
fn bench_consume_and_clean(c: &mut Criterion) {
    let mut group = c.benchmark_group("consume_and_clean");
    group.sample_size(20);

    let records = generate_records(100, 256);
    group.bench_function("memory_100x256", |b| {
        let store = memory_store(16 * 1024).unwrap();
        b.iter(|| {
            let cursor = store.state().clean;
            fill(&store, &records).unwrap();

            let mut last = cursor;
            let mut next = store.retrieve(cursor).unwrap();
            while let Some(record) = next {
                last = record.next;
                next = store.retrieve_next().unwrap();
            }
            store.clean(last).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_store,
    bench_store_flush_batch,
    bench_rollover,
    bench_replay,
    bench_consume_and_clean,
);

criterion_main!(benches);
