//! Storage backend benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use eventspool_bench::random_data;
use eventspool_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tempfile::TempDir;

/// Benchmark InMemoryBackend append operations.
fn bench_inmemory_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut backend = InMemoryBackend::new();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                backend.flush().unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark InMemoryBackend read operations.
fn bench_inmemory_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_read");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let backend = InMemoryBackend::with_data(random_data(size));

            b.iter(|| {
                let result = backend.read_at(black_box(0), black_box(size)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend append operations.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(50);

    for size in [256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let mut backend = FileBackend::create(&temp_dir.path().join("0")).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend read operations.
fn bench_file_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_read");
    group.sample_size(50);

    for size in [256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let mut backend = FileBackend::create(&temp_dir.path().join("0")).unwrap();
            backend.append(&random_data(size)).unwrap();
            backend.sync().unwrap();

            b.iter(|| {
                let result = backend.read_at(black_box(0), black_box(size)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend sync, the cost paid by every store flush.
fn bench_file_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sync");
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let mut backend = FileBackend::create(&temp_dir.path().join("0")).unwrap();
    let data = random_data(1024);

    group.bench_function("after_1kb_write", |b| {
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.sync().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_inmemory_append,
    bench_inmemory_read,
    bench_file_append,
    bench_file_read,
    bench_file_sync,
);

criterion_main!(benches);
