//! Store operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relbox_bench::utils::random_sample;
use relbox_core::{CoreResult, EntityId, Store, StoreConfig};
use relbox_testkit::Sample;
use tempfile::TempDir;

/// Benchmark single entity puts.
fn bench_single_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_put");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = Store::in_memory();
            let samples = store.box_for::<Sample>();
            let sample = random_sample(size);

            b.iter(|| {
                sample.id.set(0);
                black_box(samples.put(black_box(&sample)).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark batch puts in one transaction.
fn bench_batch_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_put");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let store = Store::in_memory();
                let samples = store.box_for::<Sample>();

                // Pre-generate data
                let batch: Vec<_> = (0..batch_size).map(|_| random_sample(256)).collect();

                b.iter(|| {
                    for sample in &batch {
                        sample.id.set(0);
                    }
                    black_box(samples.put_many(batch.iter()).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark reads.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let store = Store::in_memory();
    let samples = store.box_for::<Sample>();
    let batch: Vec<_> = (0..1000).map(|_| random_sample(256)).collect();
    let ids = samples.put_many(batch.iter()).unwrap();

    group.bench_function("single", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ids.len();
            black_box(samples.get(ids[i]).unwrap());
        });
    });

    group.bench_function("missing", |b| {
        b.iter(|| black_box(samples.get(EntityId::new(u64::MAX)).unwrap()));
    });

    group.throughput(Throughput::Elements(100));
    group.bench_function("many_100", |b| {
        b.iter(|| black_box(samples.get_many(&ids[..100]).unwrap()));
    });

    group.finish();
}

/// Benchmark transaction overhead.
fn bench_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("transactions");
    let store = Store::in_memory();

    group.bench_function("empty", |b| {
        b.iter(|| store.run_in_transaction(|| Ok(())).unwrap());
    });

    group.bench_function("nested_10", |b| {
        fn nest(store: &Store, depth: usize) -> CoreResult<()> {
            if depth == 0 {
                Ok(())
            } else {
                store.run_in_transaction(|| nest(store, depth - 1))
            }
        }
        b.iter(|| nest(&store, 10).unwrap());
    });

    group.finish();
}

/// Benchmark snapshot saves.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("save", count), count, |b, &count| {
            let dir = TempDir::new().unwrap();
            let config = StoreConfig::new().snapshot_path(dir.path().join("bench.rbx"));
            let store = Store::open(config).unwrap();
            let batch: Vec<_> = (0..count).map(|_| random_sample(256)).collect();
            store.box_for::<Sample>().put_many(batch.iter()).unwrap();

            b.iter(|| store.save_snapshot().unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_put,
    bench_batch_put,
    bench_get,
    bench_transactions,
    bench_snapshot,
);

criterion_main!(benches);
