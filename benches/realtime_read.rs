use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rt_managed_value::{BatchCoordinator, ManagedValue, ManualScheduler};
use std::hint::black_box;

/// Benchmark: Real-time read on the live path
///
/// No batch is open, so every read takes the batch lock, drains pending entries
/// and loads the current value.
fn bench_realtime_read(c: &mut Criterion) {
    let coordinator = BatchCoordinator::new();
    let mut value = ManagedValue::builder(&coordinator)
        .scheduler(ManualScheduler::new())
        .build();
    value.set_raw(Box::new(0u64));
    let reader = value.reader();

    c.bench_function("realtime_read_live", |b| {
        b.iter(|| black_box(reader.get()));
    });
}

/// Benchmark: Real-time read while a batch holds the lock
///
/// Every read fails the try-lock and falls back to the snapshot.
fn bench_realtime_read_fallback(c: &mut Criterion) {
    let coordinator = BatchCoordinator::new();
    let mut value = ManagedValue::builder(&coordinator)
        .scheduler(ManualScheduler::new())
        .build();
    value.set_raw(Box::new(0u64));
    let reader = value.reader();

    coordinator.run_atomic_batch(|| {
        c.bench_function("realtime_read_snapshot", |b| {
            b.iter(|| black_box(reader.get()));
        });
    });
}

/// Benchmark: Write, read and reclaim cycles
///
/// Measures the full cost per retired value: `set_raw` on the writer, the
/// reader's quiescence hand-off and one driver tick releasing the batch.
fn bench_set_read_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_read_tick");

    for writes_per_cycle in [1, 8, 64].iter() {
        group.bench_with_input(
            BenchmarkId::new("writes_per_cycle", writes_per_cycle),
            writes_per_cycle,
            |b, &writes_per_cycle| {
                let coordinator = BatchCoordinator::new();
                let driver = ManualScheduler::new();
                let mut value = ManagedValue::builder(&coordinator)
                    .scheduler(driver.clone())
                    .build();
                value.set_raw(Box::new(0u64));
                let reader = value.reader();

                b.iter(|| {
                    for i in 0..writes_per_cycle {
                        value.set_raw(Box::new(i));
                    }
                    black_box(reader.get());
                    driver.tick();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: Atomic batches over several cells
///
/// Each iteration publishes one batch, then lets every cell's reader and driver
/// reclaim the values it replaced.
fn bench_atomic_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic_batch");

    for cells in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("cells", cells), cells, |b, &cells| {
            let coordinator = BatchCoordinator::new();
            let mut values: Vec<_> = (0..cells)
                .map(|_| {
                    let driver = ManualScheduler::new();
                    let mut value = ManagedValue::builder(&coordinator)
                        .scheduler(driver.clone())
                        .build();
                    value.set_raw(Box::new(0u64));
                    let reader = value.reader();
                    (value, reader, driver)
                })
                .collect();

            let mut generation = 0u64;
            b.iter(|| {
                generation += 1;
                coordinator.run_atomic_batch(|| {
                    for (value, _, _) in values.iter_mut() {
                        value.set_raw(Box::new(generation));
                    }
                });
                for (_, reader, driver) in values.iter() {
                    black_box(reader.get());
                    driver.tick();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_realtime_read,
    bench_realtime_read_fallback,
    bench_set_read_tick,
    bench_atomic_batch
);
criterion_main!(benches);
