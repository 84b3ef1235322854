//! Benchmarks for the lease pool.
//!
//! Benchmarks cover:
//! - Uncontended acquire/release on the resource pool
//! - Contended acquire/release across threads
//! - Result store append/drain
//! - End-to-end submit, wait_all and drain through the scheduler

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::thread;

use prometheus_lease_pool::config::SchedulerConfig;
use prometheus_lease_pool::core::{AppResult, Lease, ResourcePool, ResultStore, TaskScheduler};

// ============================================================================
// Helper Functions
// ============================================================================

fn numbered(index: usize) -> AppResult<usize> {
    Ok(index)
}

fn add_index(lease: Lease<usize>, n: u64) -> (Lease<usize>, AppResult<u64>) {
    let value = n + *lease as u64;
    (lease, Ok(value))
}

// ============================================================================
// ResourcePool Benchmarks
// ============================================================================

fn bench_pool_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_acquire_release");

    for size in [1, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let pool = ResourcePool::new(size, &numbered).unwrap();
            b.iter(|| {
                let lease = pool.acquire();
                black_box(*lease);
                pool.release(lease).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_pool_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_contended");
    const OPS_PER_THREAD: u64 = 500;

    for threads in [2_u64, 4, 8] {
        group.throughput(Throughput::Elements(threads * OPS_PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = ResourcePool::new(2, &numbered).unwrap();
            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..threads {
                        s.spawn(|| {
                            for _ in 0..OPS_PER_THREAD {
                                let lease = pool.acquire();
                                black_box(*lease);
                                drop(lease);
                            }
                        });
                    }
                });
            });
        });
    }
    group.finish();
}

// ============================================================================
// ResultStore Benchmarks
// ============================================================================

fn bench_result_store_append_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_store_append_drain");

    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let store = ResultStore::new();
            b.iter(|| {
                for i in 0..size {
                    store.append(i);
                }
                black_box(store.drain());
            });
        });
    }
    group.finish();
}

// ============================================================================
// End-to-End Scheduler Benchmarks
// ============================================================================

fn bench_scheduler_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_round_trip");
    const TASKS: u64 = 200;
    group.throughput(Throughput::Elements(TASKS));

    for workers in [1, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            let config = SchedulerConfig::new().with_max_workers(workers);
            let scheduler: TaskScheduler<usize, u64> = TaskScheduler::new(config, &numbered).unwrap();
            b.iter(|| {
                for n in 0..TASKS {
                    scheduler.submit(add_index, n).unwrap();
                }
                black_box(scheduler.wait_all());
                black_box(scheduler.drain_results());
            });
            scheduler.shutdown();
        });
    }
    group.finish();
}

criterion_group!(
    pool_benches,
    bench_pool_acquire_release,
    bench_pool_contended
);

criterion_group!(store_benches, bench_result_store_append_drain);

criterion_group!(scheduler_benches, bench_scheduler_round_trip);

criterion_main!(pool_benches, store_benches, scheduler_benches);
