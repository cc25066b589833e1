//! # Particle Pool Benchmark
//!
//! ARCHITECT'S REQUIREMENTS:
//! - Allocate + free of a pooled block in the low tens of nanoseconds
//! - No degradation against the system allocator under contention
//! - Reset of a 16 MB pool well under a frame budget
//!
//! Run with: `cargo bench --package particle_pool`

// Benchmarks don't need docs and may have intentionally unused code
#![allow(missing_docs)]
#![allow(dead_code)]
#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, Layout};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use particle_pool::{NoUsageTracking, PoolAllocator, PoolConfig, SystemHeap};

/// Particles spawned per simulated burst.
const BURST: usize = 10_000;

/// Benchmark: single alloc/free pair per class, tracked and untracked.
fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free");

    let tracked = PoolAllocator::new(1 << 20).unwrap();
    let untracked = PoolAllocator::with_parts(1 << 20, NoUsageTracking, SystemHeap).unwrap();

    for size in [64usize, 200, 480] {
        group.bench_with_input(BenchmarkId::new("tracked", size), &size, |b, &size| {
            b.iter(|| {
                let block = tracked.allocate(black_box(size)).unwrap();
                unsafe { tracked.deallocate(block.as_ptr(), size) };
            });
        });

        group.bench_with_input(BenchmarkId::new("untracked", size), &size, |b, &size| {
            b.iter(|| {
                let block = untracked.allocate(black_box(size)).unwrap();
                unsafe { untracked.deallocate(block.as_ptr(), size) };
            });
        });

        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
            let layout = Layout::from_size_align(size, 16).unwrap();
            b.iter(|| unsafe {
                let ptr = alloc(black_box(layout));
                dealloc(ptr, layout);
            });
        });
    }

    group.finish();
}

/// Benchmark: a burst of particle spawns followed by a frame reset.
fn bench_burst_then_reset(c: &mut Criterion) {
    let mut pool = PoolAllocator::from_config(&PoolConfig::default()).unwrap();

    c.bench_function("burst_10k_then_reset", |b| {
        b.iter(|| {
            for i in 0..BURST {
                black_box(pool.allocate(32 + (i % 4) * 120));
            }
            pool.reset();
        });
    });
}

/// Benchmark: reset cost alone on the default 16 MB pool.
fn bench_reset(c: &mut Criterion) {
    let mut pool = PoolAllocator::from_config(&PoolConfig::default()).unwrap();

    c.bench_function("reset_16mb", |b| {
        b.iter(|| pool.reset());
    });
}

/// Benchmark: contended alloc/free from several emitter threads.
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = Arc::new(PoolAllocator::new(4 << 20).unwrap());
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for i in 0..1_000 {
                                let size = 16 + (i % 3) * 160;
                                if let Some(block) = pool.allocate(size) {
                                    unsafe { pool.deallocate(block.as_ptr(), size) };
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free,
    bench_burst_then_reset,
    bench_reset,
    bench_contended
);
criterion_main!(benches);
