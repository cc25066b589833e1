//! Integration tests for the single-threaded pool contract.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use particle_pool::{
    NoUsageTracking, PoolAllocator, PoolConfig, PoolError, SizeClass, SystemAllocator, SystemHeap,
    UsageCounters,
};

/// Calls observed by a [`CountingHeap`], shared so they outlive the pool.
#[derive(Default)]
struct HeapStats {
    fail: AtomicBool,
    aligned_allocs: AtomicUsize,
    aligned_frees: AtomicUsize,
    global_scopes: AtomicUsize,
}

/// System allocator that counts calls and can be told to fail.
#[derive(Default)]
struct CountingHeap {
    stats: Arc<HeapStats>,
}

// SAFETY: forwards to `SystemHeap`.
unsafe impl SystemAllocator for CountingHeap {
    fn aligned_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if self.stats.fail.load(Ordering::Relaxed) {
            return None;
        }
        self.stats.aligned_allocs.fetch_add(1, Ordering::Relaxed);
        SystemHeap.aligned_alloc(size, align)
    }

    unsafe fn aligned_free(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        self.stats.aligned_frees.fetch_add(1, Ordering::Relaxed);
        SystemHeap.aligned_free(ptr, size, align);
    }

    fn enter_global_heap(&self) {
        self.stats.global_scopes.fetch_add(1, Ordering::Relaxed);
    }
}

fn counting_pool(bytes: usize) -> PoolAllocator<UsageCounters, CountingHeap> {
    PoolAllocator::with_parts(bytes, UsageCounters::default(), CountingHeap::default()).unwrap()
}

#[test]
fn test_capacity_rounds_to_super_blocks() {
    for (requested, expected) in [
        (1, 4096),
        (4095, 4096),
        (4096, 4096),
        (4097, 8192),
        (10_000, 12_288),
    ] {
        let pool = PoolAllocator::new(requested).unwrap();
        assert_eq!(pool.capacity(), expected, "requested {requested}");
        assert_eq!(pool.total_memory_usage().capacity, expected);
    }
}

#[test]
fn test_size_routing() {
    let mut pool = counting_pool(3 * 4096);

    let cases = [
        (1, SizeClass::Small),
        (128, SizeClass::Small),
        (129, SizeClass::Medium),
        (256, SizeClass::Medium),
        (257, SizeClass::Large),
        (512, SizeClass::Large),
    ];
    for (size, class) in cases {
        let block = pool.allocate(size).unwrap();
        assert_eq!(block.as_ptr() as usize % class.block_size(), 0);
        assert_eq!(pool.class_usage(class).partitioned, 4096, "size {size}");
    }
    assert_eq!(pool.free_super_blocks(), 0);

    // Oversized: served by the heap, invisible to class accounting.
    let before = pool.total_memory_usage();
    let allocs_before = pool.system_allocator().stats.aligned_allocs.load(Ordering::Relaxed);

    let big = pool.allocate(513).unwrap();
    assert_eq!(pool.total_memory_usage(), before);
    assert_eq!(
        pool.system_allocator().stats.aligned_allocs.load(Ordering::Relaxed),
        allocs_before + 1
    );

    unsafe { pool.deallocate(big.as_ptr(), 513) };
    assert_eq!(pool.total_memory_usage(), before);
    assert_eq!(pool.system_allocator().stats.global_scopes.load(Ordering::Relaxed), 2);
}

#[test]
fn test_round_trip_returns_same_block() {
    // One super-block per class.
    let mut pool = PoolAllocator::new(3 * 4096).unwrap();
    for size in [1, 100, 128, 200, 256, 300, 512] {
        let block = pool.allocate(size).unwrap();
        unsafe { pool.deallocate(block.as_ptr(), size) };
        assert_eq!(pool.allocate(size).unwrap(), block, "size {size}");
    }
    assert_eq!(pool.free_super_blocks(), 0);
}

#[test]
fn test_exhaustion_with_one_super_block() {
    let pool = PoolAllocator::new(4096).unwrap();
    let blocks: Vec<_> = (0..8).map(|_| pool.allocate(512).unwrap()).collect();
    assert!(pool.allocate(512).is_none());

    // Exhaustion never fails over to the heap.
    assert!(pool.allocate(1).is_none());
    assert_eq!(pool.try_allocate(1), Err(PoolError::Exhausted { size: 1 }));
    assert_eq!(pool.total_memory_usage().current_in_use, 8 * 512);
    assert!(pool.total_memory_usage().is_exhausted());

    for block in blocks {
        unsafe { pool.deallocate(block.as_ptr(), 512) };
    }
    assert!(pool.allocate(512).is_some());
}

#[test]
fn test_reset_keeps_capacity_and_clears_usage() {
    let mut pool = PoolAllocator::new(5 * 4096).unwrap();
    let capacity = pool.total_memory_usage().capacity;

    for round in 0..4 {
        for size in [16, 160, 400, 64, 64] {
            let _ = pool.allocate(size + round).unwrap();
        }
        assert!(pool.total_memory_usage().current_in_use > 0);

        pool.reset();
        let usage = pool.total_memory_usage();
        assert_eq!(usage.capacity, capacity);
        assert_eq!(usage.current_in_use, 0);
        assert_eq!(usage.historical_max, 0);
        assert_eq!(pool.free_super_blocks(), 5);
    }
}

#[test]
fn test_high_water_mark_is_monotonic() {
    let pool = PoolAllocator::new(4 * 4096).unwrap();
    let mut live = Vec::new();
    let mut last_max = 0;

    let pattern = [300, 20, 500, 128, 256, 1, 77, 512, 200, 90];
    for (step, &size) in pattern.iter().cycle().take(60).enumerate() {
        if step % 3 == 2 {
            if let Some((block, size)) = live.pop() {
                unsafe { pool.deallocate(block, size) };
            }
        } else if let Some(block) = pool.allocate(size) {
            live.push((block.as_ptr(), size));
        }

        let usage = pool.total_memory_usage();
        assert!(usage.historical_max >= last_max);
        assert!(usage.historical_max >= usage.current_in_use);
        last_max = usage.historical_max;
    }
}

#[test]
fn test_null_deallocate_is_noop() {
    let mut pool = PoolAllocator::new(4096).unwrap();
    let _ = pool.allocate(50).unwrap();
    let usage = pool.total_memory_usage();
    let small_free = pool.free_blocks(SizeClass::Small);

    for size in [0, 1, 128, 256, 512, 4096] {
        unsafe { pool.deallocate(std::ptr::null_mut(), size) };
    }

    assert_eq!(pool.total_memory_usage(), usage);
    assert_eq!(pool.free_blocks(SizeClass::Small), small_free);
    assert_eq!(pool.free_blocks(SizeClass::Large), 0);
}

#[test]
fn test_lazy_split_scenario() {
    let pool = PoolAllocator::new(4096).unwrap();

    let mut blocks: Vec<usize> = (0..7)
        .map(|_| pool.allocate(100).unwrap().as_ptr() as usize)
        .collect();

    assert!(blocks.iter().all(|addr| addr % 128 == 0));
    blocks.sort_unstable();
    for pair in blocks.windows(2) {
        assert!(pair[1] - pair[0] >= 128, "blocks overlap");
    }
    assert_eq!(pool.class_usage(SizeClass::Small).partitioned, 4096);
}

#[test]
fn test_backing_store_failure_propagates() {
    let heap = CountingHeap::default();
    heap.stats.fail.store(true, Ordering::Relaxed);

    let result = PoolAllocator::with_parts(10_000, UsageCounters::default(), heap);
    assert!(matches!(
        result,
        Err(PoolError::BackingStoreAcquisition { bytes: 12_288 })
    ));
}

#[test]
fn test_zero_bytes_never_touches_heap() {
    let pool = counting_pool(0);
    assert_eq!(pool.capacity(), 0);
    assert!(pool.allocate(64).is_none());
    assert_eq!(pool.system_allocator().stats.aligned_allocs.load(Ordering::Relaxed), 0);
}

#[test]
fn test_store_released_once_on_drop() {
    let mut pool = counting_pool(4096);
    let stats = Arc::clone(&pool.system_allocator().stats);
    assert_eq!(stats.aligned_allocs.load(Ordering::Relaxed), 1);

    let _ = pool.allocate(64).unwrap();
    pool.reset();
    assert_eq!(stats.aligned_frees.load(Ordering::Relaxed), 0);

    drop(pool);
    assert_eq!(stats.aligned_frees.load(Ordering::Relaxed), 1);
}

#[test]
fn test_untracked_pool_reports_zeros() {
    let pool = PoolAllocator::with_parts(4096, NoUsageTracking, SystemHeap).unwrap();
    let _ = pool.allocate(64).unwrap();
    let usage = pool.total_memory_usage();
    assert_eq!((usage.capacity, usage.historical_max, usage.current_in_use), (0, 0, 0));
    assert_eq!(pool.capacity(), 4096);
}

#[test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!("particle_pool_{}.toml", std::process::id()));
    std::fs::write(&path, "pool_size_kb = 12\nreport_on_reset = true\n").unwrap();

    let config = PoolConfig::from_toml_file(&path).unwrap();
    assert_eq!(config.pool_size_kb, 12);
    assert!(config.report_on_reset);

    let pool = PoolAllocator::from_config(&config).unwrap();
    assert_eq!(pool.capacity(), 12 * 1024);
    assert_eq!(pool.super_block_count(), 3);

    std::fs::remove_file(&path).ok();
}
