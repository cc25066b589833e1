//! # Usage Tracking
//!
//! Advisory counters for memory budgets and debug overlays.
//!
//! The counters are observational only: the allocator never reads them to
//! decide anything. Tracking is picked by type parameter, so a pool built with
//! [`NoUsageTracking`] has no atomic counter traffic on its hot path at all.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::memory::{SizeClass, SUPER_BLOCK_SIZE};

/// Point-in-time view of overall pool usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsageSnapshot {
    /// Bytes owned by the backing store.
    pub capacity: usize,
    /// Highest `current_in_use` seen since the last reset.
    pub historical_max: usize,
    /// Requested bytes currently handed out from pool classes.
    pub current_in_use: usize,
}

impl MemoryUsageSnapshot {
    /// Capacity not currently handed out.
    #[inline]
    #[must_use]
    pub const fn free_bytes(&self) -> usize {
        self.capacity.saturating_sub(self.current_in_use)
    }

    /// Whether usage has reached the full capacity.
    ///
    /// Always `false` for an untracked or zero-capacity pool.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.capacity > 0 && self.free_bytes() == 0
    }
}

/// Usage of a single size class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassUsage {
    /// Bytes of super-blocks split into this class.
    pub partitioned: usize,
    /// Requested bytes currently handed out from this class.
    pub in_use: usize,
}

/// Engine-style summary of where the pool's memory is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryReport {
    /// Overall usage.
    pub usage: MemoryUsageSnapshot,
    /// Bytes split into size classes but not handed out.
    pub pool_free: usize,
    /// Bytes in super-blocks that were never split.
    pub unsplit: usize,
}

impl MemoryReport {
    /// Builds a report from an overall snapshot and per-class usage.
    #[must_use]
    pub fn new(usage: MemoryUsageSnapshot, classes: &[ClassUsage]) -> Self {
        let partitioned: usize = classes.iter().map(|c| c.partitioned).sum();
        let in_use: usize = classes.iter().map(|c| c.in_use).sum();
        Self {
            usage,
            pool_free: partitioned.saturating_sub(in_use),
            unsplit: usage.capacity.saturating_sub(partitioned),
        }
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Particle heap: {} KB used, {} KB freed, {} KB unused (max {} KB of {} KB)",
            self.usage.current_in_use >> 10,
            self.pool_free >> 10,
            self.unsplit >> 10,
            self.usage.historical_max >> 10,
            self.usage.capacity >> 10,
        )
    }
}

/// Counter backend plugged into the pool.
pub trait UsageTracker: Default + Send + Sync {
    /// A block of `class` was handed out for a `size` byte request.
    fn record_allocate(&self, class: SizeClass, size: usize);

    /// A block of `class` that was requested with `size` bytes came back.
    fn record_deallocate(&self, class: SizeClass, size: usize);

    /// One super-block was split into `class`.
    fn record_split(&self, class: SizeClass);

    /// Zeroes every counter.
    fn reset(&self);

    /// Overall usage; `capacity` is the pool's store size.
    fn snapshot(&self, capacity: usize) -> MemoryUsageSnapshot;

    /// Usage of one size class.
    fn class_usage(&self, class: SizeClass) -> ClassUsage;

    /// Number of blocks handed out and not yet returned.
    fn outstanding_blocks(&self) -> usize;
}

#[derive(Default)]
struct ClassCounters {
    partitioned: AtomicUsize,
    in_use: AtomicUsize,
}

/// Atomic usage counters.
#[derive(Default)]
pub struct UsageCounters {
    in_use: AtomicUsize,
    historical_max: AtomicUsize,
    outstanding: AtomicUsize,
    classes: [ClassCounters; SizeClass::COUNT],
}

impl UsageCounters {
    /// Raises the high-water mark to at least `observed`.
    ///
    /// Stops as soon as the recorded maximum is already `>= observed`, so a
    /// thread that saw a lower in-use value never overwrites a higher one.
    fn raise_high_water(&self, observed: usize) {
        let mut max = self.historical_max.load(Ordering::Relaxed);
        while observed > max {
            match self.historical_max.compare_exchange_weak(
                max,
                observed,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(seen) => max = seen,
            }
        }
    }
}

impl UsageTracker for UsageCounters {
    #[inline]
    fn record_allocate(&self, class: SizeClass, size: usize) {
        let now = self.in_use.fetch_add(size, Ordering::Relaxed) + size;
        self.classes[class.index()].in_use.fetch_add(size, Ordering::Relaxed);
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        self.raise_high_water(now);
    }

    #[inline]
    fn record_deallocate(&self, class: SizeClass, size: usize) {
        self.in_use.fetch_sub(size, Ordering::Relaxed);
        self.classes[class.index()].in_use.fetch_sub(size, Ordering::Relaxed);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_split(&self, class: SizeClass) {
        self.classes[class.index()]
            .partitioned
            .fetch_add(SUPER_BLOCK_SIZE, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.in_use.store(0, Ordering::Relaxed);
        self.historical_max.store(0, Ordering::Relaxed);
        self.outstanding.store(0, Ordering::Relaxed);
        for class in &self.classes {
            class.partitioned.store(0, Ordering::Relaxed);
            class.in_use.store(0, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, capacity: usize) -> MemoryUsageSnapshot {
        let current_in_use = self.in_use.load(Ordering::Relaxed);
        // The two loads are not one atomic read; never report max < current.
        let historical_max = self.historical_max.load(Ordering::Relaxed).max(current_in_use);
        MemoryUsageSnapshot {
            capacity,
            historical_max,
            current_in_use,
        }
    }

    fn class_usage(&self, class: SizeClass) -> ClassUsage {
        let counters = &self.classes[class.index()];
        ClassUsage {
            partitioned: counters.partitioned.load(Ordering::Relaxed),
            in_use: counters.in_use.load(Ordering::Relaxed),
        }
    }

    fn outstanding_blocks(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

/// Tracker that records nothing and reports zeros.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoUsageTracking;

impl UsageTracker for NoUsageTracking {
    #[inline(always)]
    fn record_allocate(&self, _class: SizeClass, _size: usize) {}

    #[inline(always)]
    fn record_deallocate(&self, _class: SizeClass, _size: usize) {}

    #[inline(always)]
    fn record_split(&self, _class: SizeClass) {}

    fn reset(&self) {}

    fn snapshot(&self, _capacity: usize) -> MemoryUsageSnapshot {
        MemoryUsageSnapshot::default()
    }

    fn class_usage(&self, _class: SizeClass) -> ClassUsage {
        ClassUsage::default()
    }

    fn outstanding_blocks(&self) -> usize {
        0
    }
}
