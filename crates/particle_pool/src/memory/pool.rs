//! # Pool Allocator
//!
//! Size-class block allocator for particle state that is allocated and freed
//! at very high frequency from many worker threads.
//!
//! ```text
//!                 ┌──────────────────────────────────────┐
//!                 │            BackingStore              │
//!                 │ [SB 0][SB 1][SB 2] ... [SB n-1]      │
//!                 └──────────────────────────────────────┘
//!                                  │ Init / Reset
//!                                  ▼
//!                       ┌────────────────────┐
//!                       │ super-block stack  │
//!                       └─────────┬──────────┘
//!                  split on miss  │
//!           ┌─────────────────────┼─────────────────────┐
//!           ▼                     ▼                     ▼
//!     ┌───────────┐         ┌───────────┐         ┌───────────┐
//!     │ 128 stack │         │ 256 stack │         │ 512 stack │
//!     └───────────┘         └───────────┘         └───────────┘
//! ```
//!
//! Requests above 512 bytes bypass the pool and go to the [`SystemAllocator`].

#![allow(unsafe_code)]

use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use bytemuck::Pod;

use super::backing::BackingStore;
use super::free_stack::FreeStack;
use super::heap::{GlobalHeapScope, SystemAllocator, SystemHeap};
use super::size_class::{
    round_to_super_blocks, SizeClass, BLOCK_ALIGN, GRANULES_PER_SUPER_BLOCK,
};
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::usage::{ClassUsage, MemoryReport, MemoryUsageSnapshot, UsageCounters, UsageTracker};

/// A concurrent pool of 128, 256 and 512 byte blocks.
///
/// `allocate` and `deallocate` take `&self` and are lock-free. `reset` takes
/// `&mut self`, so it can never overlap an in-flight call.
///
/// # Caller Contract
///
/// None of these are checked in release builds:
///
/// - `deallocate` gets the same `size` that was passed to `allocate`.
/// - Only pointers from this pool are handed back, each once.
/// - No block is used after it was returned or after `reset`.
/// - `reset` is only called once every block is considered dead.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = PoolAllocator::new(16 << 20)?;
///
/// // Allocate - O(1), no heap allocation
/// let history = pool.allocate(96).ok_or(PoolError::Exhausted { size: 96 })?;
///
/// // Free - O(1), no heap deallocation
/// unsafe { pool.deallocate(history.as_ptr(), 96) };
///
/// // Between frames, once every emitter dropped its blocks
/// pool.reset();
/// ```
pub struct PoolAllocator<U: UsageTracker = UsageCounters, H: SystemAllocator = SystemHeap> {
    /// The storage region.
    store: BackingStore,
    /// Unsplit super-blocks.
    super_blocks: FreeStack,
    /// One free list per size class.
    classes: [FreeStack; SizeClass::COUNT],
    /// Usage counters (may be a no-op).
    usage: U,
    /// Source of the backing store and oversized blocks.
    heap: H,
    /// Log a memory report on every reset.
    report_on_reset: bool,
}

impl PoolAllocator {
    /// Creates a tracked pool of at least `byte_count` bytes on the global heap.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::BackingStoreAcquisition`] if the store cannot be
    /// allocated, or [`PoolError::CapacityOverflow`] if it is too large.
    pub fn new(byte_count: usize) -> PoolResult<Self> {
        Self::with_parts(byte_count, UsageCounters::default(), SystemHeap)
    }

    /// Creates a tracked pool on the global heap from a configuration.
    ///
    /// # Errors
    ///
    /// Same as [`PoolAllocator::new`].
    pub fn from_config(config: &PoolConfig) -> PoolResult<Self> {
        let mut pool = Self::new(config.byte_count()?)?;
        pool.report_on_reset = config.report_on_reset;
        Ok(pool)
    }
}

impl<U: UsageTracker, H: SystemAllocator> PoolAllocator<U, H> {
    /// Creates a pool with an explicit usage tracker and system allocator.
    ///
    /// `byte_count` is rounded up to whole super-blocks. Zero gives a valid
    /// pool that never serves a pooled size.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::BackingStoreAcquisition`] if `heap` refuses the
    /// store, or [`PoolError::CapacityOverflow`] if it is too large.
    pub fn with_parts(byte_count: usize, usage: U, heap: H) -> PoolResult<Self> {
        let capacity = round_to_super_blocks(byte_count).ok_or(PoolError::CapacityOverflow {
            bytes: byte_count,
            limit: usize::MAX,
        })?;

        let store = match BackingStore::acquire(&heap, capacity) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!("particle pool: {err}");
                return Err(err);
            }
        };

        let pool = Self {
            store,
            super_blocks: FreeStack::new(),
            classes: [FreeStack::new(), FreeStack::new(), FreeStack::new()],
            usage,
            heap,
            report_on_reset: false,
        };
        pool.partition();

        tracing::debug!(
            "particle pool ready: {} bytes in {} super-blocks",
            pool.capacity(),
            pool.super_block_count()
        );
        Ok(pool)
    }

    /// Returns the backing store size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Returns the number of super-blocks in the backing store.
    #[inline]
    #[must_use]
    pub const fn super_block_count(&self) -> usize {
        self.store.super_block_count()
    }

    /// Returns the system allocator behind the store and oversized blocks.
    #[inline]
    #[must_use]
    pub const fn system_allocator(&self) -> &H {
        &self.heap
    }

    /// Allocates a block for `size` bytes.
    ///
    /// Sizes up to 512 are served from the matching size class. This is a
    /// **O(1)** operation with **zero heap allocations**; `None` means the
    /// pool is exhausted and is never retried against the heap.
    ///
    /// Larger sizes go to the system allocator; `None` then means it failed.
    ///
    /// Every returned pointer is aligned to at least 16 bytes.
    #[inline]
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let Some(class) = SizeClass::for_size(size) else {
            return self.allocate_oversized(size);
        };

        let slot = match self.classes[class.index()].pop(&self.store) {
            Some(slot) => slot,
            None => self.refill(class)?,
        };

        self.usage.record_allocate(class, size);
        Some(self.store.block_ptr(slot))
    }

    /// Like [`PoolAllocator::allocate`], with the failure spelled out.
    ///
    /// # Errors
    ///
    /// [`PoolError::Exhausted`] for a pooled size with no free block,
    /// [`PoolError::OversizedAllocation`] if the system allocator failed.
    pub fn try_allocate(&self, size: usize) -> PoolResult<NonNull<u8>> {
        self.allocate(size).ok_or(if SizeClass::for_size(size).is_some() {
            PoolError::Exhausted { size }
        } else {
            PoolError::OversizedAllocation { size }
        })
    }

    /// Returns a block to the pool. A null `ptr` is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate(size)` on this pool with the
    /// same `size`, must not have been freed already, must not predate the
    /// last `reset`, and must not be used afterwards.
    #[inline]
    pub unsafe fn deallocate(&self, ptr: *mut u8, size: usize) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        let Some(class) = SizeClass::for_size(size) else {
            let _scope = GlobalHeapScope::enter(&self.heap);
            self.heap.free(ptr, size);
            return;
        };

        debug_assert_eq!(
            (ptr.as_ptr() as usize) % class.block_size(),
            0,
            "size {size} does not match the block's class"
        );
        let slot = self.store.slot_of(ptr);
        self.classes[class.index()].push(&self.store, slot);
        self.usage.record_deallocate(class, size);
    }

    /// Moves `value` into a freshly allocated block.
    ///
    /// Returns `None` when the pool is exhausted or `T` needs more than the
    /// fixed 16-byte alignment.
    pub fn allocate_pod<T: Pod>(&self, value: T) -> Option<NonNull<T>> {
        if align_of::<T>() > BLOCK_ALIGN {
            return None;
        }
        let ptr = self.allocate(size_of::<T>())?.cast::<T>();
        // SAFETY: the block is live, exclusively ours, at least `size_of::<T>()`
        // bytes and aligned for `T`.
        unsafe { ptr.as_ptr().write(value) };
        Some(ptr)
    }

    /// Allocates a zero-initialised `T`.
    pub fn allocate_zeroed<T: Pod>(&self) -> Option<NonNull<T>> {
        self.allocate_pod(T::zeroed())
    }

    /// Returns a block obtained from [`PoolAllocator::allocate_pod`].
    ///
    /// # Safety
    ///
    /// Same contract as [`PoolAllocator::deallocate`] with `size_of::<T>()`.
    pub unsafe fn deallocate_pod<T: Pod>(&self, ptr: NonNull<T>) {
        self.deallocate(ptr.cast::<u8>().as_ptr(), size_of::<T>());
    }

    /// Reclaims every block at once and rebuilds the super-block list.
    ///
    /// This is a **zero-heap-allocation** operation. Outstanding blocks are
    /// not tracked: any pointer handed out before the reset is dead.
    pub fn reset(&mut self) {
        if self.report_on_reset {
            self.log_memory_report();
        }

        for class in &mut self.classes {
            class.clear();
        }
        self.super_blocks.clear();
        self.partition();
        self.usage.reset();

        tracing::debug!("particle pool reset: {} super-blocks free", self.super_block_count());
    }

    /// Resets only if the usage tracker reports no live blocks.
    ///
    /// With [`crate::NoUsageTracking`] nothing is counted and this always
    /// resets.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::LiveAllocations`] and leaves the pool untouched
    /// while blocks are still handed out.
    pub fn try_reset(&mut self) -> PoolResult<()> {
        let outstanding = self.usage.outstanding_blocks();
        if outstanding > 0 {
            tracing::warn!("particle pool reset refused: {outstanding} blocks live");
            return Err(PoolError::LiveAllocations { outstanding });
        }
        self.reset();
        Ok(())
    }

    /// Returns the overall usage. All zeros when tracking is disabled.
    #[inline]
    #[must_use]
    pub fn total_memory_usage(&self) -> MemoryUsageSnapshot {
        self.usage.snapshot(self.capacity())
    }

    /// Returns the usage of one size class.
    #[inline]
    #[must_use]
    pub fn class_usage(&self, class: SizeClass) -> ClassUsage {
        self.usage.class_usage(class)
    }

    /// Builds a summary of used, freed and never-split memory.
    #[must_use]
    pub fn memory_report(&self) -> MemoryReport {
        let classes = SizeClass::ALL.map(|class| self.class_usage(class));
        MemoryReport::new(self.total_memory_usage(), &classes)
    }

    /// Writes [`PoolAllocator::memory_report`] to the log.
    pub fn log_memory_report(&self) {
        tracing::info!("{}", self.memory_report());
    }

    /// Whether any unsplit super-block is left.
    #[inline]
    #[must_use]
    pub fn has_free_super_blocks(&self) -> bool {
        !self.super_blocks.is_empty()
    }

    /// Counts unsplit super-blocks by walking the list.
    #[must_use]
    pub fn free_super_blocks(&mut self) -> usize {
        self.super_blocks.len(&self.store)
    }

    /// Counts free blocks currently on one size-class list.
    #[must_use]
    pub fn free_blocks(&mut self, class: SizeClass) -> usize {
        self.classes[class.index()].len(&self.store)
    }

    /// Pushes every super-block, highest address first, so pops ascend.
    fn partition(&self) {
        for index in (0..self.super_block_count()).rev() {
            // Capacity is bounded by the store's addressable limit.
            #[allow(clippy::cast_possible_truncation)]
            let slot = index as u32 * GRANULES_PER_SUPER_BLOCK;
            self.super_blocks.push(&self.store, slot);
        }
    }

    /// Splits one super-block into `class` and returns its lowest block.
    ///
    /// The remaining blocks are pushed highest address first, so consecutive
    /// allocations on one thread walk the super-block in ascending order.
    #[cold]
    fn refill(&self, class: SizeClass) -> Option<u32> {
        let Some(first) = self.super_blocks.pop(&self.store) else {
            tracing::trace!("particle pool exhausted for {} byte class", class.block_size());
            return None;
        };

        let stack = &self.classes[class.index()];
        for block in (1..GRANULES_PER_SUPER_BLOCK / class.granules()).rev() {
            stack.push(&self.store, first + block * class.granules());
        }
        self.usage.record_split(class);

        Some(first)
    }

    #[cold]
    fn allocate_oversized(&self, size: usize) -> Option<NonNull<u8>> {
        let _scope = GlobalHeapScope::enter(&self.heap);
        self.heap.alloc(size)
    }
}

impl<U: UsageTracker, H: SystemAllocator> Drop for PoolAllocator<U, H> {
    fn drop(&mut self) {
        self.store.release(&self.heap);
    }
}
