//! # Backing Store
//!
//! The one contiguous region every pool block is carved from.
//!
//! ## Safety Note
//!
//! The store hands out raw block pointers and reinterprets the first four
//! bytes of a *free* block as its free-list link. The rules:
//!
//! - A link is only written while the block is free (owned by the pool).
//! - A link may be read by a racing `pop` after the block went live again,
//!   while its new owner writes the same bytes through a plain pointer.
//!   That mixed atomic/non-atomic access is a data race under the Rust
//!   memory model and is accepted deliberately: the read goes through
//!   `AtomicU32`, the region stays mapped for the store's whole lifetime,
//!   and the possibly torn value is thrown away by the tagged CAS in
//!   [`super::free_stack`]. Nothing here is verified sound by Miri or loom.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;

use super::heap::SystemAllocator;
use super::size_class::{GRANULES_PER_SUPER_BLOCK, GRANULE_SIZE, SUPER_BLOCK_SIZE};
use crate::error::{PoolError, PoolResult};

/// Largest number of granules a node index can name (`u32::MAX` means empty).
const MAX_GRANULES: usize = u32::MAX as usize;

/// Owned, fixed-capacity raw byte buffer aligned to [`SUPER_BLOCK_SIZE`].
pub(crate) struct BackingStore {
    /// Start of the region, `None` for a zero-capacity store.
    base: Option<NonNull<u8>>,
    /// Capacity in bytes, always a multiple of [`SUPER_BLOCK_SIZE`].
    capacity: usize,
}

// SAFETY: the store is a plain byte region. Concurrent access to individual
// blocks is coordinated by the free lists and the caller contract.
unsafe impl Send for BackingStore {}
// SAFETY: see above; the only shared mutation is through `AtomicU32` links.
unsafe impl Sync for BackingStore {}

impl BackingStore {
    /// Acquires `capacity` bytes from `heap`.
    ///
    /// `capacity` must already be a multiple of [`SUPER_BLOCK_SIZE`]. Zero
    /// yields an empty store without touching the allocator.
    pub(crate) fn acquire<H: SystemAllocator>(heap: &H, capacity: usize) -> PoolResult<Self> {
        debug_assert_eq!(capacity % SUPER_BLOCK_SIZE, 0);

        if capacity == 0 {
            return Ok(Self::empty());
        }

        let limit = (MAX_GRANULES / GRANULES_PER_SUPER_BLOCK as usize).saturating_mul(SUPER_BLOCK_SIZE);
        if capacity > limit {
            return Err(PoolError::CapacityOverflow { bytes: capacity, limit });
        }

        let base = heap
            .aligned_alloc(capacity, SUPER_BLOCK_SIZE)
            .ok_or(PoolError::BackingStoreAcquisition { bytes: capacity })?;

        Ok(Self {
            base: Some(base),
            capacity,
        })
    }

    /// A store with no memory behind it.
    pub(crate) const fn empty() -> Self {
        Self {
            base: None,
            capacity: 0,
        }
    }

    /// Capacity in bytes.
    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of super-blocks in the store.
    #[inline]
    pub(crate) const fn super_block_count(&self) -> usize {
        self.capacity / SUPER_BLOCK_SIZE
    }

    /// Returns the address of the block starting at granule `slot`.
    #[inline]
    pub(crate) fn block_ptr(&self, slot: u32) -> NonNull<u8> {
        let base = self.base_or_dangling();
        debug_assert!((slot as usize) * GRANULE_SIZE < self.capacity);
        // SAFETY: `slot` names a granule inside the store, so the offset stays
        // in bounds and the result is non-null.
        unsafe { NonNull::new_unchecked(base.as_ptr().add(slot as usize * GRANULE_SIZE)) }
    }

    /// Maps a block pointer back to its granule index.
    ///
    /// The pointer is not validated in release builds. Handing in a pointer
    /// that did not come from this store is a caller-contract violation.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn slot_of(&self, ptr: NonNull<u8>) -> u32 {
        debug_assert!(self.contains(ptr), "pointer does not belong to this pool");
        let offset = (ptr.as_ptr() as usize).wrapping_sub(self.base_or_dangling().as_ptr() as usize);
        // Capacity is bounded by `MAX_GRANULES` at acquisition.
        (offset / GRANULE_SIZE) as u32
    }

    /// Whether `ptr` points at a granule boundary inside the store.
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        let Some(base) = self.base else {
            return false;
        };
        let start = base.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        addr >= start && addr < start + self.capacity && (addr - start) % GRANULE_SIZE == 0
    }

    /// The free-list link stored in the first bytes of the block at `slot`.
    ///
    /// Only meaningful while that block is free.
    #[inline]
    pub(crate) fn link(&self, slot: u32) -> &AtomicU32 {
        let ptr = self.block_ptr(slot).cast::<u32>();
        // SAFETY: blocks are at least 128-byte aligned and 128 bytes long, so
        // the pointer is valid and aligned for a `u32` for as long as `self`
        // lives. All link accesses go through this atomic view.
        unsafe { AtomicU32::from_ptr(ptr.as_ptr()) }
    }

    /// Returns the region to `heap`. The store is empty afterwards.
    pub(crate) fn release<H: SystemAllocator>(&mut self, heap: &H) {
        if let Some(base) = self.base.take() {
            // SAFETY: `base` came from `aligned_alloc(capacity, SUPER_BLOCK_SIZE)`
            // on this heap and `take` guarantees it is freed once.
            unsafe { heap.aligned_free(base, self.capacity, SUPER_BLOCK_SIZE) };
        }
        self.capacity = 0;
    }

    fn base_or_dangling(&self) -> NonNull<u8> {
        self.base.unwrap_or(NonNull::dangling())
    }
}
