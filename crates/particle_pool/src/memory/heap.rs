//! # System Allocator Boundary
//!
//! The pool never talks to the global allocator directly. The backing store
//! and every oversized request go through [`SystemAllocator`], so an embedding
//! engine can route them into its own budgeted heaps.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::size_class::BLOCK_ALIGN;

/// General-purpose allocator consumed by the pool.
///
/// # Safety
///
/// Implementations must return memory that is valid for reads and writes of
/// `size` bytes, aligned to at least `align`, and not handed out again until
/// it is freed.
pub unsafe trait SystemAllocator: Send + Sync {
    /// Allocates `size` bytes aligned to `align` (a power of two).
    fn aligned_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>>;

    /// Releases memory obtained from [`SystemAllocator::aligned_alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `aligned_alloc(size, align)` on this allocator and
    /// must not be used afterwards.
    unsafe fn aligned_free(&self, ptr: NonNull<u8>, size: usize, align: usize);

    /// Allocates `size` bytes with the allocator's fixed alignment.
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.aligned_alloc(size, BLOCK_ALIGN)
    }

    /// Releases memory obtained from [`SystemAllocator::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc(size)` on this allocator.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        self.aligned_free(ptr, size, BLOCK_ALIGN);
    }

    /// Marks the start of a region whose allocations bypass subsystem budgets.
    fn enter_global_heap(&self) {}

    /// Marks the end of the region opened by [`SystemAllocator::enter_global_heap`].
    fn leave_global_heap(&self) {}
}

/// [`SystemAllocator`] backed by the Rust global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHeap;

// SAFETY: forwards to `std::alloc`, which upholds the trait contract.
unsafe impl SystemAllocator for SystemHeap {
    fn aligned_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        // Zero-sized layouts are not allowed by `alloc`.
        let layout = Layout::from_size_align(size.max(1), align).ok()?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn aligned_free(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        // SAFETY: the same layout was accepted by `aligned_alloc`.
        let layout = Layout::from_size_align_unchecked(size.max(1), align);
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

/// RAII marker: allocations made while it lives bypass the pool's context.
///
/// Dropping the guard leaves the global-heap region again.
pub struct GlobalHeapScope<'a, H: SystemAllocator + ?Sized> {
    heap: &'a H,
}

impl<'a, H: SystemAllocator + ?Sized> GlobalHeapScope<'a, H> {
    /// Enters the global-heap region of `heap`.
    #[must_use]
    pub fn enter(heap: &'a H) -> Self {
        heap.enter_global_heap();
        Self { heap }
    }
}

impl<H: SystemAllocator + ?Sized> Drop for GlobalHeapScope<'_, H> {
    fn drop(&mut self) {
        self.heap.leave_global_heap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicIsize, Ordering};

    #[derive(Default)]
    struct ScopedHeap {
        depth: AtomicIsize,
    }

    // SAFETY: forwards to `SystemHeap`.
    unsafe impl SystemAllocator for ScopedHeap {
        fn aligned_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
            SystemHeap.aligned_alloc(size, align)
        }

        unsafe fn aligned_free(&self, ptr: NonNull<u8>, size: usize, align: usize) {
            SystemHeap.aligned_free(ptr, size, align);
        }

        fn enter_global_heap(&self) {
            self.depth.fetch_add(1, Ordering::Relaxed);
        }

        fn leave_global_heap(&self) {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_system_heap_alignment() {
        let ptr = SystemHeap.aligned_alloc(8192, 4096).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 4096, 0);
        unsafe { SystemHeap.aligned_free(ptr, 8192, 4096) };

        let ptr = SystemHeap.alloc(1000).unwrap();
        assert_eq!(ptr.as_ptr() as usize % BLOCK_ALIGN, 0);
        unsafe { SystemHeap.free(ptr, 1000) };
    }

    #[test]
    fn test_global_heap_scope_balances() {
        let heap = ScopedHeap::default();
        {
            let _outer = GlobalHeapScope::enter(&heap);
            let _inner = GlobalHeapScope::enter(&heap);
            assert_eq!(heap.depth.load(Ordering::Relaxed), 2);
        }
        assert_eq!(heap.depth.load(Ordering::Relaxed), 0);
    }
}
