//! # Tagged Lock-Free Free List
//!
//! Intrusive Treiber stack of free blocks. Nodes are granule indices into the
//! [`BackingStore`]; the link to the next node lives inside the free block.
//!
//! ## ABA
//!
//! The head packs the top node index and a 32-bit generation into one `u64`:
//!
//! ```text
//!  63            32 31             0
//! ┌────────────────┬────────────────┐
//! │   generation   │   node index   │
//! └────────────────┴────────────────┘
//! ```
//!
//! Every successful push or pop bumps the generation, so a `pop` that read a
//! stale `next` link (because the node was popped, reused and pushed back in
//! between) fails its CAS and retries.

use std::sync::atomic::{AtomicU64, Ordering};

use super::backing::BackingStore;

/// Node index reserved for "no node".
const EMPTY: u32 = u32::MAX;

#[inline]
const fn pack(index: u32, tag: u32) -> u64 {
    ((tag as u64) << 32) | index as u64
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn unpack(head: u64) -> (u32, u32) {
    (head as u32, (head >> 32) as u32)
}

/// Lock-free stack of free granule indices.
pub(crate) struct FreeStack {
    head: AtomicU64,
}

impl FreeStack {
    /// Creates an empty stack.
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicU64::new(pack(EMPTY, 0)),
        }
    }

    /// Pushes the free block at `slot`.
    ///
    /// The block must be owned by the pool and on no other stack.
    pub(crate) fn push(&self, store: &BackingStore, slot: u32) {
        debug_assert_ne!(slot, EMPTY);
        let link = store.link(slot);
        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            let (top, tag) = unpack(current);
            link.store(top, Ordering::Relaxed);

            // Release publishes the link written above to the next popper.
            match self.head.compare_exchange_weak(
                current,
                pack(slot, tag.wrapping_add(1)),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Pops the most recently pushed block, or `None` when empty.
    pub(crate) fn pop(&self, store: &BackingStore) -> Option<u32> {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (top, tag) = unpack(current);
            if top == EMPTY {
                return None;
            }

            // Races with the new owner's writes if `top` was taken concurrently
            // (see the backing store's Safety Note); the tag discards the value.
            let next = store.link(top).load(Ordering::Relaxed);

            match self.head.compare_exchange_weak(
                current,
                pack(next, tag.wrapping_add(1)),
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(top),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drops every node without touching the blocks.
    pub(crate) fn clear(&mut self) {
        let (_, tag) = unpack(*self.head.get_mut());
        *self.head.get_mut() = pack(EMPTY, tag.wrapping_add(1));
    }

    /// Counts the nodes currently on the stack.
    ///
    /// Requires exclusive access: the walk follows links that concurrent
    /// pops would invalidate.
    pub(crate) fn len(&mut self, store: &BackingStore) -> usize {
        let (mut node, _) = unpack(*self.head.get_mut());
        let mut count = 0;
        while node != EMPTY {
            count += 1;
            node = store.link(node).load(Ordering::Relaxed);
        }
        count
    }

    /// Whether the stack currently has no nodes.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        unpack(self.head.load(Ordering::Acquire)).0 == EMPTY
    }
}
