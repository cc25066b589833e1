//! # Memory Management
//!
//! One pre-allocated backing store carved into lock-free size-class lists.
//!
//! ## Design Philosophy
//!
//! All memory is allocated once at startup. During simulation:
//! - No heap allocations for blocks up to 512 bytes
//! - No locks, only short CAS retry loops
//! - One bulk reset between frames instead of per-block cleanup

mod backing;
mod free_stack;
mod heap;
mod pool;
mod size_class;

pub use heap::{GlobalHeapScope, SystemAllocator, SystemHeap};
pub use pool::PoolAllocator;
pub use size_class::{
    round_to_super_blocks, SizeClass, BLOCK_ALIGN, GRANULE_SIZE, MAX_POOLED_SIZE,
    SUPER_BLOCK_SIZE,
};
