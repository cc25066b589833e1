//! # Particle Pool
//!
//! Concurrent fixed-size-class allocator for per-particle state blocks:
//! - O(1) allocate and free from any number of worker threads
//! - No global lock, no per-block headers
//! - Bulk reset between simulation frames
//!
//! ## Architecture Rules
//!
//! 1. **One backing store** - Acquired once, split into 4 KB super-blocks
//! 2. **Three size classes** - 128, 256 and 512 bytes, refilled lazily
//! 3. **Free blocks are the free list** - Links live inside unused blocks
//! 4. **Oversized requests bypass the pool** - Straight to the system allocator
//!
//! ## Example
//!
//! ```rust,ignore
//! use particle_pool::{PoolAllocator, PoolConfig};
//!
//! let config = PoolConfig::from_toml_file("config/particles.toml")?;
//! let mut pool = PoolAllocator::from_config(&config)?;
//!
//! // Worker threads share `&pool`
//! let block = pool.allocate(96);
//!
//! // Frame boundary: every emitter released its blocks
//! pool.reset();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod usage;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use memory::{GlobalHeapScope, PoolAllocator, SizeClass, SystemAllocator, SystemHeap};
pub use usage::{
    ClassUsage, MemoryReport, MemoryUsageSnapshot, NoUsageTracking, UsageCounters, UsageTracker,
};
