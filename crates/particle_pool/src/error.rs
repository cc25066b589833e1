//! # Pool Error Types
//!
//! All errors that can be reported by the particle pool.
//!
//! Caller-contract violations (wrong size on free, foreign pointers, use after
//! reset) are NOT represented here. They are undefined behaviour that the hot
//! path does not pay to detect.

use thiserror::Error;

/// Errors that can occur in the particle pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The system allocator refused to provide the backing store.
    #[error("failed to acquire backing store of {bytes} bytes")]
    BackingStoreAcquisition {
        /// Requested store size, already rounded to the super-block size.
        bytes: usize,
    },

    /// The requested capacity cannot be addressed by the free lists.
    #[error("pool capacity {bytes} exceeds addressable limit of {limit} bytes")]
    CapacityOverflow {
        /// Requested capacity.
        bytes: usize,
        /// Largest capacity the pool can address.
        limit: usize,
    },

    /// Both the size-class list and the super-block list are empty.
    #[error("pool exhausted: no free block for a {size} byte request")]
    Exhausted {
        /// The size that was requested.
        size: usize,
    },

    /// The general allocator refused an oversized request.
    #[error("general allocator failed for oversized request of {size} bytes")]
    OversizedAllocation {
        /// The size that was requested.
        size: usize,
    },

    /// A checked reset found blocks that are still handed out.
    #[error("reset refused: {outstanding} allocations still live")]
    LiveAllocations {
        /// Number of blocks handed out and not yet returned.
        outstanding: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PoolError::Exhausted { size: 100 };
        assert_eq!(err.to_string(), "pool exhausted: no free block for a 100 byte request");

        let err = PoolError::LiveAllocations { outstanding: 3 };
        assert_eq!(err.to_string(), "reset refused: 3 allocations still live");
    }
}
