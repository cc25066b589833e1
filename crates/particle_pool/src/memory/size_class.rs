//! # Size Classes
//!
//! The fixed set of block sizes served by the pool, and the geometry shared by
//! the backing store and the free lists.

/// Size of one super-block, the unit of capacity moved into a size class.
pub const SUPER_BLOCK_SIZE: usize = 4096;

/// Largest request served from the pool. Anything bigger goes to the heap.
pub const MAX_POOLED_SIZE: usize = 512;

/// Smallest block size. Free-list nodes are addressed in units of this size.
pub const GRANULE_SIZE: usize = 128;

/// Alignment guaranteed for every pointer the allocator hands out.
///
/// Pool blocks are in fact aligned to their class size; oversized blocks only
/// get this much from the general allocator.
pub const BLOCK_ALIGN: usize = 16;

/// Granules per super-block.
pub(crate) const GRANULES_PER_SUPER_BLOCK: u32 = (SUPER_BLOCK_SIZE / GRANULE_SIZE) as u32;

/// A pool-managed block size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SizeClass {
    /// 128 byte blocks.
    Small = 0,
    /// 256 byte blocks.
    Medium = 1,
    /// 512 byte blocks.
    Large = 2,
}

impl SizeClass {
    /// All size classes, smallest first.
    pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    /// Number of size classes.
    pub const COUNT: usize = Self::ALL.len();

    /// Returns the smallest class that fits `size`, or `None` when the request
    /// must be served by the general allocator.
    ///
    /// A zero-byte request is served from the smallest class.
    #[inline]
    #[must_use]
    pub const fn for_size(size: usize) -> Option<Self> {
        if size <= 128 {
            Some(Self::Small)
        } else if size <= 256 {
            Some(Self::Medium)
        } else if size <= MAX_POOLED_SIZE {
            Some(Self::Large)
        } else {
            None
        }
    }

    /// Block size in bytes.
    #[inline]
    #[must_use]
    pub const fn block_size(self) -> usize {
        match self {
            Self::Small => 128,
            Self::Medium => 256,
            Self::Large => 512,
        }
    }

    /// Number of blocks one super-block splits into.
    #[inline]
    #[must_use]
    pub const fn blocks_per_super_block(self) -> usize {
        SUPER_BLOCK_SIZE / self.block_size()
    }

    /// Index into per-class tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Block size in granules.
    #[inline]
    pub(crate) const fn granules(self) -> u32 {
        (self.block_size() / GRANULE_SIZE) as u32
    }
}

/// Rounds `bytes` up to a whole number of super-blocks.
///
/// Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn round_to_super_blocks(bytes: usize) -> Option<usize> {
    match bytes.checked_add(SUPER_BLOCK_SIZE - 1) {
        Some(padded) => Some(padded / SUPER_BLOCK_SIZE * SUPER_BLOCK_SIZE),
        None => None,
    }
}
