//! Heap layout constants, alignment helpers and boundary tags.

use core::fmt;

use static_assertions::const_assert;

/// Size of a heap word in bytes
pub const WORD_SIZE: usize = core::mem::size_of::<u64>();

/// Minimum block size; every block size is a multiple of this
pub const MIN_BLOCK_SIZE: usize = 32;

/// Unit by which the heap is extended or shrunk
pub const CHUNK_SIZE: usize = 1 << 12;

/// Size of the initial heap chunk requested at init time
pub const INIT_CHUNK_SIZE: usize = CHUNK_SIZE << 4;

const STATUS_MASK: u64 = 0x7;
const SIZE_MASK: u64 = !STATUS_MASK;

// A block must hold header, footer and two payload words.
const_assert!(MIN_BLOCK_SIZE.is_power_of_two());
const_assert!(MIN_BLOCK_SIZE >= 4 * WORD_SIZE);
const_assert!(CHUNK_SIZE % MIN_BLOCK_SIZE == 0);
const_assert!(INIT_CHUNK_SIZE % CHUNK_SIZE == 0);

/// Align value up to the given power-of-two boundary
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Align value down to the given power-of-two boundary
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// Allocation status of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Block is free and may be handed out by the locators.
    Free,
    /// Block is allocated (or is a sentinel half-block).
    Allocated,
}

impl BlockStatus {
    /// Returns true for [`BlockStatus::Free`].
    pub const fn is_free(self) -> bool {
        matches!(self, BlockStatus::Free)
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockStatus::Free => write!(f, "free"),
            BlockStatus::Allocated => write!(f, "allocated"),
        }
    }
}

/// A boundary tag: one word packing `(size, status)`.
///
/// The same tag is written at a block's first word (header) and last word
/// (footer), so the heap can be traversed in both directions from any block
/// boundary. The low three bits carry the status, the rest the size; sizes
/// are multiples of [`MIN_BLOCK_SIZE`], so the two never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct BoundaryTag(u64);

impl BoundaryTag {
    /// Packs a block size and status into a tag.
    pub const fn pack(size: usize, status: BlockStatus) -> Self {
        let bits = match status {
            BlockStatus::Free => 0,
            BlockStatus::Allocated => 1,
        };
        Self(((size as u64) & SIZE_MASK) | bits)
    }

    /// Reconstructs a tag from a raw heap word.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw word.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Extracts the block size.
    pub const fn size(self) -> usize {
        (self.0 & SIZE_MASK) as usize
    }

    /// Extracts the block status.
    pub const fn status(self) -> BlockStatus {
        if self.0 & STATUS_MASK == 0 {
            BlockStatus::Free
        } else {
            BlockStatus::Allocated
        }
    }

    /// Returns true if the tag marks a free block.
    pub const fn is_free(self) -> bool {
        self.status().is_free()
    }
}

/// An address within the data segment's byte-addressed space.
///
/// Payload addresses handed out by the heap manager are plain byte offsets,
/// not raw pointers; all accesses through them are bounds-checked against
/// the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HeapAddr(pub usize);

impl HeapAddr {
    /// Creates a new heap address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Checks if the address is word-aligned.
    pub const fn is_word_aligned(self) -> bool {
        self.0 % WORD_SIZE == 0
    }
}

impl From<usize> for HeapAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<HeapAddr> for usize {
    fn from(addr: HeapAddr) -> Self {
        addr.0
    }
}

impl fmt::Display for HeapAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(1, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 32), 64);
        assert_eq!(align_down(63, 32), 32);
        assert_eq!(align_down(64, 32), 64);
    }

    #[test]
    fn test_tag_pack_roundtrip() {
        let tag = BoundaryTag::pack(0x1240, BlockStatus::Free);
        assert_eq!(tag.size(), 0x1240);
        assert_eq!(tag.status(), BlockStatus::Free);
        assert!(tag.is_free());

        let tag = BoundaryTag::pack(0x20, BlockStatus::Allocated);
        assert_eq!(tag.size(), 0x20);
        assert_eq!(tag.status(), BlockStatus::Allocated);
        assert!(!tag.is_free());
    }

    #[test]
    fn test_sentinel_tag_is_zero_size_allocated() {
        let tag = BoundaryTag::pack(0, BlockStatus::Allocated);
        assert_eq!(tag.size(), 0);
        assert_eq!(tag.status(), BlockStatus::Allocated);
    }

    #[test]
    fn test_heap_addr() {
        let addr = HeapAddr::new(0x8020);
        assert_eq!(addr.as_usize(), 0x8020);
        assert!(addr.is_word_aligned());
        assert!(!HeapAddr::new(0x8021).is_word_aligned());
    }
}
