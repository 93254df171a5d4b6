//! Data segment provider interface and the simulated segment.
//!
//! The heap manager never talks to the OS directly; it consumes a
//! [`DataSegment`], a contiguous byte region `[start, brk)` that can be
//! extended or shrunk by a signed delta. [`SimSegment`] backs the region
//! with a `Vec<u8>` for tests and demos; `SystemSegment` (feature `std`,
//! unix) backs it with the real program break.

use core::fmt;

use alloc::vec::Vec;

/// Bounds and page size of a data segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStat {
    /// Physical start of the segment.
    pub start: usize,
    /// Current break (one past the last usable byte).
    pub brk: usize,
    /// Page size of the backing memory system.
    pub page_size: usize,
}

/// Errors reported by a data segment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    /// The provider cannot extend the region any further.
    Exhausted,
    /// A shrink request would move the break below the segment start.
    OutOfRange,
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::Exhausted => write!(f, "data segment exhausted"),
            SegmentError::OutOfRange => write!(f, "break adjustment out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SegmentError {}

/// A contiguous, growable byte region backing the heap.
///
/// Addresses are byte offsets in the provider's address space; `mem()`
/// exposes the bytes of `[start, brk)`, so address `a` lives at index
/// `a - start`. The heap manager performs all word and payload accesses
/// through these slices, which keeps every offset bounds-checked.
pub trait DataSegment {
    /// Reports the segment bounds and page size.
    fn stat(&self) -> SegmentStat;

    /// Adjusts the break by `delta` bytes and returns the new break.
    fn sbrk(&mut self, delta: isize) -> Result<usize, SegmentError>;

    /// The bytes of `[start, brk)`.
    fn mem(&self) -> &[u8];

    /// The bytes of `[start, brk)`, mutable.
    fn mem_mut(&mut self) -> &mut [u8];
}

/// Default start address of a [`SimSegment`].
pub const SIM_SEGMENT_START: usize = 0x10000;

/// Default page size reported by a [`SimSegment`].
pub const SIM_PAGE_SIZE: usize = 4096;

/// An in-memory data segment with a capacity limit.
///
/// Grows zero-filled and shrinks by truncation; refuses to extend past its
/// configured capacity, which makes provider-failure paths reachable from
/// tests without touching the real program break.
#[derive(Debug, Clone)]
pub struct SimSegment {
    mem: Vec<u8>,
    start: usize,
    capacity: usize,
    page_size: usize,
}

impl SimSegment {
    /// Creates a segment at the default start address with the given
    /// capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_layout(SIM_SEGMENT_START, capacity, SIM_PAGE_SIZE)
    }

    /// Creates a segment with an explicit start address, capacity and page
    /// size. Odd start addresses and a zero page size are accepted so the
    /// initializer's sanity checks can be exercised.
    pub fn with_layout(start: usize, capacity: usize, page_size: usize) -> Self {
        Self {
            mem: Vec::new(),
            start,
            capacity,
            page_size,
        }
    }
}

impl DataSegment for SimSegment {
    fn stat(&self) -> SegmentStat {
        SegmentStat {
            start: self.start,
            brk: self.start + self.mem.len(),
            page_size: self.page_size,
        }
    }

    fn sbrk(&mut self, delta: isize) -> Result<usize, SegmentError> {
        if delta >= 0 {
            let grown = self.mem.len() + delta as usize;
            if grown > self.capacity {
                return Err(SegmentError::Exhausted);
            }
            self.mem.resize(grown, 0);
        } else {
            let dec = delta.unsigned_abs();
            if dec > self.mem.len() {
                return Err(SegmentError::OutOfRange);
            }
            self.mem.truncate(self.mem.len() - dec);
        }
        Ok(self.start + self.mem.len())
    }

    fn mem(&self) -> &[u8] {
        &self.mem
    }

    fn mem_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }
}
