//! Free-block selection policies.

use core::fmt;

/// Policy used to pick a free block for an allocation.
///
/// Fixed when the heap is initialized; [`reallocate`] temporarily overrides
/// it with a next-fit search anchored near the released block.
///
/// [`reallocate`]: crate::HeapManager::reallocate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Linear scan from the heap start; first block that fits wins.
    FirstFit,
    /// Circular scan resuming at the persisted cursor.
    NextFit,
    /// Full scan; smallest block that fits wins, first one on ties.
    BestFit,
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPolicy::FirstFit => write!(f, "first fit"),
            AllocationPolicy::NextFit => write!(f, "next fit"),
            AllocationPolicy::BestFit => write!(f, "best fit"),
        }
    }
}
