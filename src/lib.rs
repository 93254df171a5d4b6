//! Dynamic memory manager
//!
//! This crate implements a custom dynamic memory manager: an explicit
//! free-list heap with boundary-tag blocks over a raw, growable byte
//! region (the data segment).
//!
//! Heap organization:
//!
//! ```text
//!          initial sentinel half-block                 end sentinel half-block
//!                    |                                            |
//!      ds_start      |  heap_start                        heap_end        ds_brk
//!                |   |   |                                        |       |
//!                v   v   v                                        v       v
//!                +---+---+----------------------------------------+---+---+
//!                |???| S | h :                                : f | S |???|
//!                +---+---+----------------------------------------+---+---+
//!                        ^                                        ^
//!                        |                                        |
//!                32-byte aligned                          32-byte aligned
//! ```
//!
//! Every block starts and ends with a boundary tag, a single word packing
//! `(size, status)`; identical header and footer allow traversal in both
//! directions. Three selectable fit policies (first, next, best), block
//! splitting at 32-byte boundaries and immediate coalescing upon release
//! keep fragmentation under control; the backing segment grows and shrinks
//! on demand.
//!
//! The allocator does not talk to the OS itself: it consumes a
//! [`DataSegment`] provider. [`SimSegment`] simulates one in memory;
//! `SystemSegment` (feature `std`, unix) wraps the real program break.
//!
//! ```rust
//! use memmgr::{AllocationPolicy, HeapManager, SimSegment};
//!
//! let seg = SimSegment::new(1 << 20);
//! let mut mm = HeapManager::init(seg, AllocationPolicy::FirstFit);
//!
//! let p = mm.allocate(100);
//! mm.payload_mut(p)[..4].copy_from_slice(b"data");
//! mm.release(Some(p));
//! assert!(mm.check().coherent);
//! ```
//!
//! Single-threaded by contract: every operation takes `&mut self` and the
//! manager contains no locking. Callers needing concurrency must wrap the
//! manager in their own mutual-exclusion layer.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

pub mod check;
pub mod heap;
pub mod policy;
pub mod segment;
pub mod tag;

#[cfg(all(feature = "std", unix))]
pub mod system;

pub use check::{BlockInfo, HeapReport};
pub use heap::HeapManager;
pub use policy::AllocationPolicy;
pub use segment::{DataSegment, SegmentError, SegmentStat, SimSegment};
pub use tag::{BlockStatus, BoundaryTag, HeapAddr, CHUNK_SIZE, INIT_CHUNK_SIZE, MIN_BLOCK_SIZE, WORD_SIZE};

#[cfg(all(feature = "std", unix))]
pub use system::SystemSegment;

/// Sets the verbosity of the manager's log output.
///
/// 0 disables logging, 1 enables operation-level messages, 2 and above
/// enables full traversal traces. Maps onto the `log` facade's max level,
/// so it can be changed at runtime without recompilation.
pub fn set_log_verbosity(level: u8) {
    let filter = match level {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    log::set_max_level(filter);
}
