//! Consistency checker: a diagnostic full-heap walk.
//!
//! Validates every block's tag symmetry and the exact tiling of the heap.
//! Diagnostic only; never called from the allocation path.

use core::fmt;

use alloc::vec::Vec;

use crate::heap::HeapManager;
use crate::policy::AllocationPolicy;
use crate::segment::DataSegment;
use crate::tag::{BlockStatus, BoundaryTag, HeapAddr, WORD_SIZE};

/// One block as seen by the checker.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    /// Header address of the block.
    pub start: HeapAddr,
    /// Size from the header tag.
    pub size: usize,
    /// Status from the header tag.
    pub status: BlockStatus,
    /// The footer tag, for mismatch reporting.
    pub footer: BoundaryTag,
    /// True if the footer tag differs from the header tag.
    pub footer_mismatch: bool,
}

/// Result of a full-heap consistency walk.
#[derive(Debug, Clone)]
pub struct HeapReport {
    /// Physical start of the data segment.
    pub ds_start: usize,
    /// Current break of the data segment.
    pub ds_brk: usize,
    /// Logical start of the heap.
    pub heap_start: HeapAddr,
    /// Logical end of the heap.
    pub heap_end: HeapAddr,
    /// Active allocation policy.
    pub policy: AllocationPolicy,
    /// Next-fit cursor.
    pub next_block: HeapAddr,
    /// Tag of the initial sentinel half-block.
    pub start_sentinel: BoundaryTag,
    /// Tag of the end sentinel half-block.
    pub end_sentinel: BoundaryTag,
    /// Every block encountered, in address order.
    pub blocks: Vec<BlockInfo>,
    /// Number of header/footer mismatches.
    pub errors: usize,
    /// True if a zero-size block aborted the traversal.
    pub truncated: bool,
    /// True if the walk ended exactly at `heap_end` with no errors.
    pub coherent: bool,
}

impl<S: DataSegment> HeapManager<S> {
    /// Walks every block from `heap_start` to `heap_end` and reports the
    /// structural state of the heap.
    pub fn check(&self) -> HeapReport {
        let stat = self.segment_stat();
        let mut blocks = Vec::new();
        let mut errors = 0;
        let mut truncated = false;

        let mut p = self.heap_start;
        while p < self.heap_end {
            let hdr = self.get(p);
            let size = hdr.size();

            if size == 0 || p + size > self.heap_end {
                // A zero-size or overlong block makes further traversal
                // meaningless.
                blocks.push(BlockInfo {
                    start: HeapAddr::new(p),
                    size,
                    status: hdr.status(),
                    footer: hdr,
                    footer_mismatch: false,
                });
                truncated = true;
                break;
            }

            let footer = self.get(p + size - WORD_SIZE);
            let footer_mismatch = footer != hdr;
            if footer_mismatch {
                errors += 1;
            }
            blocks.push(BlockInfo {
                start: HeapAddr::new(p),
                size,
                status: hdr.status(),
                footer,
                footer_mismatch,
            });
            p += size;
        }

        HeapReport {
            ds_start: stat.start,
            ds_brk: stat.brk,
            heap_start: HeapAddr::new(self.heap_start),
            heap_end: HeapAddr::new(self.heap_end),
            policy: self.policy,
            next_block: HeapAddr::new(self.next_block),
            start_sentinel: self.get(self.heap_start - WORD_SIZE),
            end_sentinel: self.get(self.heap_end),
            blocks,
            errors,
            truncated,
            coherent: p == self.heap_end && errors == 0 && !truncated,
        }
    }

    /// Emits the consistency report through the `log` facade at info
    /// level.
    pub fn dump_check(&self) {
        let report = self.check();
        log::info!("{report}");
    }
}

impl fmt::Display for HeapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--------------------------------- heap check ---------------------------------")?;
        writeln!(f, "  ds_start:            {:#x}", self.ds_start)?;
        writeln!(f, "  ds_brk:              {:#x}", self.ds_brk)?;
        writeln!(f, "  heap_start:          {}", self.heap_start)?;
        writeln!(f, "  heap_end:            {}", self.heap_end)?;
        writeln!(f, "  allocation policy:   {}", self.policy)?;
        writeln!(f, "  next_block:          {}", self.next_block)?;
        writeln!(f)?;
        writeln!(
            f,
            "  initial sentinel:    size: {:6x} ({:7}), status: {}",
            self.start_sentinel.size(),
            self.start_sentinel.size(),
            self.start_sentinel.status()
        )?;
        writeln!(
            f,
            "  end sentinel:        size: {:6x} ({:7}), status: {}",
            self.end_sentinel.size(),
            self.end_sentinel.size(),
            self.end_sentinel.status()
        )?;
        writeln!(f)?;
        writeln!(f, "  blocks:")?;
        for block in &self.blocks {
            writeln!(
                f,
                "    {}: size: {:6x} ({:7}), status: {}",
                block.start, block.size, block.size, block.status
            )?;
            if block.footer_mismatch {
                writeln!(
                    f,
                    "    --> ERROR: footer with different properties: size: {:x}, status: {}",
                    block.footer.size(),
                    block.footer.status()
                )?;
            }
            if block.size == 0 {
                writeln!(f, "    WARNING: size 0 detected, aborting traversal.")?;
            }
        }
        writeln!(f)?;
        if self.coherent {
            writeln!(f, "  Block structure coherent.")?;
        }
        write!(f, "-------------------------------------------------------------------------------")
    }
}
