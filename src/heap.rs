//! Heap manager core: initialization, allocation, release, growth.
//!
//! Block layout (all sizes are multiples of [`MIN_BLOCK_SIZE`]):
//!
//! ```text
//!   +--------+------------------------------------+--------+
//!   | header |              payload               | footer |
//!   +--------+------------------------------------+--------+
//!   ^ tag: (size, status)                 identical tag ^
//! ```
//!
//! The heap `[heap_start, heap_end)` is tiled exactly by such blocks and
//! bounded by two zero-size, permanently allocated sentinel half-blocks,
//! one word below `heap_start` and one word at `heap_end`, so traversal
//! and coalescing never have to special-case the edges.

use alloc::vec::Vec;

use log::{debug, trace};

use crate::policy::AllocationPolicy;
use crate::segment::{DataSegment, SegmentStat};
use crate::tag::{
    align_down, align_up, BlockStatus, BoundaryTag, HeapAddr, CHUNK_SIZE, INIT_CHUNK_SIZE,
    MIN_BLOCK_SIZE, WORD_SIZE,
};

/// An explicit free-list heap with boundary-tag blocks over a growable
/// data segment.
///
/// All operations take `&mut self`; the manager contains no internal
/// locking. Callers that need concurrent access must serialize it
/// themselves.
pub struct HeapManager<S: DataSegment> {
    seg: S,
    ds_start: usize,
    page_size: usize,
    pub(crate) heap_start: usize,
    pub(crate) heap_end: usize,
    pub(crate) policy: AllocationPolicy,
    pub(crate) next_block: usize,
}

impl<S: DataSegment> HeapManager<S> {
    /// Initializes a heap over the given data segment.
    ///
    /// Requests [`INIT_CHUNK_SIZE`] bytes from the provider, aligns the
    /// heap bounds to [`MIN_BLOCK_SIZE`], writes the sentinels and a
    /// single free block spanning the whole heap.
    ///
    /// # Panics
    ///
    /// Panics if the provider reports an uninitialized or dirty segment,
    /// a zero page size, or refuses to extend the segment. These are the
    /// fatal conditions of the allocation contract; they are never
    /// surfaced as recoverable errors.
    pub fn init(mut seg: S, policy: AllocationPolicy) -> Self {
        debug!("init, allocation policy: {policy}");

        let SegmentStat {
            start,
            brk,
            page_size,
        } = seg.stat();
        trace!("  ds start {start:#x}, brk {brk:#x}, page size {page_size}");

        if start == 0 {
            panic!("data segment not initialized");
        }
        if start != brk {
            panic!("heap not clean");
        }
        if page_size == 0 {
            panic!("reported page size == 0");
        }

        let brk = match seg.sbrk(INIT_CHUNK_SIZE as isize) {
            Ok(brk) => brk,
            Err(e) => panic!("cannot extend heap: {e}"),
        };
        trace!("  allocated initial chunk, brk now {brk:#x}");

        // The gap between the segment bounds and the aligned heap bounds
        // holds the sentinel words; rounding inward by one word first
        // keeps both sentinels inside [start, brk) for any bounds the
        // provider reports.
        let heap_start = align_up(start + WORD_SIZE, MIN_BLOCK_SIZE);
        let heap_end = align_down(brk - WORD_SIZE, MIN_BLOCK_SIZE);
        trace!("  heap [{heap_start:#x}, {heap_end:#x})");

        let mut mm = Self {
            seg,
            ds_start: start,
            page_size,
            heap_start,
            heap_end,
            policy,
            next_block: heap_start,
        };

        mm.put(heap_start - WORD_SIZE, BoundaryTag::pack(0, BlockStatus::Allocated));
        mm.put(heap_end, BoundaryTag::pack(0, BlockStatus::Allocated));
        mm.write_block(heap_start, heap_end - heap_start, BlockStatus::Free);

        mm
    }

    /// Allocates `size` bytes and returns the payload address.
    ///
    /// The returned address is word-aligned, lies within
    /// `[heap_start, heap_end)` and does not overlap any other live
    /// allocation. A failed in-heap search is absorbed by growing the
    /// segment and retrying; out-of-memory is never reported to the
    /// caller.
    ///
    /// # Panics
    ///
    /// Panics if the provider refuses to extend the segment when growth
    /// is required.
    pub fn allocate(&mut self, size: usize) -> HeapAddr {
        debug!("allocate({size:#x} ({size}))");

        let req = align_up(size + 2 * WORD_SIZE, MIN_BLOCK_SIZE);
        let start = match self.find_free_block(req) {
            Some(start) => start,
            None => self.grow(req),
        };

        let total = self.get(start).size();
        self.write_block(start, req, BlockStatus::Allocated);

        let rest = total - req;
        if rest > 0 {
            self.write_block(start + req, rest, BlockStatus::Free);
        }

        trace!("  allocated block at {start:#x}, payload {:#x}", start + WORD_SIZE);
        HeapAddr::new(start + WORD_SIZE)
    }

    /// Allocates an array of `nmemb` elements of `size` bytes each and
    /// zero-fills it.
    ///
    /// The element count and size are multiplied without an overflow
    /// check, mirroring the classic `calloc` shortcut of delegating to
    /// `malloc(nmemb * size)`; the product wraps on overflow. Known
    /// limitation, pinned by a test.
    pub fn zero_allocate(&mut self, nmemb: usize, size: usize) -> HeapAddr {
        debug!("zero_allocate({nmemb:#x}, {size:#x})");

        let total = nmemb.wrapping_mul(size);
        let ptr = self.allocate(total);
        self.bytes_mut(ptr.as_usize(), total).fill(0);
        ptr
    }

    /// Resizes the allocation at `ptr` to `size` bytes.
    ///
    /// `None` is equivalent to [`allocate`]. Otherwise the old block is
    /// released first and the new block is searched with a forced
    /// next-fit anchored at the block the release left behind (the old
    /// block, possibly merged with free neighbors), biasing reuse toward
    /// the just-freed space. `min(old payload size, size)` bytes are
    /// preserved; they are snapshotted before the release, so coalescing
    /// can never corrupt the copy. The active policy and cursor are
    /// restored afterwards.
    ///
    /// [`allocate`]: Self::allocate
    pub fn reallocate(&mut self, ptr: Option<HeapAddr>, size: usize) -> HeapAddr {
        let Some(old) = ptr else {
            debug!("reallocate(none, {size:#x})");
            return self.allocate(size);
        };
        debug!("reallocate({old}, {size:#x})");

        let old_start = old.as_usize() - WORD_SIZE;
        let old_payload = self.get(old_start).size() - 2 * WORD_SIZE;
        let copy_len = old_payload.min(size);
        let saved: Vec<u8> = self.bytes(old.as_usize(), copy_len).to_vec();

        let saved_policy = self.policy;
        let saved_cursor = self.next_block;

        self.release(Some(old));
        self.policy = AllocationPolicy::NextFit;
        let new = self.allocate(size);
        self.policy = saved_policy;

        // The saved cursor can end up inside a block that was split or
        // merged by the forced allocation; fall back to the new block
        // rather than resume a scan mid-block.
        self.next_block = if self.is_block_boundary(saved_cursor) {
            saved_cursor
        } else {
            new.as_usize() - WORD_SIZE
        };

        if new != old {
            self.bytes_mut(new.as_usize(), copy_len).copy_from_slice(&saved);
        }
        new
    }

    /// Releases the allocation at `ptr`.
    ///
    /// `None` is a no-op that mutates no state. The freed block is merged
    /// with free neighbors on both sides; if the merged block reaches the
    /// end sentinel the heap is shrunk. The next-fit cursor ends up on
    /// the final (possibly merged and shrunk) block.
    pub fn release(&mut self, ptr: Option<HeapAddr>) {
        let Some(ptr) = ptr else {
            debug!("release(none)");
            return;
        };
        debug!("release({ptr})");

        let mut start = ptr.as_usize() - WORD_SIZE;
        let mut size = self.get(start).size();
        self.write_block(start, size, BlockStatus::Free);

        if start != self.heap_start && self.get(start - WORD_SIZE).is_free() {
            trace!("  coalescing with preceding block");
            let prev_size = self.get(start - WORD_SIZE).size();
            start -= prev_size;
            size += prev_size;
            self.write_block(start, size, BlockStatus::Free);
        }

        let next = start + size;
        if next != self.heap_end && self.get(next).is_free() {
            trace!("  coalescing with succeeding block");
            size += self.get(next).size();
            self.write_block(start, size, BlockStatus::Free);
        }

        self.next_block = start;

        if start + size == self.heap_end {
            self.shrink();
        }
    }

    /// Extends the heap far enough to hold a block of `req` bytes and
    /// returns the resulting trailing free block.
    fn grow(&mut self, req: usize) -> usize {
        debug!("expand_heap({req:#x} ({req}))");

        let end = self.heap_end;
        let last = self.get(end - WORD_SIZE);
        let trailing = if last.is_free() { last.size() } else { 0 };
        trace!("  trailing free space {trailing:#x}");

        // A locator miss means even the trailing block was too small.
        debug_assert!(trailing < req);
        let chunk = align_up(req - trailing + 1, CHUNK_SIZE).max(INIT_CHUNK_SIZE);

        debug!("  sbrk(+{chunk:#x})");
        let brk = match self.seg.sbrk(chunk as isize) {
            Ok(brk) => brk,
            Err(e) => panic!("cannot extend heap: {e}"),
        };
        self.heap_end = align_down(brk - WORD_SIZE, MIN_BLOCK_SIZE);
        trace!("  new heap_end {:#x}", self.heap_end);

        let size = trailing + (self.heap_end - end);
        let start = self.heap_end - size;
        self.write_block(start, size, BlockStatus::Free);
        self.put(self.heap_end, BoundaryTag::pack(0, BlockStatus::Allocated));

        self.next_block = start;
        start
    }

    /// Returns excess trailing free space to the provider, keeping at
    /// least [`INIT_CHUNK_SIZE`] bytes of heap.
    fn shrink(&mut self) {
        let last = self.get(self.heap_end - WORD_SIZE);
        debug_assert!(last.is_free());
        let trailing = last.size();
        let start = self.heap_end - trailing;

        let excess = if trailing > INIT_CHUNK_SIZE {
            align_down(trailing - INIT_CHUNK_SIZE, CHUNK_SIZE)
        } else {
            0
        };
        if excess == 0 {
            return;
        }

        debug!("shrink_heap: sbrk(-{excess:#x})");
        let brk = match self.seg.sbrk(-(excess as isize)) {
            Ok(brk) => brk,
            Err(e) => panic!("cannot shrink heap: {e}"),
        };
        self.heap_end = align_down(brk - WORD_SIZE, MIN_BLOCK_SIZE);
        trace!("  new heap_end {:#x}", self.heap_end);

        self.write_block(start, self.heap_end - start, BlockStatus::Free);
        self.put(self.heap_end, BoundaryTag::pack(0, BlockStatus::Allocated));
        self.next_block = start;
    }

    fn find_free_block(&mut self, req: usize) -> Option<usize> {
        match self.policy {
            AllocationPolicy::FirstFit => self.first_fit(req),
            AllocationPolicy::NextFit => self.next_fit(req),
            AllocationPolicy::BestFit => self.best_fit(req),
        }
    }

    fn first_fit(&self, req: usize) -> Option<usize> {
        let mut p = self.heap_start;
        while p < self.heap_end {
            let tag = self.get(p);
            trace!("    {p:#x} {:#x} {}", tag.size(), tag.status());
            if tag.is_free() && tag.size() >= req {
                return Some(p);
            }
            p += tag.size();
        }
        None
    }

    fn next_fit(&mut self, req: usize) -> Option<usize> {
        let origin = self.next_block;
        let mut p = origin;
        loop {
            let tag = self.get(p);
            trace!("    {p:#x} {:#x} {}", tag.size(), tag.status());
            if tag.is_free() && tag.size() >= req {
                self.next_block = p;
                return Some(p);
            }
            p += tag.size();
            if p >= self.heap_end {
                p = self.heap_start;
            }
            if p == origin {
                return None;
            }
        }
    }

    fn best_fit(&self, req: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        let mut p = self.heap_start;
        while p < self.heap_end {
            let tag = self.get(p);
            trace!("    {p:#x} {:#x} {}", tag.size(), tag.status());
            if tag.is_free() && tag.size() >= req {
                // Strictly smaller replaces; ties keep the first match.
                match best {
                    Some((_, held)) if held <= tag.size() => {}
                    _ => best = Some((p, tag.size())),
                }
            }
            p += tag.size();
        }
        best.map(|(addr, _)| addr)
    }

    /// Shrinks the break back to the segment start and hands the
    /// provider back, returning all backing memory.
    pub fn into_segment(mut self) -> S {
        let brk = self.seg.stat().brk;
        let delta = brk - self.ds_start;
        if delta > 0 {
            if let Err(e) = self.seg.sbrk(-(delta as isize)) {
                log::warn!("teardown could not return segment memory: {e}");
            }
        }
        self.seg
    }

    /// The payload bytes of the allocation at `ptr` (full block payload
    /// capacity, which may exceed the requested size due to rounding).
    pub fn payload(&self, ptr: HeapAddr) -> &[u8] {
        let len = self.get(ptr.as_usize() - WORD_SIZE).size() - 2 * WORD_SIZE;
        self.bytes(ptr.as_usize(), len)
    }

    /// The payload bytes of the allocation at `ptr`, mutable.
    pub fn payload_mut(&mut self, ptr: HeapAddr) -> &mut [u8] {
        let len = self.get(ptr.as_usize() - WORD_SIZE).size() - 2 * WORD_SIZE;
        self.bytes_mut(ptr.as_usize(), len)
    }

    /// Start of the managed heap range.
    pub fn heap_start(&self) -> HeapAddr {
        HeapAddr::new(self.heap_start)
    }

    /// End of the managed heap range.
    pub fn heap_end(&self) -> HeapAddr {
        HeapAddr::new(self.heap_end)
    }

    /// The active allocation policy.
    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// The next-fit cursor (always a valid block boundary).
    pub fn cursor(&self) -> HeapAddr {
        HeapAddr::new(self.next_block)
    }

    /// Page size reported by the provider at init time.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The underlying data segment.
    pub fn segment(&self) -> &S {
        &self.seg
    }

    pub(crate) fn segment_stat(&self) -> SegmentStat {
        self.seg.stat()
    }

    pub(crate) fn get(&self, addr: usize) -> BoundaryTag {
        let idx = addr - self.ds_start;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(&self.seg.mem()[idx..idx + WORD_SIZE]);
        BoundaryTag::from_raw(u64::from_ne_bytes(word))
    }

    fn put(&mut self, addr: usize, tag: BoundaryTag) {
        let idx = addr - self.ds_start;
        self.seg.mem_mut()[idx..idx + WORD_SIZE].copy_from_slice(&tag.raw().to_ne_bytes());
    }

    fn write_block(&mut self, start: usize, size: usize, status: BlockStatus) {
        let tag = BoundaryTag::pack(size, status);
        self.put(start, tag);
        self.put(start + size - WORD_SIZE, tag);
    }

    fn bytes(&self, addr: usize, len: usize) -> &[u8] {
        let idx = addr - self.ds_start;
        &self.seg.mem()[idx..idx + len]
    }

    fn bytes_mut(&mut self, addr: usize, len: usize) -> &mut [u8] {
        let idx = addr - self.ds_start;
        &mut self.seg.mem_mut()[idx..idx + len]
    }

    fn is_block_boundary(&self, addr: usize) -> bool {
        let mut p = self.heap_start;
        while p < self.heap_end {
            if p == addr {
                return true;
            }
            let size = self.get(p).size();
            if size == 0 {
                return false;
            }
            p += size;
        }
        false
    }
}
