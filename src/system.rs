//! Data segment backed by the real program break.

use core::slice;

use libc::{c_void, intptr_t};

use crate::segment::{DataSegment, SegmentError, SegmentStat};

/// A [`DataSegment`] over `sbrk(2)`.
///
/// Captures the program break at construction time as the segment start;
/// every grow and shrink moves the real break.
#[derive(Debug)]
pub struct SystemSegment {
    base: usize,
    brk: usize,
}

impl SystemSegment {
    /// Captures the current program break as the start of a new segment.
    ///
    /// # Safety
    ///
    /// - At most one `SystemSegment` may exist per process.
    /// - Nothing else in the process may move the program break (this
    ///   includes the system allocator on platforms where it uses `brk`)
    ///   while the segment is alive.
    pub unsafe fn new() -> Self {
        let base = unsafe { libc::sbrk(0) } as usize;
        Self { base, brk: base }
    }
}

impl DataSegment for SystemSegment {
    fn stat(&self) -> SegmentStat {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        SegmentStat {
            start: self.base,
            brk: self.brk,
            page_size: page_size.max(0) as usize,
        }
    }

    fn sbrk(&mut self, delta: isize) -> Result<usize, SegmentError> {
        let prev = unsafe { libc::sbrk(delta as intptr_t) };
        if prev == usize::MAX as *mut c_void {
            return Err(if delta >= 0 {
                SegmentError::Exhausted
            } else {
                SegmentError::OutOfRange
            });
        }
        self.brk = (prev as usize).wrapping_add_signed(delta);
        Ok(self.brk)
    }

    fn mem(&self) -> &[u8] {
        // The region [base, brk) was obtained from sbrk and is owned by
        // this segment for its whole lifetime (see `new`).
        unsafe { slice::from_raw_parts(self.base as *const u8, self.brk - self.base) }
    }

    fn mem_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.base as *mut u8, self.brk - self.base) }
    }
}
