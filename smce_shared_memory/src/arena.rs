//! Offset-based arena allocation inside a region.
//!
//! The allocator handle pairs the local mapping base with the region header
//! holding the shared bump pointer. Allocations return offsets, never
//! addresses; both host and guest run the same CAS bump over the header, so
//! concurrent allocation from the two mappings stays coherent. Memory is
//! never reclaimed before the region itself is destroyed.

use crate::error::{ShmError, ShmResult};
use crate::region::RegionHeader;
use std::sync::atomic::Ordering;

/// Allocator handle carried through every in-shm container constructor.
#[derive(Clone, Copy)]
pub struct ShmAllocator<'r> {
    base: *const u8,
    header: &'r RegionHeader,
}

impl<'r> ShmAllocator<'r> {
    pub(crate) fn new(base: *const u8, header: &'r RegionHeader) -> Self {
        Self { base, header }
    }

    /// Allocate `size` bytes at the given alignment; returns the offset from
    /// the mapping base.
    ///
    /// Fresh segment pages are zero-filled by the OS, so allocations start
    /// zeroed.
    pub fn alloc(&self, size: usize, align: usize) -> ShmResult<u64> {
        debug_assert!(align.is_power_of_two());
        let head = self.header.alloc_head();
        let total = self.header.total_size();
        let align = align as u64;

        let mut current = head.load(Ordering::Acquire);
        loop {
            let aligned = (current + align - 1) & !(align - 1);
            let end = aligned + size as u64;
            if end > total {
                return Err(ShmError::Full {
                    requested: size,
                    remaining: total.saturating_sub(current) as usize,
                });
            }
            match head.compare_exchange_weak(current, end, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(aligned),
                Err(observed) => current = observed,
            }
        }
    }

    /// Bytes still unallocated.
    pub fn remaining(&self) -> usize {
        let used = self.header.alloc_head().load(Ordering::Acquire);
        self.header.total_size().saturating_sub(used) as usize
    }

    /// Resolve an offset to a pointer in this mapping.
    ///
    /// # Safety
    ///
    /// `off` must come from [`alloc`](Self::alloc) on the same region and
    /// the allocation must hold a properly initialized `T`.
    pub unsafe fn ptr_at<T>(&self, off: u64) -> *mut T {
        debug_assert!(off as usize + std::mem::size_of::<T>() <= self.header.total_size() as usize);
        self.base.add(off as usize) as *mut T
    }
}
