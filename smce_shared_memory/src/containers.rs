//! Offset-linked containers living inside a region.
//!
//! Each container stores the offset of its backing storage, never a
//! pointer, and resolves it through the [`ShmAllocator`] handle of whichever
//! mapping is touching it. Structural mutation (push, grow, resize) is
//! single-writer; the byte rings are safe for one producer and one consumer
//! on opposite sides of the segment.

use crate::arena::ShmAllocator;
use crate::error::ShmResult;
use static_assertions::const_assert_eq;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Growable vector of `T` inside a region.
#[repr(C)]
pub struct ShmVec<T> {
    off: AtomicU64,
    len: AtomicU32,
    cap: AtomicU32,
    _marker: PhantomData<T>,
}

const_assert_eq!(std::mem::size_of::<ShmVec<u8>>(), 16);

impl<T> ShmVec<T> {
    /// An empty vector with no backing storage.
    pub fn new() -> Self {
        Self {
            off: AtomicU64::new(0),
            len: AtomicU32::new(0),
            cap: AtomicU32::new(0),
            _marker: PhantomData,
        }
    }

    /// A vector with storage for `cap` elements preallocated.
    pub fn with_capacity(alloc: &ShmAllocator<'_>, cap: u32) -> ShmResult<Self> {
        let vec = Self::new();
        if cap > 0 {
            let off = alloc.alloc(
                std::mem::size_of::<T>() * cap as usize,
                std::mem::align_of::<T>(),
            )?;
            vec.off.store(off, Ordering::Release);
            vec.cap.store(cap, Ordering::Release);
        }
        Ok(vec)
    }

    /// Element count.
    pub fn len(&self) -> u32 {
        self.len.load(Ordering::Acquire)
    }

    /// True when no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage capacity in elements.
    pub fn capacity(&self) -> u32 {
        self.cap.load(Ordering::Acquire)
    }

    /// Append an element, growing the backing storage if needed.
    pub fn push(&self, alloc: &ShmAllocator<'_>, value: T) -> ShmResult<()> {
        let len = self.len.load(Ordering::Acquire);
        if len == self.cap.load(Ordering::Acquire) {
            self.grow(alloc, len.saturating_add(1))?;
        }
        let off = self.off.load(Ordering::Acquire);
        // SAFETY: capacity ensured above; the slot is unpublished until the
        // len store below
        unsafe {
            alloc
                .ptr_at::<T>(off + len as u64 * std::mem::size_of::<T>() as u64)
                .write(value);
        }
        self.len.store(len + 1, Ordering::Release);
        Ok(())
    }

    /// Element reference by index.
    pub fn get<'m>(&self, alloc: &ShmAllocator<'m>, index: u32) -> Option<&'m T> {
        if index >= self.len() {
            return None;
        }
        let off = self.off.load(Ordering::Acquire);
        // SAFETY: index is within the published length
        unsafe {
            Some(&*alloc.ptr_at::<T>(off + index as u64 * std::mem::size_of::<T>() as u64))
        }
    }

    /// View of all published elements.
    pub fn as_slice<'m>(&self, alloc: &ShmAllocator<'m>) -> &'m [T] {
        let len = self.len() as usize;
        if len == 0 {
            return &[];
        }
        let off = self.off.load(Ordering::Acquire);
        // SAFETY: all elements up to len were written before publication
        unsafe { std::slice::from_raw_parts(alloc.ptr_at::<T>(off), len) }
    }

    /// Move storage to a new allocation of at least `min_cap` elements.
    /// The arena never frees, so the old block is abandoned.
    fn grow(&self, alloc: &ShmAllocator<'_>, min_cap: u32) -> ShmResult<()> {
        let old_cap = self.cap.load(Ordering::Acquire);
        let new_cap = old_cap.saturating_mul(2).max(min_cap).max(4);
        let new_off = alloc.alloc(
            std::mem::size_of::<T>() * new_cap as usize,
            std::mem::align_of::<T>(),
        )?;
        let len = self.len.load(Ordering::Acquire) as usize;
        if len > 0 {
            let old_off = self.off.load(Ordering::Acquire);
            // SAFETY: disjoint allocations from the same arena
            unsafe {
                std::ptr::copy_nonoverlapping(
                    alloc.ptr_at::<u8>(old_off),
                    alloc.ptr_at::<u8>(new_off),
                    len * std::mem::size_of::<T>(),
                );
            }
        }
        self.off.store(new_off, Ordering::Release);
        self.cap.store(new_cap, Ordering::Release);
        Ok(())
    }
}

impl ShmVec<u8> {
    /// Resize a byte vector, zero-filling any newly exposed bytes.
    pub fn resize_zeroed(&self, alloc: &ShmAllocator<'_>, new_len: u32) -> ShmResult<()> {
        let len = self.len.load(Ordering::Acquire);
        if new_len > self.cap.load(Ordering::Acquire) {
            self.grow(alloc, new_len)?;
        }
        if new_len > len {
            let off = self.off.load(Ordering::Acquire);
            // SAFETY: within the grown capacity
            unsafe {
                std::ptr::write_bytes(
                    alloc.ptr_at::<u8>(off + len as u64),
                    0,
                    (new_len - len) as usize,
                );
            }
        }
        self.len.store(new_len, Ordering::Release);
        Ok(())
    }

    /// Replace the contents with `bytes`.
    pub fn copy_from(&self, alloc: &ShmAllocator<'_>, bytes: &[u8]) -> ShmResult<()> {
        self.resize_zeroed(alloc, bytes.len() as u32)?;
        let off = self.off.load(Ordering::Acquire);
        // SAFETY: resized to at least bytes.len()
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), alloc.ptr_at::<u8>(off), bytes.len());
        }
        Ok(())
    }
}

/// UTF-8 string inside a region.
#[repr(C)]
pub struct ShmString {
    bytes: ShmVec<u8>,
}

const_assert_eq!(std::mem::size_of::<ShmString>(), 16);

impl ShmString {
    /// An empty string.
    pub fn new() -> Self {
        Self {
            bytes: ShmVec::new(),
        }
    }

    /// Copy `s` into the region.
    pub fn from_str(alloc: &ShmAllocator<'_>, s: &str) -> ShmResult<Self> {
        let string = Self::new();
        string.bytes.copy_from(alloc, s.as_bytes())?;
        Ok(string)
    }

    /// Byte length.
    pub fn len(&self) -> u32 {
        self.bytes.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// View the contents; non-UTF-8 bytes (a corrupted segment) read as "".
    pub fn as_str<'m>(&self, alloc: &ShmAllocator<'m>) -> &'m str {
        std::str::from_utf8(self.bytes.as_slice(alloc)).unwrap_or("")
    }

    /// Replace the contents.
    pub fn assign(&self, alloc: &ShmAllocator<'_>, s: &str) -> ShmResult<()> {
        self.bytes.copy_from(alloc, s.as_bytes())
    }
}

/// Bounded SPSC byte ring inside a region.
///
/// Positions are free-running u64 counters; the producer owns `tail`, the
/// consumer owns `head`. One producer plus one consumer is the contract,
/// matching one host and one guest per channel direction.
#[repr(C)]
pub struct ShmRing {
    off: u64,
    cap: u32,
    _pad: u32,
    head: AtomicU64,
    tail: AtomicU64,
}

const_assert_eq!(std::mem::size_of::<ShmRing>(), 32);

impl ShmRing {
    /// A ring with `cap` bytes of storage; zero capacity drops all traffic.
    pub fn with_capacity(alloc: &ShmAllocator<'_>, cap: u32) -> ShmResult<Self> {
        let off = if cap > 0 { alloc.alloc(cap as usize, 1)? } else { 0 };
        Ok(Self {
            off,
            cap,
            _pad: 0,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        })
    }

    /// Storage capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.cap
    }

    /// Buffered byte count.
    pub fn len(&self) -> u32 {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail - head) as u32
    }

    /// True when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer side: append as many of `bytes` as fit, returning the count.
    pub fn write(&self, alloc: &ShmAllocator<'_>, bytes: &[u8]) -> usize {
        let cap = self.cap as u64;
        if cap == 0 || bytes.is_empty() {
            return 0;
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let free = cap - (tail - head);
        let n = free.min(bytes.len() as u64) as usize;
        for (i, &byte) in bytes[..n].iter().enumerate() {
            let idx = (tail + i as u64) % cap;
            // SAFETY: idx < cap, storage allocated at construction
            unsafe {
                *alloc.ptr_at::<u8>(self.off + idx) = byte;
            }
        }
        self.tail.store(tail + n as u64, Ordering::Release);
        n
    }

    /// Consumer side: pull up to `buf.len()` bytes, returning the count.
    pub fn read(&self, alloc: &ShmAllocator<'_>, buf: &mut [u8]) -> usize {
        let cap = self.cap as u64;
        if cap == 0 || buf.is_empty() {
            return 0;
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let buffered = tail - head;
        let n = buffered.min(buf.len() as u64) as usize;
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            let idx = (head + i as u64) % cap;
            // SAFETY: idx < cap, storage allocated at construction
            unsafe {
                *slot = *alloc.ptr_at::<u8>(self.off + idx);
            }
        }
        self.head.store(head + n as u64, Ordering::Release);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::ShmRegion;
    use smce_common::consts::SHM_MIN_SIZE;

    fn unique(name: &str) -> String {
        format!("smce_test_{}_{}", name, std::process::id())
    }

    #[test]
    fn vec_push_and_read_back() {
        let region = ShmRegion::create(&unique("vec"), SHM_MIN_SIZE).unwrap();
        let alloc = region.allocator();

        let vec: ShmVec<u32> = ShmVec::new();
        for value in [3u32, 1, 4, 1, 5] {
            vec.push(&alloc, value).unwrap();
        }
        assert_eq!(vec.len(), 5);
        assert_eq!(vec.as_slice(&alloc), &[3, 1, 4, 1, 5]);
        assert_eq!(vec.get(&alloc, 2), Some(&4));
        assert_eq!(vec.get(&alloc, 5), None);
    }

    #[test]
    fn vec_grows_past_reserved_capacity() {
        let region = ShmRegion::create(&unique("vec_grow"), SHM_MIN_SIZE).unwrap();
        let alloc = region.allocator();

        let vec: ShmVec<u16> = ShmVec::with_capacity(&alloc, 2).unwrap();
        for value in 0..20u16 {
            vec.push(&alloc, value).unwrap();
        }
        assert_eq!(vec.len(), 20);
        assert_eq!(vec.as_slice(&alloc)[19], 19);
    }

    #[test]
    fn string_round_trip() {
        let region = ShmRegion::create(&unique("string"), SHM_MIN_SIZE).unwrap();
        let alloc = region.allocator();

        let s = ShmString::from_str(&alloc, "/tmp/sd-root").unwrap();
        assert_eq!(s.as_str(&alloc), "/tmp/sd-root");
        s.assign(&alloc, "/elsewhere").unwrap();
        assert_eq!(s.as_str(&alloc), "/elsewhere");
    }

    #[test]
    fn ring_bounded_write_read() {
        let region = ShmRegion::create(&unique("ring"), SHM_MIN_SIZE).unwrap();
        let alloc = region.allocator();

        let ring = ShmRing::with_capacity(&alloc, 8).unwrap();
        assert!(ring.is_empty());

        assert_eq!(ring.write(&alloc, b"hello world"), 8); // truncated at cap
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.write(&alloc, b"x"), 0); // full

        let mut buf = [0u8; 16];
        assert_eq!(ring.read(&alloc, &mut buf), 8);
        assert_eq!(&buf[..8], b"hello wo");
        assert!(ring.is_empty());
    }

    #[test]
    fn ring_wraps_around() {
        let region = ShmRegion::create(&unique("ring_wrap"), SHM_MIN_SIZE).unwrap();
        let alloc = region.allocator();

        let ring = ShmRing::with_capacity(&alloc, 4).unwrap();
        let mut buf = [0u8; 4];
        for chunk in [&b"ab"[..], b"cd", b"ef", b"gh"] {
            assert_eq!(ring.write(&alloc, chunk), 2);
            assert_eq!(ring.read(&alloc, &mut buf[..2]), 2);
            assert_eq!(&buf[..2], chunk);
        }
    }

    #[test]
    fn zero_capacity_ring_drops_traffic() {
        let region = ShmRegion::create(&unique("ring_zero"), SHM_MIN_SIZE).unwrap();
        let alloc = region.allocator();

        let ring = ShmRing::with_capacity(&alloc, 0).unwrap();
        assert_eq!(ring.write(&alloc, b"data"), 0);
        let mut buf = [0u8; 4];
        assert_eq!(ring.read(&alloc, &mut buf), 0);
    }
}
