//! Named shared-memory region with an embedded offset arena.
//!
//! The region header occupies the first cache line of the mapping and
//! carries the arena bump pointer and the offset of the board-data root.
//! Everything allocated inside the region is linked by offsets relative to
//! the mapping base, so a second process mapping the segment at a different
//! virtual address sees the same graph.

use crate::arena::ShmAllocator;
use crate::error::{ShmError, ShmResult};
use crate::platform;
use memmap2::MmapMut;
use smce_common::consts::{SHM_MAX_SIZE, SHM_MIN_SIZE};
use static_assertions::const_assert_eq;
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// Magic number identifying an SMCE shared-board segment ("SMCESBD1").
pub const SMCE_SHM_MAGIC: u64 = 0x534D_4345_5342_4431;

/// Segment header with cache-line alignment
#[repr(C, align(64))]
pub struct RegionHeader {
    /// Magic number for validation
    magic: u64,
    /// Total mapped size in bytes
    total_size: u64,
    /// Arena bump pointer, offset of the next free byte
    alloc_head: AtomicU64,
    /// Offset of the BoardData root, 0 while unconstructed
    board_off: AtomicU64,
    /// Creator process ID, for orphan detection on attach
    writer_pid: u32,
    _padding: [u8; 28],
}

const_assert_eq!(std::mem::size_of::<RegionHeader>(), 64);

impl RegionHeader {
    fn new(total_size: usize, writer_pid: u32) -> Self {
        Self {
            magic: SMCE_SHM_MAGIC,
            total_size: total_size as u64,
            alloc_head: AtomicU64::new(std::mem::size_of::<RegionHeader>() as u64),
            board_off: AtomicU64::new(0),
            writer_pid,
            _padding: [0; 28],
        }
    }

    /// Validate header magic and size
    fn validate(&self, mapped_len: usize) -> ShmResult<()> {
        if self.magic != SMCE_SHM_MAGIC {
            return Err(ShmError::InvalidLayout {
                reason: "bad magic",
            });
        }
        if self.total_size as usize != mapped_len {
            return Err(ShmError::InvalidLayout {
                reason: "header size disagrees with mapping",
            });
        }
        Ok(())
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.total_size
    }

    pub(crate) fn alloc_head(&self) -> &AtomicU64 {
        &self.alloc_head
    }
}

/// Named, sized shared-memory segment owning (or attached to) a mapping.
pub struct ShmRegion {
    name: String,
    mmap: MmapMut,
    owner: bool,
}

impl ShmRegion {
    /// Create a new segment; the name must not be in use.
    ///
    /// `size` is rounded up to the page size and bounds-checked against
    /// [`SHM_MIN_SIZE`]/[`SHM_MAX_SIZE`].
    pub fn create(name: &str, size: usize) -> ShmResult<Self> {
        let size = size.max(SHM_MIN_SIZE).next_multiple_of(SHM_MIN_SIZE);
        if size > SHM_MAX_SIZE {
            return Err(ShmError::InvalidSize { size });
        }

        let mut mmap = platform::create_segment_mmap(name, size)?;
        // SAFETY: mapping is at least a page, freshly created and exclusive
        unsafe {
            (mmap.as_mut_ptr() as *mut RegionHeader)
                .write(RegionHeader::new(size, std::process::id()));
        }
        fence(Ordering::Release);

        tracing::debug!(name, size, "created shared board segment");
        Ok(Self {
            name: name.to_string(),
            mmap,
            owner: true,
        })
    }

    /// Attach to an existing segment by name.
    ///
    /// A segment whose creator process has died is an orphan awaiting
    /// cleanup; attaching to one fails with [`ShmError::Gone`] just like a
    /// destroyed segment.
    pub fn open(name: &str) -> ShmResult<Self> {
        let mmap = platform::attach_segment_mmap(name)?;
        if mmap.len() < std::mem::size_of::<RegionHeader>() {
            return Err(ShmError::InvalidLayout {
                reason: "mapping smaller than header",
            });
        }
        let region = Self {
            name: name.to_string(),
            mmap,
            owner: false,
        };
        region.header().validate(region.mmap.len())?;
        if !platform::is_process_alive(region.header().writer_pid) {
            return Err(ShmError::Gone {
                name: name.to_string(),
            });
        }
        Ok(region)
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total mapped size in bytes.
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// Header reference.
    pub(crate) fn header(&self) -> &RegionHeader {
        // SAFETY: create/open guarantee the mapping holds a RegionHeader
        unsafe { &*(self.mmap.as_ptr() as *const RegionHeader) }
    }

    /// Allocator handle for constructing containers inside the region.
    pub fn allocator(&self) -> ShmAllocator<'_> {
        ShmAllocator::new(self.mmap.as_ptr(), self.header())
    }

    /// Offset of the BoardData root, 0 while unconstructed.
    pub fn board_offset(&self) -> u64 {
        self.header().board_off.load(Ordering::Acquire)
    }

    /// Publish the BoardData root offset.
    pub fn set_board_offset(&self, off: u64) {
        self.header().board_off.store(off, Ordering::Release);
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if self.owner {
            platform::unlink_segment(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("smce_test_{}_{}", name, std::process::id())
    }

    #[test]
    fn create_open_drop_cycle() {
        let name = unique("region");
        let region = ShmRegion::create(&name, SHM_MIN_SIZE).unwrap();
        assert_eq!(region.size(), SHM_MIN_SIZE);

        let attached = ShmRegion::open(&name).unwrap();
        assert_eq!(attached.size(), SHM_MIN_SIZE);
        drop(attached);

        drop(region);
        assert!(matches!(
            ShmRegion::open(&name),
            Err(ShmError::Gone { .. })
        ));
    }

    #[test]
    fn name_collision_rejected() {
        let name = unique("collision");
        let _first = ShmRegion::create(&name, SHM_MIN_SIZE).unwrap();
        assert!(matches!(
            ShmRegion::create(&name, SHM_MIN_SIZE),
            Err(ShmError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn attach_with_dead_writer_is_gone() {
        use std::os::unix::fs::FileExt;

        let name = unique("orphan");
        let _region = ShmRegion::create(&name, SHM_MIN_SIZE).unwrap();

        // forge a writer pid beyond pid_max through the backing file
        let dead_pid: u32 = 0x7FFF_FFFF;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(platform::segment_path(&name))
            .unwrap();
        file.write_at(
            &dead_pid.to_ne_bytes(),
            std::mem::offset_of!(RegionHeader, writer_pid) as u64,
        )
        .unwrap();

        assert!(matches!(
            ShmRegion::open(&name),
            Err(ShmError::Gone { .. })
        ));
    }

    #[test]
    fn oversized_region_rejected() {
        let name = unique("oversized");
        assert!(matches!(
            ShmRegion::create(&name, SHM_MAX_SIZE + 1),
            Err(ShmError::InvalidSize { .. })
        ));
    }

    #[test]
    fn size_rounded_to_page() {
        let name = unique("rounding");
        let region = ShmRegion::create(&name, 5000).unwrap();
        assert_eq!(region.size(), 8192);
    }
}
