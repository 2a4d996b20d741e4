//! Platform-specific shared memory operations.
//!
//! Segments are backed by files under `/dev/shm`, created exclusively and
//! owner-only. The guest process attaches by opening the same path, which it
//! derives from the segment name received through the environment.

#[cfg(unix)]
pub use unix::*;

#[cfg(unix)]
mod unix {
    use crate::error::{ShmError, ShmResult};
    use memmap2::{MmapMut, MmapOptions};
    use std::fs::OpenOptions;
    use std::io::ErrorKind;
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::PathBuf;

    /// Backing file path for a segment name.
    pub fn segment_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/dev/shm/{name}"))
    }

    /// Create the backing file exclusively and map it read-write.
    ///
    /// An existing file of the same name is a name collision and fails with
    /// [`ShmError::AlreadyExists`].
    pub fn create_segment_mmap(name: &str, size: usize) -> ShmResult<MmapMut> {
        let path = segment_path(name);
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .mode(0o600) // Owner read/write only
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    ShmError::AlreadyExists {
                        name: name.to_string(),
                    }
                } else {
                    ShmError::Io { source: e }
                }
            })?;

        file.set_len(size as u64)?;

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(mmap)
    }

    /// Map an existing segment read-write.
    ///
    /// A missing backing file means the segment was destroyed (or never
    /// created) and fails with [`ShmError::Gone`].
    pub fn attach_segment_mmap(name: &str) -> ShmResult<MmapMut> {
        let path = segment_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ShmError::Gone {
                        name: name.to_string(),
                    }
                } else {
                    ShmError::Io { source: e }
                }
            })?;

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(mmap)
    }

    /// Unlink the backing file; the mapping of any attached process stays
    /// valid until it unmaps.
    pub fn unlink_segment(name: &str) {
        let _ = std::fs::remove_file(segment_path(name));
    }

    /// Check if a process is alive using kill(pid, 0)
    pub fn is_process_alive(pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Null signal tests for existence without delivering anything
        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => true,
            Err(nix::Error::EPERM) => true, // Exists but not signalable
            Err(_) => false,
        }
    }
}

#[cfg(not(unix))]
mod unsupported {
    use crate::error::{ShmError, ShmResult};
    use memmap2::MmapMut;
    use std::path::PathBuf;

    pub fn segment_path(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    pub fn create_segment_mmap(_name: &str, _size: usize) -> ShmResult<MmapMut> {
        Err(ShmError::InvalidLayout {
            reason: "shared memory segments are unsupported on this platform",
        })
    }

    pub fn attach_segment_mmap(_name: &str) -> ShmResult<MmapMut> {
        Err(ShmError::InvalidLayout {
            reason: "shared memory segments are unsupported on this platform",
        })
    }

    pub fn unlink_segment(_name: &str) {}

    pub fn is_process_alive(_pid: u32) -> bool {
        false
    }
}

#[cfg(not(unix))]
pub use unsupported::*;
