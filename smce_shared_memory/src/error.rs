//! Error types for shared memory operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment already exists; segment names are best-effort unique, so a
    /// collision aborts configure rather than silently attaching
    #[error("Segment already exists: {name}")]
    AlreadyExists {
        /// Segment name
        name: String,
    },

    /// Segment was destroyed (or never created) before the attach
    #[error("Segment is gone: {name}")]
    Gone {
        /// Segment name
        name: String,
    },

    /// Arena exhausted while allocating inside the segment
    #[error("Segment full: requested {requested} bytes, {remaining} remaining")]
    Full {
        /// Bytes requested
        requested: usize,
        /// Bytes still unallocated
        remaining: usize,
    },

    /// Invalid segment size
    #[error("Invalid segment size: {size} bytes (must be 4KB-1GB)")]
    InvalidSize {
        /// Attempted size in bytes
        size: usize,
    },

    /// A path is not representable as unicode
    #[error("Path is not valid unicode: {}", .path.display())]
    PathEncoding {
        /// Offending path
        path: PathBuf,
    },

    /// Mapped segment does not carry a valid layout
    #[error("Segment layout invalid: {reason}")]
    InvalidLayout {
        /// What failed to validate
        reason: &'static str,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
