//! Workspace-wide constants.
//!
//! These constants define the cross-process contract between the host
//! orchestrator and the guest sketch runtime. They are the single source of
//! truth - all other crates import from here.

/// Prefix of every shared-memory segment name created by a runner.
///
/// The full name is `SMCE-Runner-{sketch_id}` where `sketch_id` is the
/// runner's monotonic identifier.
pub const SEGMENT_NAME_PREFIX: &str = "SMCE-Runner-";

/// Environment variable through which the guest receives its segment name.
pub const SEGNAME_ENV_VAR: &str = "SEGNAME";

/// Prefix of structured marker lines on the build-configure tool's output.
pub const BUILD_MARKER_PREFIX: &str = "-- SMCE: ";

/// Sentinel for an unused uart rx/tx pin override.
pub const UNUSED_PIN_OVERRIDE: u8 = u8::MAX;

/// Minimum shared memory segment size in bytes (one memory page).
pub const SHM_MIN_SIZE: usize = 4096;

/// Maximum shared memory segment size in bytes.
///
/// 1GB upper bound to prevent a misconfigured board from exhausting
/// `/dev/shm`.
pub const SHM_MAX_SIZE: usize = 1_073_741_824; // 1GB

/// Arena allowance reserved per framebuffer descriptor.
///
/// Framebuffer pixel storage is sized by the guest at runtime
/// (width * height * bpp), so the region must be provisioned up front.
/// 8MB covers a 1024x1024 RGB888 surface including reallocation slack;
/// the backing file is sparse, so unused allowance costs no memory.
pub const FRAME_BUFFER_ALLOWANCE: usize = 8 * 1024 * 1024;

/// Relative path of the sketch configuration script under the resource dir.
pub const CONFIGURE_SCRIPT_PATH: &str = "RtResources/SMCE/share/Scripts/ConfigureSketch.cmake";

/// Build the segment name for a sketch id.
pub fn segment_name(sketch_id: u64) -> String {
    format!("{SEGMENT_NAME_PREFIX}{sketch_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_name_format() {
        assert_eq!(segment_name(42), "SMCE-Runner-42");
    }

    #[test]
    fn test_size_constraints() {
        assert!(SHM_MIN_SIZE < SHM_MAX_SIZE);
        assert_eq!(SHM_MIN_SIZE, 4096);
    }

    #[test]
    fn test_marker_prefix_matches_protocol() {
        assert_eq!(BUILD_MARKER_PREFIX, "-- SMCE: ");
    }
}
