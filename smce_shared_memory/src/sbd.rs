//! Shared board data: a region paired with its BoardData root.
//!
//! The host side creates the pair at configure time and destroys it on
//! reset; the guest side attaches by the name it received through the
//! environment and locates the root through the region header.

use crate::arena::ShmAllocator;
use crate::board::{required_region_size, BoardData};
use crate::error::{ShmError, ShmResult};
use crate::region::ShmRegion;
use smce_common::board::BoardConfig;

/// Pairs a [`ShmRegion`] with the [`BoardData`] root constructed inside it.
#[derive(Default)]
pub struct SharedBoardData {
    region: Option<ShmRegion>,
}

impl SharedBoardData {
    /// An unconfigured instance holding no region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the region `name` and construct the board state inside it.
    ///
    /// Any previously held region is destroyed first, so a configured
    /// instance may be reconfigured in place. On failure no region is held.
    pub fn configure(&mut self, name: &str, fqbn: &str, conf: &BoardConfig) -> ShmResult<()> {
        self.reset();

        let region = ShmRegion::create(name, required_region_size(conf))?;
        let root_off = BoardData::construct(&region.allocator(), fqbn, conf)?;
        region.set_board_offset(root_off);

        tracing::debug!(name, fqbn, "shared board data configured");
        self.region = Some(region);
        Ok(())
    }

    /// Attach to an existing shared board segment (the guest side).
    pub fn attach(name: &str) -> ShmResult<Self> {
        let region = ShmRegion::open(name)?;
        if region.board_offset() == 0 {
            return Err(ShmError::InvalidLayout {
                reason: "segment holds no board data root",
            });
        }
        Ok(Self {
            region: Some(region),
        })
    }

    /// Destroy and forget the region, if any.
    pub fn reset(&mut self) {
        self.region = None;
    }

    /// True while a region is held.
    pub fn is_configured(&self) -> bool {
        self.region.is_some()
    }

    /// The held region, if any.
    pub fn region(&self) -> Option<&ShmRegion> {
        self.region.as_ref()
    }

    /// Allocator handle over the held region.
    pub fn allocator(&self) -> Option<ShmAllocator<'_>> {
        self.region.as_ref().map(|r| r.allocator())
    }

    /// The BoardData root; only valid while the region is alive.
    pub fn board_data(&self) -> Option<&BoardData> {
        let region = self.region.as_ref()?;
        let off = region.board_offset();
        if off == 0 {
            return None;
        }
        // SAFETY: the offset was published by construct() over this region
        Some(unsafe { &*region.allocator().ptr_at::<BoardData>(off) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("smce_test_{}_{}", name, std::process::id())
    }

    #[test]
    fn configure_reset_reconfigure() {
        let name = unique("sbd");
        let conf = BoardConfig {
            pins: vec![4, 2],
            ..Default::default()
        };

        let mut sbd = SharedBoardData::new();
        sbd.configure(&name, "arduino:avr:uno", &conf).unwrap();
        assert!(sbd.is_configured());
        assert_eq!(sbd.board_data().unwrap().pins.len(), 2);

        sbd.reset();
        assert!(!sbd.is_configured());
        assert!(sbd.board_data().is_none());

        // name is free again after reset
        sbd.configure(&name, "arduino:avr:uno", &conf).unwrap();
        assert!(sbd.is_configured());
    }

    #[test]
    fn attach_sees_the_host_board() {
        let name = unique("sbd_attach");
        let conf = BoardConfig {
            pins: vec![9],
            ..Default::default()
        };

        let mut host = SharedBoardData::new();
        host.configure(&name, "esp32:esp32:esp32", &conf).unwrap();

        let guest = SharedBoardData::attach(&name).unwrap();
        let board = guest.board_data().unwrap();
        let alloc = guest.allocator().unwrap();
        assert_eq!(board.fqbn.as_str(&alloc), "esp32:esp32:esp32");
        assert_eq!(board.pins.as_slice(&alloc)[0].id, 9);
    }

    #[test]
    fn attach_after_reset_is_gone() {
        let name = unique("sbd_gone");
        let mut host = SharedBoardData::new();
        host.configure(&name, "fqbn", &BoardConfig::default()).unwrap();
        host.reset();

        assert!(matches!(
            SharedBoardData::attach(&name),
            Err(ShmError::Gone { .. })
        ));
    }
}
