//! # SMCE Shared Board Memory
//!
//! Shared-memory board state for the SMCE sketch simulation harness. The
//! host orchestrator creates a named segment per runner, constructs the
//! board hardware model inside it, and hands the segment name to the sketch
//! process, which attaches and manipulates the same state from its own
//! mapping.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────┐      ┌───────────────────────┐      ┌────────────────┐
//! │  Host runner   │      │  /dev/shm segment     │      │  Sketch child  │
//! │                │      │                       │      │                │
//! │ SharedBoardData├─────►│ [Header|Arena.......] ├─────►│ attach(SEGNAME)│
//! │   .configure   │      │   BoardData root      │      │                │
//! └────────────────┘      │   pins / uarts / ...  │      └────────────────┘
//!                         └───────────────────────┘
//! ```
//!
//! All in-segment containers link through offsets relative to the mapping
//! base, so the two processes see one consistent graph despite mapping the
//! segment at different virtual addresses. An allocator handle
//! ([`ShmAllocator`]) carries the local base through every container
//! operation.
//!
//! ## Usage
//!
//! ```rust
//! use smce_common::board::BoardConfig;
//! use smce_shared_memory::SharedBoardData;
//!
//! # fn main() -> Result<(), smce_shared_memory::ShmError> {
//! let conf = BoardConfig { pins: vec![2, 3, 7], ..Default::default() };
//!
//! let mut sbd = SharedBoardData::new();
//! sbd.configure(&format!("SMCE-Runner-doc-{}", std::process::id()), "arduino:avr:uno", &conf)?;
//!
//! let board = sbd.board_data().expect("configured");
//! let alloc = sbd.allocator().expect("configured");
//! assert_eq!(board.pins.as_slice(&alloc).len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - Structural mutation (construction, vector growth) is single-writer.
//! - Pin state fields are individually atomic.
//! - Uart rings are SPSC: one producer, one consumer per direction.
//! - One host plus one guest per segment is the supported topology.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod board;
pub mod containers;
pub mod error;
pub mod platform;
pub mod region;
pub mod sbd;

pub use arena::ShmAllocator;
pub use board::{
    required_region_size, BoardData, DirectStorage, FrameBuffer, Pin, PinCapabilities, PinMode,
    PixelFormat, StorageBus, UartChannel,
};
pub use containers::{ShmRing, ShmString, ShmVec};
pub use error::{ShmError, ShmResult};
pub use region::{ShmRegion, SMCE_SHM_MAGIC};
pub use sbd::SharedBoardData;
