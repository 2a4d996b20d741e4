//! SMCE Common Library
//!
//! This crate provides shared constants and configuration types for all
//! SMCE workspace crates.
//!
//! # Module Structure
//!
//! - [`board`] - Board hardware configuration (pins, gpio drivers, uarts, storages, framebuffers)
//! - [`sketch`] - Sketch compile configuration and the Arduino library sum type
//! - [`context`] - Execution context (build tool + resource directory discovery)
//! - [`config`] - Configuration loading traits and error types
//! - [`consts`] - Workspace-wide constants (segment naming, marker protocol, size bounds)
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! smce = { package = "smce_common", path = "../smce_common" }
//! ```

pub mod board;
pub mod config;
pub mod consts;
pub mod context;
pub mod sketch;

pub use board::{
    BoardConfig, DriverEndpoints, FrameBufferConfig, FrameBufferDirection, GpioDriverConfig,
    SdCardConfig, UartChannelConfig,
};
pub use config::{ConfigError, ConfigLoader};
pub use context::ExecutionContext;
pub use sketch::{LibraryLists, SketchConfig, SketchLibrary};
