//! # SMCE Board Runner
//!
//! Host-side orchestration of a microcontroller-sketch simulation. A
//! [`BoardRunner`] takes an Arduino-style sketch plus a board configuration,
//! compiles the sketch against the device-emulation runtime through an
//! external CMake driver, provisions the shared-memory board state, spawns
//! the resulting executable as a child process and drives its lifecycle
//! while pumping its diagnostic output.
//!
//! ## Lifecycle
//!
//! ```text
//! configure ─► build ─► start ─► (suspend ◄► resume) ─► terminate
//!     ▲                              │
//!     └──────────── reset ◄──────────┘ (after stop)
//! ```
//!
//! Every operation returns `bool`; invoking one from a disallowed status is
//! a silent no-op returning `false`. Real failures (tool exit codes, spawn
//! errors, shared-memory exhaustion) also return `false` and leave the
//! build/runtime logs populated for post-mortem.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smce_common::{board::BoardConfig, context::ExecutionContext, sketch::SketchConfig};
//! use smce_runner::BoardRunner;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let exectx = ExecutionContext::new("/opt/smce")?;
//! let mut runner = BoardRunner::new(exectx, Some(Box::new(|code| {
//!     eprintln!("sketch exited with {code}");
//! })));
//!
//! assert!(runner.configure("arduino:avr:uno", BoardConfig::default()));
//! assert!(runner.build(Path::new("sketch.ino"), &SketchConfig::default()));
//! assert!(runner.start());
//! loop {
//!     runner.tick();
//!     if !runner.status().is_executing() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod build;
pub mod platform;
pub mod runner;
pub mod status;
pub mod view;

pub use build::{BuildArtifacts, BuildDriver, BuildError};
pub use runner::{BoardRunner, ExitNotify};
pub use status::RunnerStatus;
pub use view::{BoardView, FrameBufferView, PinView, StorageView, UartView};

/// Initialize tracing for host-side logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
