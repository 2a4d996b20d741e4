//! Execution context discovery.
//!
//! An [`ExecutionContext`] locates the two host-side ingredients every build
//! needs: the CMake executable that drives sketch configuration, and the
//! SMCE resource directory holding the runtime scripts. Both are validated
//! up front so the runner can assume a usable environment.

use crate::config::ConfigError;
use crate::consts::CONFIGURE_SCRIPT_PATH;
use std::env;
use std::path::{Path, PathBuf};

/// Validated build environment handed to every runner.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    resource_dir: PathBuf,
    cmake_path: PathBuf,
}

impl ExecutionContext {
    /// Create a context, discovering `cmake` on `PATH`.
    pub fn new(resource_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let cmake = find_in_path("cmake").ok_or_else(|| {
            ConfigError::ValidationError("cmake not found on PATH".to_string())
        })?;
        Self::with_cmake(resource_dir, cmake)
    }

    /// Create a context with an explicit build-tool path.
    pub fn with_cmake(
        resource_dir: impl Into<PathBuf>,
        cmake_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let resource_dir = resource_dir.into();
        let cmake_path = cmake_path.into();
        if !resource_dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "resource directory does not exist: {}",
                resource_dir.display()
            )));
        }
        if !cmake_path.is_file() {
            return Err(ConfigError::ValidationError(format!(
                "build tool does not exist: {}",
                cmake_path.display()
            )));
        }
        Ok(Self {
            resource_dir,
            cmake_path,
        })
    }

    /// Directory holding the SMCE runtime scripts and toolchain resources.
    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    /// Path of the build tool executable.
    pub fn cmake_path(&self) -> &Path {
        &self.cmake_path
    }

    /// Absolute path of the sketch configuration script.
    pub fn configure_script(&self) -> PathBuf {
        self.resource_dir.join(CONFIGURE_SCRIPT_PATH)
    }
}

/// Locate an executable by probing every `PATH` entry.
pub fn find_in_path(tool: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}
