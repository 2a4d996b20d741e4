//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across the SMCE workspace.
//!
//! # Usage
//!
//! ```rust,no_run
//! use smce_common::config::{ConfigError, ConfigLoader};
//! use smce_common::board::BoardConfig;
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = BoardConfig::load(Path::new("board.toml"))?;
//!     println!("{} pins declared", config.pins.len());
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// A path in the configuration is not representable as unicode.
    #[error("Path is not valid unicode: {}", .0.display())]
    PathEncoding(PathBuf),
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file and run [`validate`](Self::validate).
    fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound);
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation hook; the default accepts everything.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}
