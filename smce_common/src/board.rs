//! Board hardware configuration types.
//!
//! A [`BoardConfig`] declares the simulated hardware surface a sketch runs
//! against: the pin set, what each pin can do (gpio drivers), uart channels,
//! virtual SD-card mounts and framebuffers. The runner materializes it into
//! shared memory at configure time; the structure is immutable afterwards.

use crate::config::{ConfigError, ConfigLoader};
use crate::consts::UNUSED_PIN_OVERRIDE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_pin_override() -> u8 {
    UNUSED_PIN_OVERRIDE
}

fn default_buffer_length() -> u16 {
    64
}

/// One directional half of a gpio driver declaration.
///
/// `board_read`/`board_write` are from the board's perspective: a pin the
/// sketch can `analogRead` has an analog endpoint with `board_read = true`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriverEndpoints {
    /// The sketch may sample this pin.
    #[serde(default)]
    pub board_read: bool,
    /// The sketch may drive this pin.
    #[serde(default)]
    pub board_write: bool,
}

/// Declares what a given pin can do.
///
/// A driver may contribute analog capabilities, digital capabilities, both,
/// or neither. Drivers naming a pin outside the declared pin set are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioDriverConfig {
    /// Target pin id.
    pub pin_id: u16,
    /// Analog capability contribution, if any.
    #[serde(default)]
    pub analog: Option<DriverEndpoints>,
    /// Digital capability contribution, if any.
    #[serde(default)]
    pub digital: Option<DriverEndpoints>,
}

/// One uart channel of the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UartChannelConfig {
    /// Baud rate presented to the sketch.
    pub baud_rate: u32,
    /// Pin carrying rx, `u8::MAX` when unused.
    #[serde(default = "default_pin_override")]
    pub rx_pin_override: u8,
    /// Pin carrying tx, `u8::MAX` when unused.
    #[serde(default = "default_pin_override")]
    pub tx_pin_override: u8,
    /// Capacity of the host-to-sketch ring buffer in bytes.
    #[serde(default = "default_buffer_length")]
    pub rx_buffer_length: u16,
    /// Capacity of the sketch-to-host ring buffer in bytes.
    #[serde(default = "default_buffer_length")]
    pub tx_buffer_length: u16,
}

/// A virtual SD-card mount accessed over SPI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdCardConfig {
    /// Chip-select pin.
    pub cspin: u16,
    /// Host directory the guest interprets as the card's filesystem root.
    pub root_dir: PathBuf,
}

/// Transfer direction of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameBufferDirection {
    /// Host supplies frames to the sketch (camera).
    In,
    /// Sketch produces frames for the host (display).
    Out,
}

impl FrameBufferDirection {
    /// Raw tag stored in shared memory.
    pub const fn as_u8(self) -> u8 {
        match self {
            FrameBufferDirection::In => 0,
            FrameBufferDirection::Out => 1,
        }
    }

    /// Decode a raw tag; unknown values read as `Out`.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => FrameBufferDirection::In,
            _ => FrameBufferDirection::Out,
        }
    }
}

/// One framebuffer surface of the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameBufferConfig {
    /// Key the sketch uses to address this surface.
    pub key: u8,
    /// Transfer direction.
    pub direction: FrameBufferDirection,
}

/// Full board hardware configuration.
///
/// # TOML Example
///
/// ```toml
/// pins = [0, 1, 2]
///
/// [[gpio_drivers]]
/// pin_id = 0
/// digital = { board_read = true, board_write = true }
///
/// [[uart_channels]]
/// baud_rate = 9600
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Declared pin ids; stored sorted ascending in shared memory.
    #[serde(default)]
    pub pins: Vec<u16>,
    /// Gpio capability declarations.
    #[serde(default)]
    pub gpio_drivers: Vec<GpioDriverConfig>,
    /// Uart channels, in declaration order.
    #[serde(default)]
    pub uart_channels: Vec<UartChannelConfig>,
    /// Virtual SD-card mounts, in declaration order.
    #[serde(default)]
    pub sd_cards: Vec<SdCardConfig>,
    /// Framebuffers, in declaration order.
    #[serde(default)]
    pub frame_buffers: Vec<FrameBufferConfig>,
}

impl BoardConfig {
    /// Validate the board configuration.
    ///
    /// # Validation Rules
    /// 1. Pin ids are unique.
    /// 2. Framebuffer keys are unique.
    /// 3. SD-card root paths are representable as unicode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut pins = self.pins.clone();
        pins.sort_unstable();
        if pins.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationError(
                "duplicate pin id in pin list".to_string(),
            ));
        }

        let mut keys: Vec<u8> = self.frame_buffers.iter().map(|f| f.key).collect();
        keys.sort_unstable();
        if keys.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationError(
                "duplicate framebuffer key".to_string(),
            ));
        }

        for card in &self.sd_cards {
            if card.root_dir.to_str().is_none() {
                return Err(ConfigError::PathEncoding(card.root_dir.clone()));
            }
        }

        Ok(())
    }
}

impl ConfigLoader for BoardConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        BoardConfig::validate(self)
    }
}
