//! In-shm representation of the board hardware state.
//!
//! [`BoardData`] and everything it links to is built inside a region at
//! configure time from a [`BoardConfig`]; the structure (pin set, channel
//! count, capacities) is immutable afterwards, while per-field state (pin
//! values, ring contents, framebuffer pixels) is mutated concurrently by
//! host and guest through atomics and the container primitives.

use crate::arena::ShmAllocator;
use crate::containers::{ShmRing, ShmString, ShmVec};
use crate::error::{ShmError, ShmResult};
use bitflags::bitflags;
use smce_common::board::{BoardConfig, DriverEndpoints, UartChannelConfig};
use smce_common::consts::{FRAME_BUFFER_ALLOWANCE, SHM_MIN_SIZE};
use static_assertions::const_assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};

bitflags! {
    /// What a pin can do, as declared by its gpio drivers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PinCapabilities: u8 {
        /// Sketch may `analogRead` this pin.
        const ANALOG_READ = 1 << 0;
        /// Sketch may `analogWrite` this pin.
        const ANALOG_WRITE = 1 << 1;
        /// Sketch may `digitalRead` this pin.
        const DIGITAL_READ = 1 << 2;
        /// Sketch may `digitalWrite` this pin.
        const DIGITAL_WRITE = 1 << 3;
    }
}

/// Discrete pin mode set by the sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PinMode {
    /// High-impedance input.
    #[default]
    Input = 0,
    /// Driven output.
    Output = 1,
    /// Input with pull-up engaged.
    InputPullup = 2,
}

impl PinMode {
    /// Decode a raw mode byte; unknown values read as `Input`.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PinMode::Output,
            2 => PinMode::InputPullup,
            _ => PinMode::Input,
        }
    }
}

/// One pin of the board.
///
/// Identity and capabilities are fixed at configure time; mode and the two
/// value fields are shared mutable state.
#[repr(C)]
pub struct Pin {
    /// Pin id, unique and ascending within the pin sequence.
    pub id: u16,
    caps: u8,
    /// Current mode, one of [`PinMode`].
    pub mode: AtomicU8,
    /// Last value written by the sketch.
    pub value: AtomicU16,
    /// Last value sampled from the outside (what the sketch reads).
    pub sample: AtomicU16,
}

const_assert_eq!(std::mem::size_of::<Pin>(), 8);

impl Pin {
    fn new(id: u16, caps: PinCapabilities) -> Self {
        Self {
            id,
            caps: caps.bits(),
            mode: AtomicU8::new(PinMode::Input as u8),
            value: AtomicU16::new(0),
            sample: AtomicU16::new(0),
        }
    }

    /// Capability flags of this pin.
    pub fn capabilities(&self) -> PinCapabilities {
        PinCapabilities::from_bits_truncate(self.caps)
    }

    /// Current mode.
    pub fn pin_mode(&self) -> PinMode {
        PinMode::from_u8(self.mode.load(Ordering::Acquire))
    }
}

/// One uart channel with its two byte rings.
#[repr(C)]
pub struct UartChannel {
    /// Host-to-sketch ring.
    pub rx: ShmRing,
    /// Sketch-to-host ring.
    pub tx: ShmRing,
    /// Baud rate presented to the sketch.
    pub baud_rate: u32,
    /// Rx pin override, `u8::MAX` when unused.
    pub rx_pin_override: u8,
    /// Tx pin override, `u8::MAX` when unused.
    pub tx_pin_override: u8,
    /// Rx ring capacity in bytes.
    pub max_buffered_rx: u16,
    /// Tx ring capacity in bytes.
    pub max_buffered_tx: u16,
}

impl UartChannel {
    fn new(alloc: &ShmAllocator<'_>, conf: &UartChannelConfig) -> ShmResult<Self> {
        Ok(Self {
            rx: ShmRing::with_capacity(alloc, conf.rx_buffer_length as u32)?,
            tx: ShmRing::with_capacity(alloc, conf.tx_buffer_length as u32)?,
            baud_rate: conf.baud_rate,
            rx_pin_override: conf.rx_pin_override,
            tx_pin_override: conf.tx_pin_override,
            max_buffered_rx: conf.rx_buffer_length,
            max_buffered_tx: conf.tx_buffer_length,
        })
    }
}

/// Bus a direct storage is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageBus {
    /// SPI, the only supported bus.
    Spi = 0,
}

impl StorageBus {
    /// Decode a raw bus tag; unknown values read as `Spi`.
    pub const fn from_u8(_raw: u8) -> Self {
        StorageBus::Spi
    }
}

/// A virtual SD-card mount.
#[repr(C)]
pub struct DirectStorage {
    /// Host directory the guest treats as the card root, forward-slash form.
    pub root_dir: ShmString,
    /// Bus tag, see [`StorageBus`].
    pub bus: u8,
    /// Accessor id, the chip-select pin.
    pub accessor: u16,
}

/// Pixel encoding of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PixelFormat {
    /// 24-bit RGB, 3 bytes per pixel.
    #[default]
    Rgb888 = 0,
    /// 12-bit RGB packed in 2 bytes per pixel.
    Rgb444 = 1,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb444 => 2,
        }
    }

    /// Decode a raw format byte; unknown values read as `Rgb888`.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PixelFormat::Rgb444,
            _ => PixelFormat::Rgb888,
        }
    }
}

/// One framebuffer surface.
///
/// The pixel vector starts empty; the guest sizes it to
/// `width * height * bpp` when the sketch opens the surface.
#[repr(C)]
pub struct FrameBuffer {
    /// Pixel bytes.
    pub data: ShmVec<u8>,
    /// Key the sketch addresses this surface by.
    pub key: u8,
    /// Transfer direction tag, see `FrameBufferDirection`.
    pub direction: u8,
    /// Pixel format tag, see [`PixelFormat`].
    pub format: u8,
    /// Surface width in pixels.
    pub width: AtomicU16,
    /// Surface height in pixels.
    pub height: AtomicU16,
}

impl FrameBuffer {
    /// Pixel format of this surface.
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_u8(self.format)
    }
}

/// Root aggregate of the in-shm board state.
#[repr(C)]
pub struct BoardData {
    /// FQBN recorded at configure time for the attaching child.
    pub fqbn: ShmString,
    /// Pins, sorted ascending by id.
    pub pins: ShmVec<Pin>,
    /// Uart channels in configuration order.
    pub uart_channels: ShmVec<UartChannel>,
    /// Storage mounts in configuration order.
    pub direct_storages: ShmVec<DirectStorage>,
    /// Framebuffers in configuration order.
    pub frame_buffers: ShmVec<FrameBuffer>,
}

impl BoardData {
    /// Construct the board state inside the region; returns the root offset.
    ///
    /// Follows the configure algorithm: pin ids are sorted, each gpio driver
    /// is matched to its pin by binary search (drivers naming undeclared
    /// pins are skipped), uarts/storages/framebuffers are appended in
    /// configuration order.
    pub fn construct(
        alloc: &ShmAllocator<'_>,
        fqbn: &str,
        conf: &BoardConfig,
    ) -> ShmResult<u64> {
        let mut sorted_ids = conf.pins.clone();
        sorted_ids.sort_unstable();

        let mut caps = vec![PinCapabilities::empty(); sorted_ids.len()];
        for driver in &conf.gpio_drivers {
            let Ok(index) = sorted_ids.binary_search(&driver.pin_id) else {
                continue;
            };
            if let Some(analog) = &driver.analog {
                apply_endpoints(
                    &mut caps[index],
                    PinCapabilities::ANALOG_READ,
                    PinCapabilities::ANALOG_WRITE,
                    analog,
                );
            }
            if let Some(digital) = &driver.digital {
                apply_endpoints(
                    &mut caps[index],
                    PinCapabilities::DIGITAL_READ,
                    PinCapabilities::DIGITAL_WRITE,
                    digital,
                );
            }
        }

        let pins = ShmVec::with_capacity(alloc, sorted_ids.len() as u32)?;
        for (id, cap) in sorted_ids.iter().zip(caps) {
            pins.push(alloc, Pin::new(*id, cap))?;
        }

        let uart_channels = ShmVec::with_capacity(alloc, conf.uart_channels.len() as u32)?;
        for uart_conf in &conf.uart_channels {
            uart_channels.push(alloc, UartChannel::new(alloc, uart_conf)?)?;
        }

        let direct_storages = ShmVec::with_capacity(alloc, conf.sd_cards.len() as u32)?;
        for card in &conf.sd_cards {
            direct_storages.push(
                alloc,
                DirectStorage {
                    root_dir: ShmString::from_str(alloc, &generic_string(&card.root_dir)?)?,
                    bus: StorageBus::Spi as u8,
                    accessor: card.cspin,
                },
            )?;
        }

        let frame_buffers = ShmVec::with_capacity(alloc, conf.frame_buffers.len() as u32)?;
        for fb_conf in &conf.frame_buffers {
            frame_buffers.push(
                alloc,
                FrameBuffer {
                    data: ShmVec::new(),
                    key: fb_conf.key,
                    direction: fb_conf.direction.as_u8(),
                    format: PixelFormat::default() as u8,
                    width: AtomicU16::new(0),
                    height: AtomicU16::new(0),
                },
            )?;
        }

        let root = BoardData {
            fqbn: ShmString::from_str(alloc, fqbn)?,
            pins,
            uart_channels,
            direct_storages,
            frame_buffers,
        };
        let root_off = alloc.alloc(
            std::mem::size_of::<BoardData>(),
            std::mem::align_of::<BoardData>(),
        )?;
        // SAFETY: freshly allocated, properly aligned slot for a BoardData
        unsafe {
            alloc.ptr_at::<BoardData>(root_off).write(root);
        }
        Ok(root_off)
    }

    /// Position of a pin in the sorted pin sequence.
    pub fn pin_index(&self, alloc: &ShmAllocator<'_>, id: u16) -> Option<usize> {
        self.pins
            .as_slice(alloc)
            .binary_search_by_key(&id, |pin| pin.id)
            .ok()
    }
}

/// A driver endpoint pair overwrites both flags of its plane, so the last
/// driver naming a pin wins per capability flag.
fn apply_endpoints(
    caps: &mut PinCapabilities,
    read: PinCapabilities,
    write: PinCapabilities,
    endpoints: &DriverEndpoints,
) {
    caps.set(read, endpoints.board_read);
    caps.set(write, endpoints.board_write);
}

/// Render a path the way the guest expects: forward slashes only.
fn generic_string(path: &Path) -> ShmResult<String> {
    let s = path.to_str().ok_or_else(|| ShmError::PathEncoding {
        path: path.to_path_buf(),
    })?;
    Ok(s.replace('\\', "/"))
}

/// Region size needed to hold the board state of `conf`, page-rounded.
///
/// Uart rings and storage paths are sized exactly; framebuffers get a fixed
/// allowance since the guest sizes their pixel storage at runtime.
pub fn required_region_size(conf: &BoardConfig) -> usize {
    let mut size = SHM_MIN_SIZE; // header, root, container slack
    size += conf.pins.len() * std::mem::size_of::<Pin>();
    for uart in &conf.uart_channels {
        size += std::mem::size_of::<UartChannel>()
            + uart.rx_buffer_length as usize
            + uart.tx_buffer_length as usize;
    }
    for card in &conf.sd_cards {
        size += std::mem::size_of::<DirectStorage>() + card.root_dir.as_os_str().len();
    }
    size += conf.frame_buffers.len()
        * (std::mem::size_of::<FrameBuffer>() + FRAME_BUFFER_ALLOWANCE);
    size.next_multiple_of(SHM_MIN_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_flags_round_trip() {
        let pin = Pin::new(7, PinCapabilities::DIGITAL_READ | PinCapabilities::DIGITAL_WRITE);
        assert!(pin.capabilities().contains(PinCapabilities::DIGITAL_READ));
        assert!(!pin.capabilities().contains(PinCapabilities::ANALOG_READ));
    }

    #[test]
    fn endpoints_overwrite_their_plane_only() {
        let mut caps = PinCapabilities::ANALOG_READ | PinCapabilities::DIGITAL_WRITE;
        apply_endpoints(
            &mut caps,
            PinCapabilities::ANALOG_READ,
            PinCapabilities::ANALOG_WRITE,
            &DriverEndpoints {
                board_read: false,
                board_write: true,
            },
        );
        assert_eq!(
            caps,
            PinCapabilities::ANALOG_WRITE | PinCapabilities::DIGITAL_WRITE
        );
    }

    #[test]
    fn region_sizing_is_page_rounded() {
        let conf = BoardConfig {
            pins: vec![0, 1, 2],
            ..Default::default()
        };
        let size = required_region_size(&conf);
        assert_eq!(size % SHM_MIN_SIZE, 0);
        assert!(size >= SHM_MIN_SIZE);
    }

    #[test]
    fn pin_mode_decodes_unknown_as_input() {
        assert_eq!(PinMode::from_u8(0xEE), PinMode::Input);
        assert_eq!(PinMode::from_u8(1), PinMode::Output);
    }
}
