//! Read/write façade over the shared board state.
//!
//! A [`BoardView`] is a light, copyable handle over the BoardData root,
//! lifetime-bound to the runner's live region. Sub-views wrap the
//! individual hardware elements and expose the host side of each contract:
//! drive pin samples, feed uart rx, drain uart tx, exchange framebuffer
//! pixels.

use smce_common::board::FrameBufferDirection;
use smce_shared_memory::{
    BoardData, DirectStorage, FrameBuffer, Pin, PinCapabilities, PinMode, PixelFormat,
    ShmAllocator, ShmResult, StorageBus, UartChannel,
};
use std::sync::atomic::Ordering;

/// Copyable façade over a live board.
#[derive(Clone, Copy)]
pub struct BoardView<'a> {
    board: &'a BoardData,
    alloc: ShmAllocator<'a>,
}

impl<'a> BoardView<'a> {
    pub(crate) fn new(board: &'a BoardData, alloc: ShmAllocator<'a>) -> Self {
        Self { board, alloc }
    }

    /// FQBN the board was configured with.
    pub fn fqbn(&self) -> &'a str {
        self.board.fqbn.as_str(&self.alloc)
    }

    /// Pin by id, binary-searched over the sorted pin sequence.
    pub fn pin(&self, id: u16) -> Option<PinView<'a>> {
        let index = self.board.pin_index(&self.alloc, id)?;
        Some(PinView {
            pin: &self.board.pins.as_slice(&self.alloc)[index],
        })
    }

    /// Number of pins.
    pub fn pin_count(&self) -> usize {
        self.board.pins.len() as usize
    }

    /// Uart channel by position.
    pub fn uart(&self, index: usize) -> Option<UartView<'a>> {
        Some(UartView {
            uart: self.board.uart_channels.get(&self.alloc, index as u32)?,
            alloc: self.alloc,
        })
    }

    /// Number of uart channels.
    pub fn uart_count(&self) -> usize {
        self.board.uart_channels.len() as usize
    }

    /// Storage mount by position.
    pub fn storage(&self, index: usize) -> Option<StorageView<'a>> {
        Some(StorageView {
            storage: self.board.direct_storages.get(&self.alloc, index as u32)?,
            alloc: self.alloc,
        })
    }

    /// Number of storage mounts.
    pub fn storage_count(&self) -> usize {
        self.board.direct_storages.len() as usize
    }

    /// Framebuffer by key.
    pub fn frame_buffer(&self, key: u8) -> Option<FrameBufferView<'a>> {
        let buffers = self.board.frame_buffers.as_slice(&self.alloc);
        buffers.iter().find(|fb| fb.key == key).map(|fb| FrameBufferView {
            fb,
            alloc: self.alloc,
        })
    }
}

/// One pin of a live board.
#[derive(Clone, Copy)]
pub struct PinView<'a> {
    pin: &'a Pin,
}

impl PinView<'_> {
    /// Pin id.
    pub fn id(&self) -> u16 {
        self.pin.id
    }

    /// Capability flags.
    pub fn capabilities(&self) -> PinCapabilities {
        self.pin.capabilities()
    }

    /// Current mode as set by the sketch.
    pub fn mode(&self) -> PinMode {
        self.pin.pin_mode()
    }

    /// Last value the sketch wrote to this pin.
    pub fn read(&self) -> u16 {
        self.pin.value.load(Ordering::Acquire)
    }

    /// Drive the externally sampled value the sketch reads.
    pub fn drive(&self, value: u16) {
        self.pin.sample.store(value, Ordering::Release);
    }
}

/// One uart channel of a live board.
#[derive(Clone, Copy)]
pub struct UartView<'a> {
    uart: &'a UartChannel,
    alloc: ShmAllocator<'a>,
}

impl UartView<'_> {
    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.uart.baud_rate
    }

    /// Feed bytes toward the sketch; returns how many fit in the rx ring.
    pub fn feed(&self, bytes: &[u8]) -> usize {
        self.uart.rx.write(&self.alloc, bytes)
    }

    /// Drain bytes the sketch transmitted; returns how many were pulled.
    pub fn drain(&self, buf: &mut [u8]) -> usize {
        self.uart.tx.read(&self.alloc, buf)
    }

    /// Bytes buffered in the sketch-to-host direction.
    pub fn tx_pending(&self) -> u32 {
        self.uart.tx.len()
    }

    /// Bytes buffered in the host-to-sketch direction.
    pub fn rx_pending(&self) -> u32 {
        self.uart.rx.len()
    }
}

/// One storage mount of a live board.
#[derive(Clone, Copy)]
pub struct StorageView<'a> {
    storage: &'a DirectStorage,
    alloc: ShmAllocator<'a>,
}

impl<'a> StorageView<'a> {
    /// Bus the storage is attached to.
    pub fn bus(&self) -> StorageBus {
        StorageBus::from_u8(self.storage.bus)
    }

    /// Accessor id (chip-select pin).
    pub fn accessor(&self) -> u16 {
        self.storage.accessor
    }

    /// Filesystem root the guest mounts, forward-slash form.
    pub fn root_dir(&self) -> &'a str {
        self.storage.root_dir.as_str(&self.alloc)
    }
}

/// One framebuffer of a live board.
#[derive(Clone, Copy)]
pub struct FrameBufferView<'a> {
    fb: &'a FrameBuffer,
    alloc: ShmAllocator<'a>,
}

impl FrameBufferView<'_> {
    /// Surface key.
    pub fn key(&self) -> u8 {
        self.fb.key
    }

    /// Transfer direction.
    pub fn direction(&self) -> FrameBufferDirection {
        FrameBufferDirection::from_u8(self.fb.direction)
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.fb.pixel_format()
    }

    /// Surface width in pixels.
    pub fn width(&self) -> u16 {
        self.fb.width.load(Ordering::Acquire)
    }

    /// Surface height in pixels.
    pub fn height(&self) -> u16 {
        self.fb.height.load(Ordering::Acquire)
    }

    /// Set the surface dimensions and size the pixel storage accordingly.
    pub fn set_dimensions(&self, width: u16, height: u16) -> ShmResult<()> {
        let bytes =
            width as usize * height as usize * self.format().bytes_per_pixel();
        self.fb.data.resize_zeroed(&self.alloc, bytes as u32)?;
        self.fb.width.store(width, Ordering::Release);
        self.fb.height.store(height, Ordering::Release);
        Ok(())
    }

    /// Copy pixel bytes out; returns how many were copied.
    pub fn read_into(&self, buf: &mut [u8]) -> usize {
        let data = self.fb.data.as_slice(&self.alloc);
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        n
    }

    /// Replace the pixel bytes.
    pub fn write_from(&self, bytes: &[u8]) -> ShmResult<()> {
        self.fb.data.copy_from(&self.alloc, bytes)
    }
}
