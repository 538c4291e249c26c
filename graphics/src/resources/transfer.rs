//! Mappable staging buffers.

use std::sync::Arc;

use crate::device::Device;
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferUsage};

use super::{Buffer, BufferRef};

/// Which way a transfer buffer moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// CPU writes, GPU copies out of it.
    Upload,
    /// GPU copies into it, CPU reads.
    Download,
}

/// A CPU-mappable buffer used as the source of uploads or the destination of
/// downloads in a copy pass.
#[derive(Debug)]
pub struct TransferBuffer {
    buffer: Buffer,
    direction: TransferDirection,
}

impl TransferBuffer {
    /// Create a transfer buffer of `size` bytes.
    pub fn new(
        device: &Arc<Device>,
        direction: TransferDirection,
        size: u64,
    ) -> Result<Self, GraphicsError> {
        let (usage, label) = match direction {
            TransferDirection::Upload => (BufferUsage::UPLOAD_STAGING, "upload"),
            TransferDirection::Download => (BufferUsage::DOWNLOAD_STAGING, "download"),
        };
        let buffer = device.create_buffer(
            &BufferDescriptor::new(size, usage).with_label(format!("{label} transfer buffer")),
        )?;
        Ok(Self { buffer, direction })
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    /// Map, copy `data` in at `offset`, unmap.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        debug_assert_eq!(self.direction, TransferDirection::Upload);
        if self.direction != TransferDirection::Upload {
            return Err(GraphicsError::InvalidState(
                "write to a download transfer buffer".to_string(),
            ));
        }
        self.buffer
            .device()
            .backend()
            .write_mapped(self.buffer.gpu(), offset, data)
    }

    /// Map and read `len` bytes at `offset`.
    ///
    /// Only meaningful after the copy that filled the buffer has completed.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, GraphicsError> {
        debug_assert_eq!(self.direction, TransferDirection::Download);
        if self.direction != TransferDirection::Download {
            return Err(GraphicsError::InvalidState(
                "read from an upload transfer buffer".to_string(),
            ));
        }
        self.buffer
            .device()
            .backend()
            .read_mapped(self.buffer.gpu(), offset, len)
    }

    /// Non-owning handle for recording copy commands.
    pub fn share(&self) -> BufferRef {
        self.buffer.share()
    }

    pub fn release(&mut self) {
        self.buffer.release();
    }
}
