//! GPU buffer resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::GpuBuffer;
use crate::device::Device;
use crate::types::{BufferDescriptor, BufferUsage};

pub(crate) struct BufferInner {
    device: Arc<Device>,
    descriptor: BufferDescriptor,
    gpu: GpuBuffer,
    released: AtomicBool,
}

impl BufferInner {
    /// Free the GPU buffer once. Returns whether this call freed it.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.device.backend().destroy_buffer(&self.gpu);
        self.device.on_buffer_released();
        log::trace!("released buffer '{}'", self.descriptor.display_label());
        true
    }
}

/// An owned GPU buffer.
///
/// Buffers are created by [`Device::create_buffer`]. The handle has exactly
/// one owner; it frees the GPU memory on [`release`](Self::release) or drop.
/// Use [`share`](Self::share) to hand out non-owning [`BufferRef`]s.
///
/// # Example
///
/// ```ignore
/// let mut buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// let view = buffer.share();
/// buffer.release();
/// buffer.release(); // no-op
/// assert!(view.is_released());
/// ```
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Wrap a backend buffer (called by Device).
    pub(crate) fn new(device: Arc<Device>, descriptor: BufferDescriptor, gpu: GpuBuffer) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                device,
                descriptor,
                gpu,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<Device> {
        &self.inner.device
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.inner.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.inner.descriptor.usage
    }

    pub fn label(&self) -> &str {
        self.inner.descriptor.display_label()
    }

    /// Backend handle.
    pub fn gpu(&self) -> &GpuBuffer {
        &self.inner.gpu
    }

    /// Non-owning handle to the same buffer.
    pub fn share(&self) -> BufferRef {
        BufferRef {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Free the GPU buffer. Calling this again is a no-op.
    pub fn release(&mut self) {
        self.inner.release();
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.inner.descriptor.size)
            .field("usage", &self.inner.descriptor.usage)
            .field("label", &self.inner.descriptor.label)
            .field("released", &self.is_released())
            .finish()
    }
}

/// A borrowed GPU buffer.
///
/// Cloning is cheap. A `BufferRef` never frees the buffer; its owner does.
#[derive(Clone)]
pub struct BufferRef {
    inner: Arc<BufferInner>,
}

impl BufferRef {
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.inner.descriptor
    }

    pub fn size(&self) -> u64 {
        self.inner.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.inner.descriptor.usage
    }

    pub fn label(&self) -> &str {
        self.inner.descriptor.display_label()
    }

    pub fn gpu(&self) -> &GpuBuffer {
        &self.inner.gpu
    }

    /// Whether the owner has released the buffer.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Whether both handles name the same buffer.
    pub fn same_buffer(&self, other: &BufferRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// No-op: borrowed buffers are released by their owner.
    pub fn release(&mut self) {
        log::trace!(
            "ignoring release of borrowed buffer '{}'",
            self.inner.descriptor.display_label()
        );
    }
}

impl PartialEq for BufferRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_buffer(other)
    }
}

impl Eq for BufferRef {}

impl std::fmt::Debug for BufferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRef")
            .field("size", &self.inner.descriptor.size)
            .field("label", &self.inner.descriptor.label)
            .finish()
    }
}

// Ensure buffers are Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);
static_assertions::assert_impl_all!(BufferRef: Send, Sync, Clone);
static_assertions::assert_not_impl_any!(Buffer: Clone);
