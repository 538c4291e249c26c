//! GPU texture resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::GpuTexture;
use crate::device::Device;
use crate::types::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

pub(crate) struct TextureInner {
    device: Arc<Device>,
    descriptor: TextureDescriptor,
    gpu: GpuTexture,
    released: AtomicBool,
    /// Owned by something outside this crate (a swapchain image); never destroyed here.
    external: bool,
}

impl TextureInner {
    fn release(&self) -> bool {
        if self.external || self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.device.backend().destroy_texture(&self.gpu);
        self.device.on_texture_released();
        log::trace!("released texture '{}'", self.descriptor.display_label());
        true
    }
}

/// An owned GPU texture.
///
/// Textures are created by [`Device::create_texture`]. The handle frees the
/// GPU texture on [`release`](Self::release) or drop; release is idempotent.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     1920, 1080,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::RENDER_ATTACHMENT,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl Texture {
    /// Wrap a backend texture (called by Device).
    pub(crate) fn new(device: Arc<Device>, descriptor: TextureDescriptor, gpu: GpuTexture) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                device,
                descriptor,
                gpu,
                released: AtomicBool::new(false),
                external: false,
            }),
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<Device> {
        &self.inner.device
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.inner.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.inner.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.inner.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.inner.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.inner.descriptor.format
    }

    pub fn usage(&self) -> TextureUsage {
        self.inner.descriptor.usage
    }

    pub fn label(&self) -> &str {
        self.inner.descriptor.display_label()
    }

    pub fn gpu(&self) -> &GpuTexture {
        &self.inner.gpu
    }

    /// Non-owning handle to the same texture.
    pub fn share(&self) -> TextureRef {
        TextureRef {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Free the GPU texture. Calling this again is a no-op.
    pub fn release(&mut self) {
        self.inner.release();
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("size", &self.inner.descriptor.size)
            .field("format", &self.inner.descriptor.format)
            .field("usage", &self.inner.descriptor.usage)
            .field("label", &self.inner.descriptor.label)
            .finish()
    }
}

/// A borrowed GPU texture. Never frees the texture.
#[derive(Clone)]
pub struct TextureRef {
    inner: Arc<TextureInner>,
}

impl TextureRef {
    /// Wrap a texture whose lifetime is managed outside this crate, such as a
    /// swapchain image.
    pub(crate) fn external(
        device: Arc<Device>,
        descriptor: TextureDescriptor,
        gpu: GpuTexture,
    ) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                device,
                descriptor,
                gpu,
                released: AtomicBool::new(false),
                external: true,
            }),
        }
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.inner.descriptor
    }

    pub fn size(&self) -> Extent3d {
        self.inner.descriptor.size
    }

    pub fn width(&self) -> u32 {
        self.inner.descriptor.size.width
    }

    pub fn height(&self) -> u32 {
        self.inner.descriptor.size.height
    }

    pub fn format(&self) -> TextureFormat {
        self.inner.descriptor.format
    }

    pub fn usage(&self) -> TextureUsage {
        self.inner.descriptor.usage
    }

    pub fn label(&self) -> &str {
        self.inner.descriptor.display_label()
    }

    pub fn gpu(&self) -> &GpuTexture {
        &self.inner.gpu
    }

    /// Whether the owner has released the texture.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    pub fn same_texture(&self, other: &TextureRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// No-op: borrowed textures are released by their owner.
    pub fn release(&mut self) {
        log::trace!(
            "ignoring release of borrowed texture '{}'",
            self.inner.descriptor.display_label()
        );
    }
}

impl std::fmt::Debug for TextureRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureRef")
            .field("size", &self.inner.descriptor.size)
            .field("format", &self.inner.descriptor.format)
            .field("label", &self.inner.descriptor.label)
            .finish()
    }
}

// Ensure textures are Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(TextureRef: Send, Sync, Clone);
