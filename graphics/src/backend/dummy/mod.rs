//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. Buffers and textures live in CPU
//! memory, copy passes move real bytes, render passes apply their clears, and
//! draws through depth-only pipelines are rasterized in software (see
//! [`raster`]). That is enough to test uploads, readbacks and depth passes
//! without GPU hardware.

mod execute;
pub mod raster;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::Command;
use crate::device::DeviceDescriptor;
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipelineDescriptor;
use crate::shader::{ShaderFormat, ShaderSource};
use crate::types::{
    BufferDescriptor, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};
use crate::window::RenderWindow;

use super::{
    BackendType, GpuBackend, GpuBuffer, GpuFence, GpuPipeline, GpuSampler, GpuShader,
    GpuSurface, GpuTexture,
};

/// CPU memory behind a dummy buffer.
pub struct DummyBuffer {
    data: Mutex<Vec<u8>>,
    destroyed: AtomicBool,
}

impl DummyBuffer {
    fn new(size: u64) -> Self {
        Self {
            data: Mutex::new(vec![0; size as usize]),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Copy of the buffer contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub(crate) fn data(&self) -> parking_lot::MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }
}

impl std::fmt::Debug for DummyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBuffer")
            .field("size", &self.data.lock().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// CPU memory behind a dummy texture.
///
/// Color texels are stored in their format's byte layout. Depth texels of
/// every depth format are stored as `f32`.
pub struct DummyTexture {
    descriptor: TextureDescriptor,
    data: Mutex<Vec<u8>>,
    destroyed: AtomicBool,
}

impl DummyTexture {
    fn new(descriptor: &TextureDescriptor) -> Self {
        let len = descriptor.size.texel_count()
            * descriptor.size.depth as usize
            * Self::stored_texel_size(descriptor.format) as usize;
        Self {
            descriptor: descriptor.clone(),
            data: Mutex::new(vec![0; len]),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Bytes each texel of `format` takes in dummy storage.
    pub fn stored_texel_size(format: TextureFormat) -> u32 {
        if format.is_depth_stencil() {
            4
        } else {
            format.block_size()
        }
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn data(&self) -> parking_lot::MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }
}

impl std::fmt::Debug for DummyTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyTexture")
            .field("label", &self.descriptor.label)
            .field("format", &self.descriptor.format)
            .field("size", &self.descriptor.size)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    depth_formats: Vec<TextureFormat>,
}

impl DummyBackend {
    /// Create a new dummy backend supporting every depth format.
    pub fn new() -> Self {
        Self {
            depth_formats: TextureFormat::DEPTH_FORMATS.to_vec(),
        }
    }

    /// Create a dummy backend configured from a device descriptor.
    pub fn with_descriptor(descriptor: &DeviceDescriptor) -> Self {
        match &descriptor.dummy_depth_formats {
            Some(formats) => Self::with_depth_formats(formats.clone()),
            None => Self::new(),
        }
    }

    /// Create a dummy backend that only accepts the given depth formats.
    pub fn with_depth_formats(depth_formats: Vec<TextureFormat>) -> Self {
        Self { depth_formats }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn dummy_buffer(buffer: &GpuBuffer) -> Result<&Arc<DummyBuffer>, GraphicsError> {
    match buffer {
        GpuBuffer::Dummy(buffer) => Ok(buffer),
        #[cfg(feature = "wgpu-backend")]
        _ => Err(GraphicsError::Internal(
            "buffer does not belong to the dummy backend".to_string(),
        )),
    }
}

pub(crate) fn dummy_texture(texture: &GpuTexture) -> Result<&Arc<DummyTexture>, GraphicsError> {
    match texture {
        GpuTexture::Dummy(texture) => Ok(texture),
        #[cfg(feature = "wgpu-backend")]
        _ => Err(GraphicsError::Internal(
            "texture does not belong to the dummy backend".to_string(),
        )),
    }
}

fn check_range(what: &str, offset: u64, size: u64, len: usize) -> Result<(), GraphicsError> {
    let end = offset.checked_add(size);
    match end {
        Some(end) if end <= len as u64 => Ok(()),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "{what}: range {offset}..{offset}+{size} exceeds buffer size {len}"
        ))),
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Dummy
    }

    fn shader_formats(&self) -> ShaderFormat {
        ShaderFormat::WGSL
    }

    fn supports_texture_format(&self, format: TextureFormat, usage: TextureUsage) -> bool {
        if format.is_depth_stencil() {
            self.depth_formats.contains(&format) && !usage.contains(TextureUsage::STORAGE_BINDING)
        } else {
            true
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Dummy(Arc::new(DummyBuffer::new(descriptor.size))))
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        if let Ok(buffer) = dummy_buffer(buffer) {
            buffer.destroyed.store(true, Ordering::Release);
            let mut data = buffer.data.lock();
            data.clear();
            data.shrink_to_fit();
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        if !self.supports_texture_format(descriptor.format, descriptor.usage) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture '{}': format {:?} with usage {:?} is not supported by the dummy backend",
                descriptor.display_label(),
                descriptor.format,
                descriptor.usage
            )));
        }
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(GpuTexture::Dummy(Arc::new(DummyTexture::new(descriptor))))
    }

    fn destroy_texture(&self, texture: &GpuTexture) {
        if let Ok(texture) = dummy_texture(texture) {
            texture.destroyed.store(true, Ordering::Release);
            let mut data = texture.data.lock();
            data.clear();
            data.shrink_to_fit();
        }
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        Ok(GpuSampler::Dummy)
    }

    fn create_shader(&self, source: &ShaderSource) -> Result<GpuShader, GraphicsError> {
        log::trace!("DummyBackend: creating shader {}", source.name);
        Ok(GpuShader::Dummy)
    }

    fn create_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        log::trace!("DummyBackend: creating pipeline {:?}", descriptor.label);
        Ok(GpuPipeline::Dummy)
    }

    fn write_mapped(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let buffer = dummy_buffer(buffer)?;
        if buffer.is_destroyed() {
            return Err(GraphicsError::InvalidState(
                "write to a released transfer buffer".to_string(),
            ));
        }
        let mut contents = buffer.data.lock();
        check_range("write_mapped", offset, data.len() as u64, contents.len())?;
        let start = offset as usize;
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let buffer = dummy_buffer(buffer)?;
        if buffer.is_destroyed() {
            return Err(GraphicsError::InvalidState(
                "read from a released transfer buffer".to_string(),
            ));
        }
        let contents = buffer.data.lock();
        check_range("read_mapped", offset, size, contents.len())?;
        let start = offset as usize;
        Ok(contents[start..start + size as usize].to_vec())
    }

    fn submit(&self, commands: &[Command]) -> Result<GpuFence, GraphicsError> {
        log::trace!("DummyBackend: executing {} commands", commands.len());
        execute::execute(commands)?;
        // Execution is synchronous, so the work is already complete.
        Ok(GpuFence::Dummy {
            signaled: AtomicBool::new(true),
        })
    }

    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        match fence {
            GpuFence::Dummy { signaled } => {
                while !signaled.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
                Ok(())
            }
            #[cfg(feature = "wgpu-backend")]
            GpuFence::Wgpu { .. } => Err(GraphicsError::Internal(
                "fence does not belong to the dummy backend".to_string(),
            )),
        }
    }

    fn create_surface(&self, window: &RenderWindow) -> Result<GpuSurface, GraphicsError> {
        match window {
            RenderWindow::Headless { .. } => Ok(GpuSurface::Headless),
            #[allow(unreachable_patterns)]
            _ => Err(GraphicsError::InitializationFailed(
                "the dummy backend can only render headless".to_string(),
            )),
        }
    }

    fn surface_format(&self, _surface: &GpuSurface) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn configure_surface(
        &self,
        _surface: &GpuSurface,
        _width: u32,
        _height: u32,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn acquire_surface_texture(
        &self,
        _surface: &GpuSurface,
    ) -> Result<Option<GpuTexture>, GraphicsError> {
        // Headless surfaces are backed by a renderer-owned texture.
        Ok(None)
    }

    fn present(&self, _surface: &GpuSurface) {}
}
