//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction for GPU backends,
//! allowing the graphics crate to work with different GPU APIs.
//!
//! # Available Backends
//!
//! - `dummy`: CPU reference backend. Buffers and textures hold real bytes,
//!   copy passes execute and depth-only pipelines are rasterized in software.
//!   Used for testing without GPU hardware.
//! - `wgpu-backend`: Cross-platform backend using wgpu
//!
//! # Architecture
//!
//! Each backend implements the [`GpuBackend`] trait, which provides:
//! - Resource creation and destruction (buffers, textures, samplers, shaders, pipelines)
//! - Mapped transfer-buffer access
//! - Execution of recorded command buffers
//! - Window surfaces and swapchain images

pub mod dummy;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_impl;

use std::sync::Arc;

use crate::command::Command;
use crate::device::DeviceDescriptor;
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipelineDescriptor;
use crate::shader::{ShaderFormat, ShaderSource};
use crate::types::{
    BufferDescriptor, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};
use crate::window::RenderWindow;

/// Which backend a device should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Try wgpu, fall back to the dummy backend.
    #[default]
    Auto,
    /// CPU reference backend.
    Dummy,
    /// wgpu on a real adapter.
    Wgpu,
}

/// Handle to a GPU buffer resource.
#[derive(Clone)]
pub enum GpuBuffer {
    /// Dummy backend buffer (CPU memory)
    Dummy(Arc<dummy::DummyBuffer>),
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(buffer) => f.debug_tuple("GpuBuffer::Dummy").field(buffer).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => f.debug_tuple("GpuBuffer::Wgpu").field(buffer).finish(),
        }
    }
}

impl GpuBuffer {
    /// Whether both handles name the same backend object.
    pub fn same_as(&self, other: &GpuBuffer) -> bool {
        match (self, other) {
            (Self::Dummy(a), Self::Dummy(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "wgpu-backend")]
            (Self::Wgpu(a), Self::Wgpu(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "wgpu-backend")]
            _ => false,
        }
    }
}

/// Handle to a GPU texture resource.
#[derive(Clone)]
pub enum GpuTexture {
    /// Dummy backend texture (CPU memory)
    Dummy(Arc<dummy::DummyTexture>),
    /// wgpu backend texture
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        texture: Arc<wgpu::Texture>,
        view: Arc<wgpu::TextureView>,
    },
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(texture) => f.debug_tuple("GpuTexture::Dummy").field(texture).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { texture, view } => f
                .debug_struct("GpuTexture::Wgpu")
                .field("texture", texture)
                .field("view", view)
                .finish(),
        }
    }
}

/// Handle to a GPU sampler resource.
#[derive(Clone)]
pub enum GpuSampler {
    /// Dummy backend (no GPU allocation)
    Dummy,
    /// wgpu backend sampler
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Sampler>),
}

impl std::fmt::Debug for GpuSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuSampler::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(sampler) => f.debug_tuple("GpuSampler::Wgpu").field(sampler).finish(),
        }
    }
}

/// Handle to a compiled shader module.
#[derive(Clone)]
pub enum GpuShader {
    /// Dummy backend (source is validated but not compiled)
    Dummy,
    /// wgpu backend shader module
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::ShaderModule>),
}

impl std::fmt::Debug for GpuShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuShader::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(module) => f.debug_tuple("GpuShader::Wgpu").field(module).finish(),
        }
    }
}

/// Handle to a graphics pipeline.
#[derive(Clone)]
pub enum GpuPipeline {
    /// Dummy backend; the descriptor drives the software rasterizer.
    Dummy,
    /// wgpu backend render pipeline plus the layouts of its bind groups.
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        pipeline: Arc<wgpu::RenderPipeline>,
        bind_group_layouts: Arc<Vec<wgpu::BindGroupLayout>>,
    },
}

impl std::fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuPipeline::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { pipeline, .. } => f
                .debug_struct("GpuPipeline::Wgpu")
                .field("pipeline", pipeline)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU fence for CPU-GPU synchronization.
pub enum GpuFence {
    /// Dummy backend executes synchronously, so its fences are signaled on creation.
    Dummy {
        signaled: std::sync::atomic::AtomicBool,
    },
    /// wgpu backend fence (submission index for polling)
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        device: Arc<wgpu::Device>,
        submission_index: parking_lot::Mutex<Option<wgpu::SubmissionIndex>>,
    },
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { signaled } => f
                .debug_struct("GpuFence::Dummy")
                .field("signaled", signaled)
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu {
                submission_index, ..
            } => f
                .debug_struct("GpuFence::Wgpu")
                .field("submission_index", submission_index)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a presentable window surface.
pub enum GpuSurface {
    /// Off-screen rendering; the renderer owns a texture standing in for the swapchain.
    Headless,
    /// wgpu surface bound to a window.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu_impl::surface::WgpuSurface),
}

impl std::fmt::Debug for GpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Headless => write!(f, "GpuSurface::Headless"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(surface) => f.debug_tuple("GpuSurface::Wgpu").field(surface).finish(),
        }
    }
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Which backend this is.
    fn backend_type(&self) -> BackendType;

    /// Shader source formats this backend can compile.
    fn shader_formats(&self) -> ShaderFormat;

    /// Whether a 2D texture of `format` can be created with `usage`.
    fn supports_texture_format(&self, format: TextureFormat, usage: TextureUsage) -> bool;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Free a buffer. Called exactly once per buffer.
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    /// Free a texture. Called exactly once per texture.
    fn destroy_texture(&self, texture: &GpuTexture);

    /// Create a sampler resource.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError>;

    /// Compile a shader module.
    fn create_shader(&self, source: &ShaderSource) -> Result<GpuShader, GraphicsError>;

    /// Create a graphics pipeline.
    fn create_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError>;

    /// Map a transfer buffer, copy `data` in at `offset`, and unmap.
    fn write_mapped(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Map a transfer buffer and read `size` bytes at `offset`.
    ///
    /// This is a blocking operation that waits for the GPU to finish.
    fn read_mapped(&self, buffer: &GpuBuffer, offset: u64, size: u64)
    -> Result<Vec<u8>, GraphicsError>;

    /// Execute a recorded command list in order.
    fn submit(&self, commands: &[Command]) -> Result<GpuFence, GraphicsError>;

    /// Block until the submission behind `fence` has completed.
    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError>;

    /// Bind a window surface to this device.
    fn create_surface(&self, window: &RenderWindow) -> Result<GpuSurface, GraphicsError>;

    /// Color format images acquired from `surface` use.
    fn surface_format(&self, surface: &GpuSurface) -> TextureFormat;

    /// Resize the surface's images.
    fn configure_surface(
        &self,
        surface: &GpuSurface,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError>;

    /// Acquire the next presentable image.
    ///
    /// Returns `Ok(None)` when no image is available this frame (window
    /// minimized, surface outdated); callers skip the frame.
    fn acquire_surface_texture(
        &self,
        surface: &GpuSurface,
    ) -> Result<Option<GpuTexture>, GraphicsError>;

    /// Present the image acquired from `surface`, if any.
    fn present(&self, surface: &GpuSurface);
}

/// Selects and creates the backend requested by `descriptor`.
pub fn create_backend(descriptor: &DeviceDescriptor) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match descriptor.backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::with_descriptor(descriptor)))
        }
        BackendType::Wgpu => {
            #[cfg(feature = "wgpu-backend")]
            {
                let backend = wgpu_impl::WgpuBackend::new(descriptor)?;
                log::info!("Using wgpu backend");
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "wgpu-backend"))]
            {
                Err(GraphicsError::FeatureNotSupported(
                    "wgpu backend is not compiled in (enable the `wgpu-backend` feature)"
                        .to_string(),
                ))
            }
        }
        BackendType::Auto => {
            #[cfg(feature = "wgpu-backend")]
            {
                match wgpu_impl::WgpuBackend::new(descriptor) {
                    Ok(backend) => {
                        log::info!("Using wgpu backend");
                        return Ok(Arc::new(backend));
                    }
                    Err(e) => {
                        log::warn!("Failed to create wgpu backend: {}", e);
                    }
                }
            }

            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::with_descriptor(descriptor)))
        }
    }
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}
