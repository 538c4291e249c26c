//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, and WebGPU.

pub(crate) mod conversion;
mod execute;
mod resources;
pub mod surface;

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

use super::{
    BackendType, GpuBackend, GpuBuffer, GpuFence, GpuPipeline, GpuSampler, GpuShader,
    GpuSurface, GpuTexture,
};
use conversion::{convert_texture_format, convert_texture_usage};

/// How long a blocking wait on the GPU may take before it is reported as a lost device.
pub(crate) const WAIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a wgpu backend on the highest performance adapter available.
    pub fn new(descriptor: &DeviceDescriptor) -> Result<Self, GraphicsError> {
        let mut flags = wgpu::InstanceFlags::default();
        if descriptor.debug {
            flags |= wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG;
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("No compatible GPU adapter: {e}"))
        })?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        // Optional depth format, enabled when the adapter has it so format probing can find it.
        let required_features = adapter.features() & wgpu::Features::DEPTH32FLOAT_STENCIL8;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: descriptor.label.as_deref().or(Some("umbra device")),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| GraphicsError::InitializationFailed(format!("Device creation failed: {e}")))?;

        // Validation errors are logged rather than aborting the process.
        device.on_uncaptured_error(std::sync::Arc::new(|e| {
            log::error!("wgpu uncaptured error: {e}");
        }));

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Get the wgpu instance.
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    /// Get the wgpu adapter.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

pub(crate) fn wgpu_buffer(buffer: &GpuBuffer) -> Result<&Arc<wgpu::Buffer>, GraphicsError> {
    match buffer {
        GpuBuffer::Wgpu(buffer) => Ok(buffer),
        _ => Err(GraphicsError::Internal(
            "buffer does not belong to the wgpu backend".to_string(),
        )),
    }
}

pub(crate) fn wgpu_texture(
    texture: &GpuTexture,
) -> Result<(&Arc<wgpu::Texture>, &Arc<wgpu::TextureView>), GraphicsError> {
    match texture {
        GpuTexture::Wgpu { texture, view } => Ok((texture, view)),
        _ => Err(GraphicsError::Internal(
            "texture does not belong to the wgpu backend".to_string(),
        )),
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Wgpu
    }

    fn shader_formats(&self) -> ShaderFormat {
        ShaderFormat::WGSL
    }

    fn supports_texture_format(&self, format: TextureFormat, usage: TextureUsage) -> bool {
        let format = convert_texture_format(format);
        if !self.device.features().contains(format.required_features()) {
            return false;
        }
        let features = self.adapter.get_texture_format_features(format);
        features
            .allowed_usages
            .contains(convert_texture_usage(usage))
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        self.create_buffer_impl(descriptor)
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        if let GpuBuffer::Wgpu(buffer) = buffer {
            buffer.destroy();
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        self.create_texture_impl(descriptor)
    }

    fn destroy_texture(&self, texture: &GpuTexture) {
        if let GpuTexture::Wgpu { texture, .. } = texture {
            texture.destroy();
        }
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        self.create_sampler_impl(descriptor)
    }

    fn create_shader(&self, source: &ShaderSource) -> Result<GpuShader, GraphicsError> {
        self.create_shader_impl(source)
    }

    fn create_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        self.create_pipeline_impl(descriptor)
    }

    fn write_mapped(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.write_mapped_impl(wgpu_buffer(buffer)?, offset, data)
    }

    fn read_mapped(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        self.read_mapped_impl(wgpu_buffer(buffer)?, offset, size)
    }

    fn submit(&self, commands: &[Command]) -> Result<GpuFence, GraphicsError> {
        let submission_index = execute::execute(&self.device, &self.queue, commands)?;
        Ok(GpuFence::Wgpu {
            device: self.device.clone(),
            submission_index: parking_lot::Mutex::new(Some(submission_index)),
        })
    }

    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        match fence {
            GpuFence::Wgpu {
                device,
                submission_index,
            } => {
                let Some(index) = submission_index.lock().take() else {
                    // Already waited on.
                    return Ok(());
                };
                device
                    .poll(wgpu::PollType::Wait {
                        submission_index: Some(index),
                        timeout: Some(WAIT_TIMEOUT),
                    })
                    .map(|_| ())
                    .map_err(|e| {
                        log::error!("fence wait failed: {e}");
                        GraphicsError::DeviceLost
                    })
            }
            GpuFence::Dummy { .. } => Err(GraphicsError::Internal(
                "fence does not belong to the wgpu backend".to_string(),
            )),
        }
    }

    fn create_surface(&self, window: &RenderWindow) -> Result<GpuSurface, GraphicsError> {
        match window {
            RenderWindow::Headless { .. } => Ok(GpuSurface::Headless),
            RenderWindow::Winit(window) => Ok(GpuSurface::Wgpu(surface::WgpuSurface::new(
                self,
                window.clone(),
            )?)),
        }
    }

    fn surface_format(&self, surface: &GpuSurface) -> TextureFormat {
        match surface {
            GpuSurface::Wgpu(surface) => surface.format(),
            GpuSurface::Headless => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn configure_surface(
        &self,
        surface: &GpuSurface,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        match surface {
            GpuSurface::Wgpu(surface) => {
                surface.resize(&self.device, width, height);
                Ok(())
            }
            GpuSurface::Headless => Ok(()),
        }
    }

    fn acquire_surface_texture(
        &self,
        surface: &GpuSurface,
    ) -> Result<Option<GpuTexture>, GraphicsError> {
        match surface {
            GpuSurface::Wgpu(surface) => surface.acquire(&self.device),
            GpuSurface::Headless => Ok(None),
        }
    }

    fn present(&self, surface: &GpuSurface) {
        if let GpuSurface::Wgpu(surface) = surface {
            surface.present();
        }
    }
}
