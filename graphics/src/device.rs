//! Graphics device.
//!
//! The [`Device`] exclusively owns the backend context. Every buffer,
//! texture, sampler, shader, pipeline and command buffer is created through
//! it and keeps it alive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{self, BackendType, GpuBackend};
use crate::command::CommandBuffer;
use crate::error::GraphicsError;
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDescriptor};
use crate::resources::{Buffer, Sampler, Texture};
use crate::shader::{self, Shader, ShaderFormat, ShaderSource, ShaderStage};
use crate::types::{
    BufferDescriptor, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};

/// Configuration for creating a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Debug label for the device.
    pub label: Option<String>,
    /// Which backend to run on.
    pub backend: BackendType,
    /// Shader formats the application will provide. At least one must be
    /// supported by the backend.
    pub shader_formats: ShaderFormat,
    /// Enable backend validation and debug labels.
    pub debug: bool,
    /// Depth formats the dummy backend accepts; `None` accepts all of them.
    pub dummy_depth_formats: Option<Vec<TextureFormat>>,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            backend: BackendType::Auto,
            shader_formats: ShaderFormat::WGSL,
            debug: cfg!(debug_assertions),
            dummy_depth_formats: None,
        }
    }
}

impl DeviceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a device on the dummy backend.
    pub fn dummy() -> Self {
        Self::default().with_backend(BackendType::Dummy)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_shader_formats(mut self, formats: ShaderFormat) -> Self {
        self.shader_formats = formats;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Restrict the depth formats the dummy backend reports as supported.
    pub fn with_dummy_depth_formats(mut self, formats: Vec<TextureFormat>) -> Self {
        self.dummy_depth_formats = Some(formats);
        self
    }
}

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// `Device` is `Send + Sync` and can be shared across threads, though the
/// rendering model records all of a frame's work from one thread.
///
/// # Example
///
/// ```ignore
/// let device = Device::new(DeviceDescriptor::dummy())?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     1920, 1080,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::RENDER_ATTACHMENT,
/// ))?;
/// ```
pub struct Device {
    backend: Arc<dyn GpuBackend>,
    descriptor: DeviceDescriptor,
    live_buffers: AtomicUsize,
    live_textures: AtomicUsize,
}

impl Device {
    /// Create a device on the backend named by `descriptor`.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be created or supports none of the
    /// requested shader formats.
    pub fn new(descriptor: DeviceDescriptor) -> Result<Arc<Self>, GraphicsError> {
        let backend = backend::create_backend(&descriptor)?;
        Self::with_backend(backend, descriptor)
    }

    /// Create a device on an already constructed backend.
    pub fn with_backend(
        backend: Arc<dyn GpuBackend>,
        descriptor: DeviceDescriptor,
    ) -> Result<Arc<Self>, GraphicsError> {
        if !backend.shader_formats().intersects(descriptor.shader_formats) {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "{} accepts shader formats {:?}, requested {:?}",
                backend.name(),
                backend.shader_formats(),
                descriptor.shader_formats
            )));
        }
        log::info!(
            "Created device {:?} on {} (debug: {})",
            descriptor.label,
            backend.name(),
            descriptor.debug
        );
        Ok(Arc::new(Self {
            backend,
            descriptor,
            live_buffers: AtomicUsize::new(0),
            live_textures: AtomicUsize::new(0),
        }))
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_debug(&self) -> bool {
        self.descriptor.debug
    }

    /// Whether a 2D texture of `format` can be created with `usage`.
    pub fn supports_texture_format(&self, format: TextureFormat, usage: TextureUsage) -> bool {
        self.backend.supports_texture_format(format, usage)
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or the backend rejects the buffer.
    pub fn create_buffer(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
    ) -> Result<Buffer, GraphicsError> {
        descriptor.validate()?;

        let gpu = self.backend.create_buffer(descriptor).map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "buffer '{}' ({} bytes, {:?}): {e}",
                descriptor.display_label(),
                descriptor.size,
                descriptor.usage
            ))
        })?;
        self.live_buffers.fetch_add(1, Ordering::AcqRel);

        log::trace!(
            "Device: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );

        Ok(Buffer::new(Arc::clone(self), descriptor.clone(), gpu))
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is zero or the format/usage
    /// combination is not supported.
    pub fn create_texture(
        self: &Arc<Self>,
        descriptor: &TextureDescriptor,
    ) -> Result<Texture, GraphicsError> {
        if descriptor.size.width == 0 || descriptor.size.height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture '{}': dimensions cannot be zero",
                descriptor.display_label()
            )));
        }
        if !self.supports_texture_format(descriptor.format, descriptor.usage) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture '{}' ({}x{}): format {:?} with usage {:?} is not supported by {}",
                descriptor.display_label(),
                descriptor.size.width,
                descriptor.size.height,
                descriptor.format,
                descriptor.usage,
                self.backend.name()
            )));
        }

        let gpu = self.backend.create_texture(descriptor).map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "texture '{}' ({}x{} {:?}): {e}",
                descriptor.display_label(),
                descriptor.size.width,
                descriptor.size.height,
                descriptor.format
            ))
        })?;
        self.live_textures.fetch_add(1, Ordering::AcqRel);

        log::trace!(
            "Device: created texture {:?}, size={}x{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );

        Ok(Texture::new(Arc::clone(self), descriptor.clone(), gpu))
    }

    /// Create a texture sampler.
    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<Sampler, GraphicsError> {
        let gpu = self.backend.create_sampler(descriptor)?;
        log::trace!("Device: created sampler {:?}", descriptor.label);
        Ok(Sampler::new(descriptor.clone(), gpu))
    }

    /// Reflect and compile a shader.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::FeatureNotSupported`] if the device was not
    /// created for the source's format, or [`GraphicsError::ShaderError`]
    /// if it fails to parse or validate.
    pub fn create_shader(&self, source: ShaderSource) -> Result<Shader, GraphicsError> {
        if !self.descriptor.shader_formats.contains(source.format)
            || !self.backend.shader_formats().contains(source.format)
        {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "shader '{}' is {:?}, device accepts {:?}",
                source.name, source.format, self.descriptor.shader_formats
            )));
        }
        let reflection = shader::reflect(&source)?;
        let gpu = self.backend.create_shader(&source)?;
        log::trace!(
            "Device: created {:?} shader '{}' ({:?})",
            source.stage,
            source.name,
            reflection.counts
        );
        Ok(Shader::new(source, reflection, gpu))
    }

    /// Create a graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the shader stages, vertex layout or attachment
    /// formats are inconsistent, or the backend rejects the pipeline.
    pub fn create_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GraphicsPipeline, GraphicsError> {
        let label = descriptor.label.as_deref().unwrap_or("<unnamed pipeline>");
        if descriptor.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(GraphicsError::InvalidParameter(format!(
                "pipeline '{label}': '{}' is not a vertex shader",
                descriptor.vertex_shader.name()
            )));
        }
        if let Some(fragment) = &descriptor.fragment_shader
            && fragment.stage() != ShaderStage::Fragment
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "pipeline '{label}': '{}' is not a fragment shader",
                fragment.name()
            )));
        }
        for attribute in &descriptor.vertex_input.attributes {
            if !descriptor
                .vertex_input
                .bindings
                .iter()
                .any(|b| b.slot == attribute.binding)
            {
                return Err(GraphicsError::InvalidParameter(format!(
                    "pipeline '{label}': attribute {} references undeclared binding {}",
                    attribute.location, attribute.binding
                )));
            }
        }
        if let Some(depth) = &descriptor.depth_stencil
            && !depth.format.is_depth_stencil()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "pipeline '{label}': {:?} is not a depth format",
                depth.format
            )));
        }
        if let Some(target) = descriptor
            .color_targets
            .iter()
            .find(|t| t.format.is_depth_stencil())
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "pipeline '{label}': color target uses depth format {:?}",
                target.format
            )));
        }

        let shaders = std::iter::once(&descriptor.vertex_shader).chain(&descriptor.fragment_shader);
        for shader in shaders {
            let counts = shader.resource_counts();
            if counts.num_storage_buffers > 0 || counts.num_storage_textures > 0 {
                return Err(GraphicsError::FeatureNotSupported(format!(
                    "pipeline '{label}': shader '{}' uses unsupported storage resources",
                    shader.name()
                )));
            }
        }

        let gpu = self.backend.create_pipeline(descriptor).map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("pipeline '{label}': {e}"))
        })?;
        log::trace!("Device: created pipeline '{label}'");
        Ok(GraphicsPipeline::new(descriptor.clone(), gpu))
    }

    /// Start recording a command buffer.
    pub fn acquire_command_buffer(self: &Arc<Self>) -> CommandBuffer {
        CommandBuffer::new(Arc::clone(self))
    }

    /// Number of owned buffers not yet released.
    pub fn live_buffer_count(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// Number of owned textures not yet released.
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.load(Ordering::Acquire)
    }

    pub(crate) fn on_buffer_released(&self) {
        self.live_buffers.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn on_texture_released(&self) {
        self.live_textures.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.backend.name())
            .field("label", &self.descriptor.label)
            .field("live_buffers", &self.live_buffer_count())
            .field("live_textures", &self.live_texture_count())
            .finish()
    }
}

// Ensure Device is Send + Sync
static_assertions::assert_impl_all!(Device: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    fn create_test_device() -> Arc<Device> {
        Device::new(DeviceDescriptor::dummy()).unwrap()
    }

    #[test]
    fn test_device_backend() {
        let device = create_test_device();
        assert_eq!(device.backend_type(), BackendType::Dummy);
        assert_eq!(device.backend().name(), "Dummy Backend");
    }

    #[test]
    fn test_create_buffer() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(device.live_buffer_count(), 1);
    }

    #[test]
    fn test_zero_sized_buffer_fails() {
        let device = create_test_device();
        let result = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_unsupported_depth_format_reports_details() {
        let device = Device::new(
            DeviceDescriptor::dummy().with_dummy_depth_formats(vec![TextureFormat::Depth32Float]),
        )
        .unwrap();
        let desc = TextureDescriptor::new_2d(
            8,
            8,
            TextureFormat::Depth24PlusStencil8,
            TextureUsage::RENDER_ATTACHMENT,
        )
        .with_label("depth");
        let Err(GraphicsError::ResourceCreationFailed(msg)) = device.create_texture(&desc) else {
            panic!("expected a creation failure");
        };
        assert!(msg.contains("depth"));
        assert!(msg.contains("Depth24PlusStencil8"));
    }

    #[test]
    fn test_shader_format_must_intersect() {
        let result =
            Device::new(DeviceDescriptor::dummy().with_shader_formats(ShaderFormat::SPIRV));
        assert!(matches!(result, Err(GraphicsError::FeatureNotSupported(_))));
    }
}
