//! Graphics pipelines.
//!
//! A [`GraphicsPipeline`] bundles compiled shader stages with the vertex
//! input layout and fixed-function state. Its attachment formats must match
//! the render pass it is bound in: the swapchain's negotiated color format
//! and the renderer's chosen depth format.

use std::sync::Arc;

use umbra_core::mesh::{PrimitiveTopology, VertexInputState};

use crate::backend::GpuPipeline;
use crate::shader::Shader;
use crate::types::{
    ColorTargetDescription, CullMode, DepthBias, DepthStencilState, RasterizerState, TextureFormat,
};

/// Description of a graphics pipeline.
///
/// # Example
///
/// ```ignore
/// let descriptor = GraphicsPipelineDescriptor::new(vertex_shader)
///     .with_label("depth pre-pass")
///     .with_vertex_input(PositionVertex::layout().to_vertex_input_state())
///     .with_cull_mode(CullMode::Back)
///     .with_depth_stencil(DepthStencilState::new(depth_format, CompareFunction::Less));
/// let pipeline = device.create_pipeline(&descriptor)?;
/// ```
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: Option<String>,
    pub vertex_shader: Shader,
    /// Depth-only pipelines have no fragment stage.
    pub fragment_shader: Option<Shader>,
    pub vertex_input: VertexInputState,
    pub primitive_topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetDescription>,
    pub sample_count: u32,
}

impl GraphicsPipelineDescriptor {
    /// Triangle-list pipeline with only a vertex stage and no targets.
    pub fn new(vertex_shader: Shader) -> Self {
        Self {
            label: None,
            vertex_shader,
            fragment_shader: None,
            vertex_input: VertexInputState::default(),
            primitive_topology: PrimitiveTopology::TriangleList,
            rasterizer: RasterizerState::default(),
            depth_stencil: None,
            color_targets: Vec::new(),
            sample_count: 1,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_fragment_shader(mut self, shader: Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn with_vertex_input(mut self, vertex_input: VertexInputState) -> Self {
        self.vertex_input = vertex_input;
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.primitive_topology = topology;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: RasterizerState) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.rasterizer.cull_mode = cull_mode;
        self
    }

    pub fn with_depth_bias(mut self, depth_bias: DepthBias) -> Self {
        self.rasterizer.depth_bias = depth_bias;
        self
    }

    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = Some(depth_stencil);
        self
    }

    pub fn with_color_target(mut self, target: ColorTargetDescription) -> Self {
        self.color_targets.push(target);
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed pipeline>")
    }

    /// Formats of the color targets, in order.
    pub fn color_formats(&self) -> impl Iterator<Item = TextureFormat> + '_ {
        self.color_targets.iter().map(|t| t.format)
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_stencil.map(|d| d.format)
    }
}

struct PipelineInner {
    descriptor: GraphicsPipelineDescriptor,
    gpu: GpuPipeline,
}

/// A compiled graphics pipeline.
///
/// Created by [`Device::create_pipeline`](crate::Device::create_pipeline);
/// cheap to clone.
#[derive(Clone)]
pub struct GraphicsPipeline {
    inner: Arc<PipelineInner>,
}

impl GraphicsPipeline {
    pub(crate) fn new(descriptor: GraphicsPipelineDescriptor, gpu: GpuPipeline) -> Self {
        Self {
            inner: Arc::new(PipelineInner { descriptor, gpu }),
        }
    }

    pub fn descriptor(&self) -> &GraphicsPipelineDescriptor {
        &self.inner.descriptor
    }

    pub fn label(&self) -> &str {
        self.inner.descriptor.display_label()
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.inner.descriptor.primitive_topology
    }

    pub fn gpu(&self) -> &GpuPipeline {
        &self.inner.gpu
    }

    /// Whether both handles name the same pipeline object.
    pub fn same_pipeline(&self, other: &GraphicsPipeline) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("label", &self.inner.descriptor.label)
            .field("topology", &self.inner.descriptor.primitive_topology)
            .field("depth", &self.inner.descriptor.depth_format())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GraphicsPipeline: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceDescriptor};
    use crate::error::GraphicsError;
    use crate::shader::{BuiltinShaders, ShaderStage, library, load_shader};
    use crate::types::CompareFunction;
    use umbra_core::mesh::{PositionVertex, Vertex};

    fn depth_descriptor(device: &Device) -> GraphicsPipelineDescriptor {
        let vs = load_shader(
            device,
            &BuiltinShaders::new(),
            library::DEPTH_ONLY,
            ShaderStage::Vertex,
        )
        .unwrap();
        GraphicsPipelineDescriptor::new(vs)
            .with_label("depth")
            .with_vertex_input(PositionVertex::layout().to_vertex_input_state())
            .with_cull_mode(CullMode::Back)
            .with_depth_stencil(DepthStencilState::new(
                TextureFormat::Depth32Float,
                CompareFunction::Less,
            ))
    }

    #[test]
    fn test_create_depth_only_pipeline() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let pipeline = device.create_pipeline(&depth_descriptor(&device)).unwrap();
        assert_eq!(pipeline.label(), "depth");
        assert_eq!(
            pipeline.descriptor().depth_format(),
            Some(TextureFormat::Depth32Float)
        );
        assert!(pipeline.descriptor().fragment_shader.is_none());
        assert!(pipeline.same_pipeline(&pipeline.clone()));
    }

    #[test]
    fn test_depth_format_must_be_depth() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let descriptor = depth_descriptor(&device).with_depth_stencil(DepthStencilState::new(
            TextureFormat::Rgba8Unorm,
            CompareFunction::Less,
        ));
        assert!(matches!(
            device.create_pipeline(&descriptor),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_fragment_shader_in_vertex_slot_is_rejected() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let fs = load_shader(
            &device,
            &BuiltinShaders::new(),
            library::SOLID_COLOR,
            ShaderStage::Fragment,
        )
        .unwrap();
        let descriptor = GraphicsPipelineDescriptor::new(fs);
        assert!(device.create_pipeline(&descriptor).is_err());
    }
}
