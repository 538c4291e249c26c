//! Pass-composing scenes.
//!
//! A [`Scene`] records its passes into the renderer's frame command buffer.
//! Scenes are chained within one frame: the first pass that touches the
//! swapchain clears it and later passes load it. The shared depth texture is
//! cleared at most once per frame and loaded afterwards.
//!
//! - [`RobotScene`] - lit geometry with shadows, SSAO and an optional normal
//!   G-buffer
//! - [`DebugScene`] - unlit overlays (triads, grids, wireframes) and
//!   registered draw callbacks
//! - [`GuiSystem`] - a single overlay callback drawn last

mod debug;
mod gui;
mod robot;

use std::sync::Arc;

use umbra_core::camera::Camera;
use umbra_core::mesh::{MeshLayout, PrimitiveTopology, VertexAttrib};

pub use debug::{DebugEntryId, DebugScene, DebugSystem, FILL_DEPTH_BIAS};
pub use gui::{GuiCallback, GuiSystem};
pub use robot::{
    GeometryKind, NORMAL_TARGET_FORMAT, ObjectFlags, ObjectGeometry, ObjectId, RobotScene,
    RobotSceneConfig, SceneObject, TriangleDraw,
};

use crate::device::Device;
use crate::error::GraphicsError;
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDescriptor};
use crate::renderer::Renderer;
use crate::resources::TextureRef;
use crate::shader::{BuiltinShaders, ShaderStage, library, load_shader};
use crate::types::{
    ColorTargetDescription, CompareFunction, CullMode, DepthBias, DepthStencilState, TextureFormat,
};

/// Something that records passes into the current frame.
pub trait Scene {
    /// Record this scene's passes. Requires an open frame with an acquired
    /// swapchain image.
    fn render(&mut self, renderer: &mut Renderer, camera: &Camera) -> Result<(), GraphicsError>;

    /// Free every GPU resource the scene owns. Safe to call more than once.
    fn release(&mut self);
}

/// Fail unless `layout` carries every attribute in `required`.
pub(crate) fn require_attributes(
    layout: &MeshLayout,
    required: &[VertexAttrib],
    what: &str,
) -> Result<(), GraphicsError> {
    for attrib in required {
        if layout.attribute(attrib.location()).is_none() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{what} layout is missing the {attrib:?} attribute"
            )));
        }
    }
    Ok(())
}

/// Fixed-function state of an unlit `solid_color` pipeline.
#[derive(Debug, Clone)]
pub(crate) struct SolidPipelineState<'a> {
    pub label: &'a str,
    pub layout: &'a MeshLayout,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_bias: DepthBias,
    pub depth_write: bool,
}

/// Build a `solid_color` pipeline targeting the renderer's swapchain and
/// depth formats.
pub(crate) fn create_solid_color_pipeline(
    device: &Arc<Device>,
    color_format: TextureFormat,
    depth_format: TextureFormat,
    state: &SolidPipelineState<'_>,
) -> Result<GraphicsPipeline, GraphicsError> {
    require_attributes(
        state.layout,
        &[VertexAttrib::Position, VertexAttrib::Color0],
        state.label,
    )?;
    let shaders = BuiltinShaders::new();
    let vertex = load_shader(device, &shaders, library::SOLID_COLOR, ShaderStage::Vertex)?;
    let fragment = load_shader(device, &shaders, library::SOLID_COLOR, ShaderStage::Fragment)?;
    device.create_pipeline(
        &GraphicsPipelineDescriptor::new(vertex)
            .with_label(state.label)
            .with_fragment_shader(fragment)
            .with_vertex_input(state.layout.to_vertex_input_state())
            .with_topology(state.topology)
            .with_cull_mode(state.cull_mode)
            .with_depth_bias(state.depth_bias)
            .with_depth_stencil(
                DepthStencilState::new(depth_format, CompareFunction::LessEqual)
                    .with_depth_write(state.depth_write),
            )
            .with_color_target(ColorTargetDescription::new(color_format)),
    )
}

/// The swapchain image of the current frame, or an error when none was
/// acquired.
pub(crate) fn frame_target(renderer: &Renderer) -> Result<TextureRef, GraphicsError> {
    renderer.swapchain_texture().ok_or_else(|| {
        GraphicsError::InvalidState(
            "scene rendered without an acquired swapchain image".to_string(),
        )
    })
}
