//! Depth pre-pass.

use std::sync::Arc;

use umbra_core::camera::Camera;
use umbra_core::math::Mat4;
use umbra_core::mesh::{
    DefaultVertex, MeshLayout, PrimitiveTopology, Vertex, VertexAttrib, VertexInputState,
};

use crate::command::{CommandBuffer, DepthAttachment, RenderPassDescriptor};
use crate::device::Device;
use crate::error::GraphicsError;
use crate::mesh::MeshView;
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDescriptor};
use crate::renderer::Renderer;
use crate::resources::{MaybeOwned, Texture, TextureRef};
use crate::shader::{BuiltinShaders, ShaderStage, library, load_shader};
use crate::types::{CompareFunction, CullMode, DepthBias, DepthStencilState, TextureFormat};
use crate::uniforms::{DepthUniforms, TransformUniforms};

/// Fixed-function state of a depth-only pipeline.
#[derive(Debug, Clone)]
pub struct DepthPassConfig {
    /// Vertex layout of the meshes drawn; only the position attribute is read.
    pub layout: MeshLayout,
    pub cull_mode: CullMode,
    pub compare: CompareFunction,
    pub depth_bias: DepthBias,
    pub label: String,
}

impl Default for DepthPassConfig {
    fn default() -> Self {
        Self {
            layout: DefaultVertex::layout(),
            cull_mode: CullMode::Back,
            compare: CompareFunction::Less,
            depth_bias: DepthBias::default(),
            label: "depth pre-pass".to_string(),
        }
    }
}

impl DepthPassConfig {
    pub fn with_layout(mut self, layout: MeshLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_depth_bias(mut self, depth_bias: DepthBias) -> Self {
        self.depth_bias = depth_bias;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Vertex input of `layout` reduced to the position attribute. Bindings
/// are kept so slots and strides still match the mesh's buffers.
fn position_only_input(layout: &MeshLayout) -> Result<VertexInputState, GraphicsError> {
    let mut state = layout.to_vertex_input_state();
    let position = VertexAttrib::Position.location();
    state.attributes.retain(|a| a.location == position);
    if state.attributes.is_empty() {
        return Err(GraphicsError::InvalidParameter(
            "depth-only layout has no position attribute".to_string(),
        ));
    }
    Ok(state)
}

/// Build the depth-only pipeline shared by the pre-pass and the shadow pass:
/// no fragment stage, depth test and write on.
pub fn create_depth_only_pipeline(
    device: &Arc<Device>,
    format: TextureFormat,
    config: &DepthPassConfig,
) -> Result<GraphicsPipeline, GraphicsError> {
    let vertex = load_shader(
        device,
        &BuiltinShaders::new(),
        library::DEPTH_ONLY,
        ShaderStage::Vertex,
    )?;
    let descriptor = GraphicsPipelineDescriptor::new(vertex)
        .with_label(config.label.clone())
        .with_vertex_input(position_only_input(&config.layout)?)
        .with_topology(PrimitiveTopology::TriangleList)
        .with_cull_mode(config.cull_mode)
        .with_depth_bias(config.depth_bias)
        .with_depth_stencil(DepthStencilState::new(format, config.compare));
    device.create_pipeline(&descriptor)
}

/// A triangle mesh drawn into depth, with its per-frame transforms.
///
/// `transforms` is computed once per frame from the main camera. The
/// pre-pass pushes its `mvp` as [`DepthUniforms`] and the main pass pushes
/// the whole block, so both rasterize from the same bytes.
#[derive(Debug, Clone)]
pub struct OpaqueCastable {
    pub mesh: MeshView,
    /// World transform.
    pub model: Mat4,
    pub transforms: TransformUniforms,
}

impl OpaqueCastable {
    pub fn new(mesh: MeshView, model: Mat4, camera: &Camera) -> Self {
        let transforms = TransformUniforms::new(&camera.view_proj(), &camera.view_matrix(), &model);
        Self {
            mesh,
            model,
            transforms,
        }
    }

    /// MVP block for the depth pre-pass.
    pub fn depth_uniforms(&self) -> DepthUniforms {
        DepthUniforms::from(&self.transforms)
    }
}

/// A depth-only pass: its pipeline and its target texture.
///
/// The target is either owned (a dedicated texture, freed by
/// [`release`](Self::release)) or borrowed (the renderer's shared depth,
/// never freed here).
#[derive(Debug)]
pub struct DepthPassInfo {
    depth: MaybeOwned<Texture>,
    pipeline: GraphicsPipeline,
    /// Re-borrow the renderer's depth texture when it is recreated.
    follows_renderer: bool,
}

impl DepthPassInfo {
    /// Pre-pass into the renderer's shared depth texture.
    pub fn create(renderer: &Renderer, config: &DepthPassConfig) -> Result<Self, GraphicsError> {
        let mut info = Self::with_target(renderer.device(), renderer.depth_texture(), config)?;
        info.follows_renderer = true;
        Ok(info)
    }

    /// Depth pass into `depth`, owned or borrowed.
    pub fn with_target(
        device: &Arc<Device>,
        depth: impl Into<MaybeOwned<Texture>>,
        config: &DepthPassConfig,
    ) -> Result<Self, GraphicsError> {
        let depth = depth.into();
        let pipeline = create_depth_only_pipeline(device, depth.format(), config)?;
        log::debug!(
            "created depth pass '{}' ({:?}, {})",
            config.label,
            depth.format(),
            if depth.is_owned() { "owned" } else { "borrowed" }
        );
        Ok(Self {
            depth,
            pipeline,
            follows_renderer: false,
        })
    }

    pub fn depth_texture(&self) -> TextureRef {
        self.depth.share()
    }

    pub fn format(&self) -> TextureFormat {
        self.depth.format()
    }

    /// Whether [`release`](Self::release) frees the target.
    pub fn owns_depth_texture(&self) -> bool {
        self.depth.is_owned()
    }

    pub fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    /// Free the target if it is owned. The renderer's depth is left alone.
    pub fn release(&mut self) {
        self.depth.release();
    }

    /// Point at the renderer's current depth texture if ours was replaced.
    fn sync_with_renderer(&mut self, renderer: &Renderer) -> Result<(), GraphicsError> {
        if !self.follows_renderer || !self.depth.is_released() {
            return Ok(());
        }
        if renderer.depth_format() != self.format() {
            return Err(GraphicsError::InvalidState(format!(
                "renderer depth format changed from {:?} to {:?}",
                self.format(),
                renderer.depth_format()
            )));
        }
        log::debug!("depth pass: renderer depth texture was recreated, re-borrowing");
        self.depth = MaybeOwned::Borrowed(renderer.depth_texture());
        Ok(())
    }
}

/// Clear `info`'s target to 1.0 and draw each `(mesh, mvp)` into it.
pub fn render_depth_pass_into<'a>(
    cmd: &mut CommandBuffer,
    info: &DepthPassInfo,
    label: &str,
    draws: impl IntoIterator<Item = (&'a MeshView, DepthUniforms)>,
) -> Result<(), GraphicsError> {
    let mut pass = cmd.begin_render_pass(
        RenderPassDescriptor::new()
            .with_label(label)
            .with_depth_attachment(DepthAttachment::clear(info.depth_texture(), 1.0)),
    )?;
    pass.bind_pipeline(&info.pipeline);
    for (mesh, mvp) in draws {
        debug_assert_eq!(
            mesh.topology(),
            PrimitiveTopology::TriangleList,
            "depth passes draw triangle lists only"
        );
        pass.push_vertex_uniform(0, &mvp);
        mesh.draw(&mut pass);
    }
    Ok(())
}

/// Record the depth pre-pass for `castables` into the current frame.
///
/// The target is cleared to 1.0 and written with `LESS`. The main color
/// pass must then load this depth and test with `LessEqual`.
pub fn render_depth_only_pass(
    renderer: &mut Renderer,
    info: &mut DepthPassInfo,
    castables: &[OpaqueCastable],
) -> Result<(), GraphicsError> {
    info.sync_with_renderer(renderer)?;
    let cmd = renderer.command_buffer()?;
    render_depth_pass_into(
        cmd,
        info,
        "depth pre-pass",
        castables.iter().map(|c| (&c.mesh, c.depth_uniforms())),
    )
}

#[cfg(test)]
mod tests {
    use umbra_core::mesh::{MeshData, PositionVertex};

    use super::*;
    use crate::command::Command;
    use crate::device::DeviceDescriptor;
    use crate::mesh::create_and_upload_mesh;
    use crate::readback::read_depth_texture;
    use crate::types::{TextureDescriptor, TextureUsage};
    use crate::window::RenderWindow;

    fn device() -> Arc<Device> {
        Device::new(DeviceDescriptor::dummy()).unwrap()
    }

    fn depth_target(device: &Arc<Device>, size: u32) -> Texture {
        device
            .create_texture(&TextureDescriptor::new_2d(
                size,
                size,
                TextureFormat::Depth32Float,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            ))
            .unwrap()
    }

    #[test]
    fn test_pipeline_reads_position_only() {
        let state = position_only_input(&DefaultVertex::layout()).unwrap();
        assert_eq!(state.attributes.len(), 1);
        assert_eq!(state.bindings.len(), 1);
        assert_eq!(state.bindings[0].stride, 48);
    }

    #[test]
    fn test_release_owned_and_borrowed() {
        let device = device();
        let mut owned = DepthPassInfo::with_target(
            &device,
            depth_target(&device, 4),
            &DepthPassConfig::default().with_layout(PositionVertex::layout()),
        )
        .unwrap();
        let shared = depth_target(&device, 4);
        let mut borrowed = DepthPassInfo::with_target(
            &device,
            shared.share(),
            &DepthPassConfig::default().with_layout(PositionVertex::layout()),
        )
        .unwrap();
        assert!(owned.owns_depth_texture());
        assert!(!borrowed.owns_depth_texture());

        owned.release();
        owned.release();
        borrowed.release();
        assert!(owned.depth_texture().is_released());
        assert!(!shared.is_released());
        assert_eq!(device.live_texture_count(), 1);
    }

    #[test]
    fn test_prepass_writes_triangle_depth() {
        let device = device();
        let data = MeshData::new(
            PrimitiveTopology::TriangleList,
            &[
                PositionVertex::new(0.0, 0.0, 0.0),
                PositionVertex::new(1.0, 0.0, 0.0),
                PositionVertex::new(0.0, 1.0, 0.0),
            ],
            &[],
        );
        let mesh = create_and_upload_mesh(&device, &data).unwrap();
        let info = DepthPassInfo::with_target(
            &device,
            depth_target(&device, 4),
            &DepthPassConfig::default().with_layout(PositionVertex::layout()),
        )
        .unwrap();

        let mut cmd = device.acquire_command_buffer();
        let view = mesh.view();
        render_depth_pass_into(
            &mut cmd,
            &info,
            "test",
            [(&view, DepthUniforms::from_mvp(&Mat4::identity()))],
        )
        .unwrap();
        cmd.submit().unwrap();

        let depth = read_depth_texture(&device, &info.depth_texture()).unwrap();
        assert_eq!(depth.iter().filter(|&&d| d == 0.0).count(), 3);
        assert_eq!(depth.iter().filter(|&&d| d == 1.0).count(), 13);
    }

    #[test]
    fn test_prepass_pushes_transform_mvp_bytes() {
        let device = device();
        let mut renderer =
            Renderer::new(Arc::clone(&device), RenderWindow::headless(4, 4)).unwrap();
        let data = MeshData::new(
            PrimitiveTopology::TriangleList,
            &[
                DefaultVertex::default(),
                DefaultVertex::default(),
                DefaultVertex::default(),
            ],
            &[],
        );
        let mesh = create_and_upload_mesh(&device, &data).unwrap();
        let camera = Camera::default();
        let castable = OpaqueCastable::new(mesh.view(), Mat4::new_scaling(2.0), &camera);
        let mut info = DepthPassInfo::create(&renderer, &DepthPassConfig::default()).unwrap();

        renderer.begin_frame().unwrap();
        render_depth_only_pass(&mut renderer, &mut info, std::slice::from_ref(&castable)).unwrap();
        let pushed = renderer
            .command_buffer()
            .unwrap()
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::PushUniform { data, .. } => Some(data.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(pushed, bytemuck::bytes_of(&castable.transforms)[..64].to_vec());
        renderer.end_frame().unwrap();
    }

    #[test]
    fn test_follows_recreated_renderer_depth() {
        let device = device();
        let mut renderer =
            Renderer::new(Arc::clone(&device), RenderWindow::headless(4, 4)).unwrap();
        let mut info = DepthPassInfo::create(&renderer, &DepthPassConfig::default()).unwrap();
        renderer.window_mut().set_size(8, 8);
        renderer.begin_frame().unwrap();
        assert!(renderer.wait_and_acquire_swapchain().unwrap());
        render_depth_only_pass(&mut renderer, &mut info, &[]).unwrap();
        assert!(info.depth_texture().same_texture(&renderer.depth_texture()));
        renderer.end_frame().unwrap();
    }
}
