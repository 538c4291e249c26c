//! Unlit debug overlays.

use std::sync::Arc;

use umbra_core::bounds::{Aabb, Obb};
use umbra_core::camera::Camera;
use umbra_core::math::{Mat4, Vec4};
use umbra_core::mesh::generators::{generate_line_grid, generate_triad, generate_wire_box};
use umbra_core::mesh::{ColorVertex, DefaultVertex, MeshData, MeshLayout, PrimitiveTopology, Vertex};

use crate::command::{ColorAttachment, DepthAttachment, RenderPass, RenderPassDescriptor};
use crate::device::Device;
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipeline;
use crate::renderer::Renderer;
use crate::types::{CullMode, DepthBias};
use crate::uniforms::{DepthUniforms, TintUniforms};

use super::{
    ObjectGeometry, Scene, SolidPipelineState, create_solid_color_pipeline, frame_target,
};

/// Depth bias of filled debug geometry. Line topologies may not carry a
/// depth bias, so fills are pushed back instead.
pub const FILL_DEPTH_BIAS: DepthBias = DepthBias {
    constant: 2,
    slope_scale: 1.0,
    clamp: 0.0,
};

/// Per-frame draw callback, invoked inside the debug pass after the
/// entries. Bind [`DebugScene::fill_pipeline`] or
/// [`DebugScene::line_pipeline`] before drawing.
pub type DebugSystem = Box<dyn FnMut(&mut RenderPass<'_>, &Camera)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DebugEntryId(u32);

#[derive(Debug)]
struct DebugEntry {
    id: DebugEntryId,
    topology: PrimitiveTopology,
    geometry: ObjectGeometry,
    /// Tint per submesh.
    tints: Vec<TintUniforms>,
    transform: Mat4,
    enabled: bool,
}

/// Triads, grids, wireframes and user callbacks drawn over the frame.
///
/// The pass loads both color and depth, so it must follow a scene that
/// cleared them.
pub struct DebugScene {
    device: Arc<Device>,
    fill_layout: MeshLayout,
    line_layout: MeshLayout,
    fill_pipeline: GraphicsPipeline,
    line_pipeline: GraphicsPipeline,
    entries: Vec<DebugEntry>,
    next_id: u32,
    systems: Vec<DebugSystem>,
}

impl std::fmt::Debug for DebugScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugScene")
            .field("entries", &self.entries.len())
            .field("systems", &self.systems.len())
            .finish_non_exhaustive()
    }
}

impl DebugScene {
    pub fn new(renderer: &Renderer) -> Result<Self, GraphicsError> {
        let device = Arc::clone(renderer.device());
        let fill_layout = DefaultVertex::layout();
        let line_layout = ColorVertex::layout();
        let fill_pipeline = create_solid_color_pipeline(
            &device,
            renderer.swapchain_format(),
            renderer.depth_format(),
            &SolidPipelineState {
                label: "debug fill",
                layout: &fill_layout,
                topology: PrimitiveTopology::TriangleList,
                cull_mode: CullMode::None,
                depth_bias: FILL_DEPTH_BIAS,
                depth_write: true,
            },
        )?;
        let line_pipeline = create_solid_color_pipeline(
            &device,
            renderer.swapchain_format(),
            renderer.depth_format(),
            &SolidPipelineState {
                label: "debug lines",
                layout: &line_layout,
                topology: PrimitiveTopology::LineList,
                cull_mode: CullMode::None,
                depth_bias: DepthBias::default(),
                depth_write: true,
            },
        )?;
        Ok(Self {
            device,
            fill_layout,
            line_layout,
            fill_pipeline,
            line_pipeline,
            entries: Vec::new(),
            next_id: 0,
            systems: Vec::new(),
        })
    }

    /// Pipeline for [`DefaultVertex`] triangle lists.
    pub fn fill_pipeline(&self) -> &GraphicsPipeline {
        &self.fill_pipeline
    }

    /// Pipeline for [`ColorVertex`] line lists.
    pub fn line_pipeline(&self) -> &GraphicsPipeline {
        &self.line_pipeline
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add meshes drawn with their vertex colors times `tint`.
    ///
    /// Triangle lists must use the [`DefaultVertex`] layout and line lists
    /// the [`ColorVertex`] layout; all meshes of one entry share a topology.
    pub fn add_mesh(
        &mut self,
        data: &[MeshData],
        transform: Mat4,
        tint: Vec4,
    ) -> Result<DebugEntryId, GraphicsError> {
        let Some(first) = data.first() else {
            return Err(GraphicsError::InvalidParameter(
                "debug entry needs at least one mesh".to_string(),
            ));
        };
        let topology = first.topology;
        let layout = match topology {
            PrimitiveTopology::TriangleList => &self.fill_layout,
            PrimitiveTopology::LineList => &self.line_layout,
            other => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "debug geometry cannot be a {other:?}"
                )));
            }
        };
        for mesh in data {
            if mesh.topology != topology || mesh.layout() != layout {
                return Err(GraphicsError::InvalidParameter(format!(
                    "debug {topology:?} meshes must share the {} layout",
                    if topology == PrimitiveTopology::TriangleList {
                        "DefaultVertex"
                    } else {
                        "ColorVertex"
                    }
                )));
            }
        }

        let geometry = ObjectGeometry::upload(&self.device, data)?;
        let id = DebugEntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(DebugEntry {
            id,
            topology,
            geometry,
            tints: vec![TintUniforms { color: tint.into() }; data.len()],
            transform,
            enabled: true,
        });
        Ok(id)
    }

    /// Coordinate axes of `transform`, colored X red, Y green, Z blue.
    pub fn add_triad(
        &mut self,
        transform: Mat4,
        scale: f32,
    ) -> Result<DebugEntryId, GraphicsError> {
        self.add_mesh(&generate_triad(scale), transform, Vec4::repeat(1.0))
    }

    /// Grid on the local `z = 0` plane; white lines when `color` is `None`.
    pub fn add_line_grid(
        &mut self,
        cells: u32,
        cell_size: f32,
        color: Option<Vec4>,
        transform: Mat4,
    ) -> Result<DebugEntryId, GraphicsError> {
        let color = color.unwrap_or_else(|| Vec4::repeat(1.0));
        self.add_mesh(
            &[generate_line_grid(cells, cell_size, color)],
            transform,
            Vec4::repeat(1.0),
        )
    }

    /// Wireframe of `camera`'s view frustum in world space.
    pub fn add_frustum(
        &mut self,
        camera: &Camera,
        color: Vec4,
    ) -> Result<DebugEntryId, GraphicsError> {
        let corners = camera.world_frustum_corners().ok_or_else(|| {
            GraphicsError::InvalidParameter("camera projection is not invertible".to_string())
        })?;
        self.add_mesh(&[generate_wire_box(&corners, color)], Mat4::identity(), Vec4::repeat(1.0))
    }

    pub fn add_aabb(&mut self, aabb: &Aabb, color: Vec4) -> Result<DebugEntryId, GraphicsError> {
        self.add_mesh(
            &[generate_wire_box(&aabb.corners(), color)],
            Mat4::identity(),
            Vec4::repeat(1.0),
        )
    }

    pub fn add_obb(&mut self, obb: &Obb, color: Vec4) -> Result<DebugEntryId, GraphicsError> {
        self.add_mesh(
            &[generate_wire_box(&obb.corners(), color)],
            Mat4::identity(),
            Vec4::repeat(1.0),
        )
    }

    /// Register a callback run every frame. Returns its index.
    pub fn add_system(
        &mut self,
        system: impl FnMut(&mut RenderPass<'_>, &Camera) + 'static,
    ) -> usize {
        self.systems.push(Box::new(system));
        self.systems.len() - 1
    }

    pub fn clear_systems(&mut self) {
        self.systems.clear();
    }

    fn entry_mut(&mut self, id: DebugEntryId) -> Option<&mut DebugEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn set_transform(&mut self, id: DebugEntryId, transform: Mat4) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        entry.transform = transform;
        true
    }

    pub fn set_enabled(&mut self, id: DebugEntryId, enabled: bool) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        entry.enabled = enabled;
        true
    }

    pub fn remove(&mut self, id: DebugEntryId) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        self.entries.remove(index).geometry.release();
        true
    }

    fn draw_entries(&self, pass: &mut RenderPass<'_>, camera: &Camera) {
        let view_proj = camera.view_proj();
        for (topology, pipeline) in [
            (PrimitiveTopology::TriangleList, &self.fill_pipeline),
            (PrimitiveTopology::LineList, &self.line_pipeline),
        ] {
            let mut entries = self
                .entries
                .iter()
                .filter(|e| e.enabled && e.topology == topology)
                .peekable();
            if entries.peek().is_none() {
                continue;
            }
            pass.bind_pipeline(pipeline);
            for entry in entries {
                let mvp = view_proj * entry.transform;
                pass.push_vertex_uniform(0, &DepthUniforms::from_mvp(&mvp));
                for (view, tint) in entry.geometry.views().iter().zip(&entry.tints) {
                    pass.push_fragment_uniform(0, tint);
                    view.draw(pass);
                }
            }
        }
    }
}

impl Scene for DebugScene {
    fn render(&mut self, renderer: &mut Renderer, camera: &Camera) -> Result<(), GraphicsError> {
        let target = frame_target(renderer)?;
        if self.entries.iter().all(|e| !e.enabled) && self.systems.is_empty() {
            return Ok(());
        }
        let depth = renderer.depth_texture();
        let cmd = renderer.command_buffer()?;
        let mut pass = cmd.begin_render_pass(
            RenderPassDescriptor::new()
                .with_label("debug")
                .with_color_attachment(ColorAttachment::load(target))
                .with_depth_attachment(DepthAttachment::load(depth)),
        )?;
        self.draw_entries(&mut pass, camera);
        for system in &mut self.systems {
            system(&mut pass, camera);
        }
        Ok(())
    }

    fn release(&mut self) {
        for entry in &mut self.entries {
            entry.geometry.release();
        }
        self.entries.clear();
        self.systems.clear();
    }
}
