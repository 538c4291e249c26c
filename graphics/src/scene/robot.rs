//! Lit scene of robot links and environment geometry.
//!
//! Every object is tagged with the [`GeometryKind`] of its collision shape,
//! which picks its pipeline and primitive topology. Pipelines are created on
//! the first frame a kind is present and reused afterwards.
//!
//! Frame order: shadow map, optional depth pre-pass, normal G-buffer (when
//! SSAO or the normal target is on), SSAO, then one color pass drawing
//! triangle meshes with the PBR pipeline and lines/points unlit.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use umbra_core::bounds::Aabb;
use umbra_core::camera::Camera;
use umbra_core::light::DirectionalLight;
use umbra_core::material::PbrMaterialData;
use umbra_core::math::Mat4;
use umbra_core::mesh::{MeshData, MeshLayout, PrimitiveTopology, VertexAttrib};

use crate::command::{ColorAttachment, DepthAttachment, RenderPassDescriptor};
use crate::device::Device;
use crate::effects::{SsaoConfig, SsaoPass};
use crate::error::GraphicsError;
use crate::mesh::{Mesh, MeshGroup, MeshView, create_and_upload_mesh};
use crate::passes::{
    DepthPassConfig, DepthPassInfo, OpaqueCastable, ShadowPassConfig, ShadowPassInfo,
    render_depth_only_pass, render_shadow_pass_from_aabb,
};
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDescriptor};
use crate::renderer::Renderer;
use crate::resources::{Sampler, Texture, TextureRef};
use crate::shader::{BuiltinShaders, ShaderStage, library, load_shader};
use crate::types::{
    AddressMode, Color, ColorTargetDescription, CompareFunction, CullMode, DepthBias,
    DepthStencilState, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};
use crate::uniforms::{
    DepthUniforms, DirectionalLightUniforms, FrameParams, LightSpaceUniforms, MaterialUniforms,
    TintUniforms,
};

use super::{
    Scene, SolidPipelineState, create_solid_color_pipeline, frame_target, require_attributes,
};

/// Format of the view-space normal G-buffer (octahedral encoding).
pub const NORMAL_TARGET_FORMAT: TextureFormat = TextureFormat::Rg16Float;

/// Collision-shape category of a piece of geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    TriangleMesh,
    Heightfield,
    PointCloud,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 3] = [
        GeometryKind::TriangleMesh,
        GeometryKind::Heightfield,
        GeometryKind::PointCloud,
    ];

    pub fn topology(self) -> PrimitiveTopology {
        match self {
            GeometryKind::TriangleMesh => PrimitiveTopology::TriangleList,
            GeometryKind::Heightfield => PrimitiveTopology::LineList,
            GeometryKind::PointCloud => PrimitiveTopology::PointList,
        }
    }

    /// Attributes the kind's pipeline reads.
    fn required_attributes(self) -> &'static [VertexAttrib] {
        match self {
            GeometryKind::TriangleMesh => &[
                VertexAttrib::Position,
                VertexAttrib::Normal,
                VertexAttrib::Color0,
            ],
            GeometryKind::Heightfield | GeometryKind::PointCloud => {
                &[VertexAttrib::Position, VertexAttrib::Color0]
            }
        }
    }

    fn default_flags(self) -> ObjectFlags {
        match self {
            GeometryKind::TriangleMesh => ObjectFlags::OPAQUE,
            GeometryKind::Heightfield | GeometryKind::PointCloud => ObjectFlags::empty(),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u8 {
        /// Casts shadows and takes part in the depth pre-pass.
        const OPAQUE = 1 << 0;
        /// Skipped by every pass.
        const DISABLED = 1 << 1;
        /// Added with `add_environment_object`.
        const ENVIRONMENT = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

/// GPU buffers of one object: a single mesh, or several sharing master
/// buffers.
#[derive(Debug)]
pub enum ObjectGeometry {
    Single(Mesh),
    Group(MeshGroup),
}

impl ObjectGeometry {
    pub(crate) fn upload(device: &Arc<Device>, data: &[MeshData]) -> Result<Self, GraphicsError> {
        match data {
            [] => Err(GraphicsError::InvalidParameter(
                "scene object needs at least one mesh".to_string(),
            )),
            [single] => Ok(ObjectGeometry::Single(create_and_upload_mesh(device, single)?)),
            many => {
                let views: Vec<_> = many.iter().map(MeshData::as_view).collect();
                Ok(ObjectGeometry::Group(MeshGroup::create_and_upload(device, &views)?))
            }
        }
    }

    pub fn views(&self) -> Vec<MeshView> {
        match self {
            ObjectGeometry::Single(mesh) => vec![mesh.view()],
            ObjectGeometry::Group(group) => group.views(),
        }
    }

    pub fn release(&mut self) {
        match self {
            ObjectGeometry::Single(mesh) => mesh.release_owned_buffers(),
            ObjectGeometry::Group(group) => group.release(),
        }
    }
}

#[derive(Debug)]
pub struct SceneObject {
    id: ObjectId,
    kind: GeometryKind,
    geometry: ObjectGeometry,
    materials: Vec<PbrMaterialData>,
    local_bounds: Aabb,
    transform: Mat4,
    flags: ObjectFlags,
}

impl SceneObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn geometry(&self) -> &ObjectGeometry {
        &self.geometry
    }

    /// One material per submesh.
    pub fn materials(&self) -> &[PbrMaterialData] {
        &self.materials
    }

    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn is_enabled(&self) -> bool {
        !self.flags.contains(ObjectFlags::DISABLED)
    }

    pub fn local_bounds(&self) -> &Aabb {
        &self.local_bounds
    }

    pub fn world_bounds(&self) -> Aabb {
        self.local_bounds.transformed(&self.transform)
    }
}

/// One triangle submesh prepared for the current frame.
#[derive(Debug, Clone)]
pub struct TriangleDraw {
    pub castable: OpaqueCastable,
    pub material: PbrMaterialData,
    pub opaque: bool,
}

#[derive(Debug, Clone)]
pub struct RobotSceneConfig {
    /// Recorded only; the scene renders single-sampled.
    pub enable_msaa: bool,
    pub enable_shadows: bool,
    pub enable_ssao: bool,
    /// Run a depth pre-pass over opaque triangle meshes.
    pub triangle_has_prepass: bool,
    /// Render the normal G-buffer even without SSAO.
    pub enable_normal_target: bool,
    pub shadow: ShadowPassConfig,
    pub ssao: SsaoConfig,
    pub clear_color: Color,
}

impl Default for RobotSceneConfig {
    fn default() -> Self {
        Self {
            enable_msaa: false,
            enable_shadows: true,
            enable_ssao: true,
            triangle_has_prepass: false,
            enable_normal_target: false,
            shadow: ShadowPassConfig::default(),
            ssao: SsaoConfig::default(),
            clear_color: Color::new(0.1, 0.1, 0.12, 1.0),
        }
    }
}

impl RobotSceneConfig {
    pub fn with_shadows(mut self, enabled: bool) -> Self {
        self.enable_shadows = enabled;
        self
    }

    pub fn with_ssao(mut self, enabled: bool) -> Self {
        self.enable_ssao = enabled;
        self
    }

    pub fn with_prepass(mut self, enabled: bool) -> Self {
        self.triangle_has_prepass = enabled;
        self
    }

    pub fn with_normal_target(mut self, enabled: bool) -> Self {
        self.enable_normal_target = enabled;
        self
    }

    pub fn with_shadow_config(mut self, shadow: ShadowPassConfig) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_ssao_config(mut self, ssao: SsaoConfig) -> Self {
        self.ssao = ssao;
        self
    }

    pub fn with_clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    fn needs_normal_target(&self) -> bool {
        self.enable_ssao || self.enable_normal_target
    }
}

/// Pipelines of one geometry kind, created for the first layout seen.
#[derive(Debug)]
struct KindPipelines {
    main: GraphicsPipeline,
    /// Normal G-buffer pipeline, triangle meshes only.
    normals: Option<GraphicsPipeline>,
}

/// Stand-ins bound when shadows or SSAO are off, so the PBR pipeline always
/// sees a full set of samplers.
#[derive(Debug)]
struct FallbackMaps {
    /// 1x1 depth cleared to 1.0.
    shadow: Texture,
    shadow_sampler: Sampler,
    /// 1x1 `R32Float` cleared to 1.0.
    occlusion: Texture,
    occlusion_sampler: Sampler,
}

impl FallbackMaps {
    fn create(device: &Arc<Device>, depth_format: TextureFormat) -> Result<Self, GraphicsError> {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let shadow = device.create_texture(
            &TextureDescriptor::new_2d(1, 1, depth_format, usage).with_label("fallback shadow map"),
        )?;
        let occlusion = device.create_texture(
            &TextureDescriptor::new_2d(1, 1, TextureFormat::R32Float, usage)
                .with_label("fallback occlusion"),
        )?;
        let shadow_sampler = device.create_sampler(
            &SamplerDescriptor::linear()
                .with_label("fallback shadow sampler")
                .with_address_mode(AddressMode::ClampToEdge)
                .with_compare(CompareFunction::Less),
        )?;
        let occlusion_sampler = device.create_sampler(
            &SamplerDescriptor::nearest()
                .with_label("fallback occlusion sampler")
                .with_address_mode(AddressMode::ClampToEdge),
        )?;

        let mut cmd = device.acquire_command_buffer();
        cmd.begin_render_pass(
            RenderPassDescriptor::new()
                .with_label("clear fallbacks")
                .with_color_attachment(ColorAttachment::clear(occlusion.share(), Color::WHITE))
                .with_depth_attachment(DepthAttachment::clear(shadow.share(), 1.0)),
        )?;
        cmd.submit()?;

        Ok(Self {
            shadow,
            shadow_sampler,
            occlusion,
            occlusion_sampler,
        })
    }

    fn release(&mut self) {
        self.shadow.release();
        self.occlusion.release();
    }
}

/// Renders robot links and environment objects with a directional light.
#[derive(Debug)]
pub struct RobotScene {
    device: Arc<Device>,
    config: RobotSceneConfig,
    color_format: TextureFormat,
    depth_format: TextureFormat,
    objects: Vec<SceneObject>,
    next_id: u32,
    light: DirectionalLight,
    /// Layout each kind was first added with.
    layouts: HashMap<GeometryKind, MeshLayout>,
    pipelines: HashMap<GeometryKind, KindPipelines>,
    shadow: Option<ShadowPassInfo>,
    prepass: Option<DepthPassInfo>,
    normal_target: Option<Texture>,
    ssao: Option<SsaoPass>,
    fallbacks: FallbackMaps,
}

impl RobotScene {
    /// Create an empty scene for `renderer`'s formats and size.
    pub fn new(renderer: &Renderer, config: RobotSceneConfig) -> Result<Self, GraphicsError> {
        let device = Arc::clone(renderer.device());
        let (width, height) = renderer.size();
        if config.enable_msaa {
            log::warn!("RobotScene: MSAA requested, rendering single-sampled");
        }
        let ssao = if config.enable_ssao {
            Some(SsaoPass::new(&device, width, height, config.ssao.clone())?)
        } else {
            None
        };
        let normal_target = if config.needs_normal_target() {
            Some(create_normal_target(&device, width, height)?)
        } else {
            None
        };
        let fallbacks = FallbackMaps::create(&device, renderer.depth_format())?;
        log::info!(
            "created robot scene (shadows: {}, ssao: {}, prepass: {})",
            config.enable_shadows,
            config.enable_ssao,
            config.triangle_has_prepass
        );
        Ok(Self {
            device,
            color_format: renderer.swapchain_format(),
            depth_format: renderer.depth_format(),
            config,
            objects: Vec::new(),
            next_id: 0,
            light: DirectionalLight::default(),
            layouts: HashMap::new(),
            pipelines: HashMap::new(),
            shadow: None,
            prepass: None,
            normal_target,
            ssao,
            fallbacks,
        })
    }

    pub fn config(&self) -> &RobotSceneConfig {
        &self.config
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn set_light(&mut self, light: DirectionalLight) {
        self.light = light;
    }

    /// Upload `data` as one object of `kind` placed at `transform`.
    ///
    /// Every mesh must use `kind`'s topology, and all objects of one kind
    /// must share a vertex layout.
    pub fn add_geometry(
        &mut self,
        kind: GeometryKind,
        data: &[MeshData],
        transform: Mat4,
    ) -> Result<ObjectId, GraphicsError> {
        self.add_object(kind, data, transform, kind.default_flags())
    }

    /// Add static geometry that [`clear_environment`](Self::clear_environment)
    /// can remove in one go.
    pub fn add_environment_object(
        &mut self,
        data: MeshData,
        placement: Mat4,
        kind: GeometryKind,
    ) -> Result<ObjectId, GraphicsError> {
        self.add_object(
            kind,
            std::slice::from_ref(&data),
            placement,
            kind.default_flags() | ObjectFlags::ENVIRONMENT,
        )
    }

    fn add_object(
        &mut self,
        kind: GeometryKind,
        data: &[MeshData],
        transform: Mat4,
        flags: ObjectFlags,
    ) -> Result<ObjectId, GraphicsError> {
        for mesh in data {
            self.check_mesh(kind, mesh)?;
        }
        let geometry = ObjectGeometry::upload(&self.device, data)?;
        if let Some(first) = data.first() {
            self.layouts.entry(kind).or_insert_with(|| first.layout().clone());
        }

        let mut local_bounds = Aabb::default();
        for mesh in data {
            local_bounds.merge(&mesh.bounds());
        }
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        log::debug!(
            "RobotScene: added {kind:?} object {id:?} with {} mesh(es)",
            data.len()
        );
        self.objects.push(SceneObject {
            id,
            kind,
            geometry,
            materials: data.iter().map(|m| m.material).collect(),
            local_bounds,
            transform,
            flags,
        });
        Ok(id)
    }

    fn check_mesh(&self, kind: GeometryKind, mesh: &MeshData) -> Result<(), GraphicsError> {
        if mesh.topology != kind.topology() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{kind:?} geometry must be a {:?}, got {:?}",
                kind.topology(),
                mesh.topology
            )));
        }
        let layout = mesh.layout();
        if layout.num_bindings() != 1 {
            return Err(GraphicsError::InvalidParameter(format!(
                "{kind:?} geometry needs a single vertex binding, layout has {}",
                layout.num_bindings()
            )));
        }
        require_attributes(layout, kind.required_attributes(), &format!("{kind:?}"))?;
        if let Some(existing) = self.layouts.get(&kind)
            && existing != layout
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "{kind:?} geometry must share one vertex layout"
            )));
        }
        Ok(())
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Update an object's world transform. Returns `false` for unknown ids.
    pub fn set_transform(&mut self, id: ObjectId, transform: Mat4) -> bool {
        match self.object_mut(id) {
            Some(object) => {
                object.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&mut self, id: ObjectId, enabled: bool) -> bool {
        match self.object_mut(id) {
            Some(object) => {
                object.flags.set(ObjectFlags::DISABLED, !enabled);
                true
            }
            None => false,
        }
    }

    /// Whether the object casts shadows and joins the depth pre-pass.
    pub fn set_opaque(&mut self, id: ObjectId, opaque: bool) -> bool {
        match self.object_mut(id) {
            Some(object) => {
                object.flags.set(ObjectFlags::OPAQUE, opaque);
                true
            }
            None => false,
        }
    }

    /// Remove an object and free its buffers.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(index) = self.objects.iter().position(|o| o.id == id) else {
            return false;
        };
        let mut object = self.objects.remove(index);
        object.geometry.release();
        true
    }

    /// Remove every environment object.
    pub fn clear_environment(&mut self) {
        self.objects.retain_mut(|object| {
            let keep = !object.flags.contains(ObjectFlags::ENVIRONMENT);
            if !keep {
                object.geometry.release();
            }
            keep
        });
    }

    /// Union of the world bounds of every enabled object.
    pub fn world_space_bounds(&self) -> Aabb {
        let mut bounds = Aabb::default();
        for object in self.objects.iter().filter(|o| o.is_enabled()) {
            bounds.merge(&object.world_bounds());
        }
        bounds
    }

    /// Per-submesh draws of every enabled triangle mesh, with transforms
    /// computed once from `camera`.
    pub fn triangle_draws(&self, camera: &Camera) -> Vec<TriangleDraw> {
        let mut draws = Vec::new();
        for object in self.objects.iter().filter(|o| {
            o.kind == GeometryKind::TriangleMesh && o.is_enabled()
        }) {
            let opaque = object.flags.contains(ObjectFlags::OPAQUE);
            for (view, material) in object.geometry.views().into_iter().zip(&object.materials) {
                draws.push(TriangleDraw {
                    castable: OpaqueCastable::new(view, object.transform, camera),
                    material: *material,
                    opaque,
                });
            }
        }
        draws
    }

    /// Opaque, enabled triangle submeshes as seen from `camera`.
    pub fn collect_opaque_castables(&self, camera: &Camera) -> Vec<OpaqueCastable> {
        self.triangle_draws(camera)
            .into_iter()
            .filter(|d| d.opaque)
            .map(|d| d.castable)
            .collect()
    }

    /// Number of kind pipelines created so far.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn shadow_pass(&self) -> Option<&ShadowPassInfo> {
        self.shadow.as_ref()
    }

    pub fn ssao_pass(&self) -> Option<&SsaoPass> {
        self.ssao.as_ref()
    }

    pub fn normal_target(&self) -> Option<TextureRef> {
        self.normal_target.as_ref().map(Texture::share)
    }

    /// Create pipelines and depth passes for kinds that appeared since the
    /// last frame.
    fn ensure_pipelines(&mut self, renderer: &Renderer) -> Result<(), GraphicsError> {
        for kind in GeometryKind::ALL {
            if self.pipelines.contains_key(&kind) {
                continue;
            }
            let Some(layout) = self.layouts.get(&kind).cloned() else {
                continue;
            };
            let pipelines = match kind {
                GeometryKind::TriangleMesh => {
                    self.create_triangle_passes(renderer, &layout)?;
                    KindPipelines {
                        main: create_pbr_pipeline(
                            &self.device,
                            &layout,
                            self.color_format,
                            self.depth_format,
                        )?,
                        normals: if self.config.needs_normal_target() {
                            Some(create_normals_pipeline(&self.device, &layout, self.depth_format)?)
                        } else {
                            None
                        },
                    }
                }
                GeometryKind::Heightfield | GeometryKind::PointCloud => KindPipelines {
                    main: create_solid_color_pipeline(
                        &self.device,
                        self.color_format,
                        self.depth_format,
                        &SolidPipelineState {
                            label: &format!("{kind:?} pipeline"),
                            layout: &layout,
                            topology: kind.topology(),
                            cull_mode: CullMode::None,
                            depth_bias: DepthBias::default(),
                            depth_write: true,
                        },
                    )?,
                    normals: None,
                },
            };
            log::debug!("RobotScene: created pipeline for {kind:?}");
            self.pipelines.insert(kind, pipelines);
        }
        Ok(())
    }

    /// Shadow pass and pre-pass for the triangle layout.
    fn create_triangle_passes(
        &mut self,
        renderer: &Renderer,
        layout: &MeshLayout,
    ) -> Result<(), GraphicsError> {
        if self.config.enable_shadows {
            let mut config = self.config.shadow.clone();
            config.depth = config.depth.with_layout(layout.clone());
            self.shadow = Some(ShadowPassInfo::create(renderer, &config)?);
        }
        if self.config.triangle_has_prepass {
            self.prepass = Some(DepthPassInfo::create(
                renderer,
                &DepthPassConfig::default().with_layout(layout.clone()),
            )?);
        }
        Ok(())
    }

    /// Resize the screen-space targets to the renderer's size.
    fn ensure_targets(&mut self, (width, height): (u32, u32)) -> Result<(), GraphicsError> {
        if let Some(target) = &self.normal_target
            && (target.width(), target.height()) != (width, height)
        {
            self.normal_target = Some(create_normal_target(&self.device, width, height)?);
        }
        if let Some(ssao) = &mut self.ssao {
            ssao.resize(width, height)?;
        }
        Ok(())
    }

    /// Render the shadow map. Returns the light's view-projection when a
    /// shadow map was produced this frame.
    fn render_shadows(
        &mut self,
        renderer: &mut Renderer,
        castables: &[OpaqueCastable],
    ) -> Result<Option<Mat4>, GraphicsError> {
        if castables.is_empty() {
            return Ok(None);
        }
        let bounds = self.world_space_bounds();
        let Some(shadow) = &mut self.shadow else {
            return Ok(None);
        };
        if bounds.is_empty() {
            return Ok(None);
        }
        render_shadow_pass_from_aabb(renderer, shadow, &self.light, castables, &bounds)?;
        Ok(Some(shadow.light_camera().view_proj()))
    }

    /// Normal G-buffer and SSAO. Returns whether SSAO ran.
    fn render_screen_space(
        &self,
        renderer: &mut Renderer,
        camera: &Camera,
        draws: &[TriangleDraw],
        depth_written: &mut bool,
    ) -> Result<bool, GraphicsError> {
        let (Some(normal_target), Some(pipelines)) = (
            &self.normal_target,
            self.pipelines.get(&GeometryKind::TriangleMesh),
        ) else {
            return Ok(false);
        };
        let Some(normals_pipeline) = &pipelines.normals else {
            return Ok(false);
        };
        if draws.is_empty() {
            return Ok(false);
        }

        let depth = renderer.depth_texture();
        let depth_attachment = if *depth_written {
            DepthAttachment::load(depth.clone())
        } else {
            DepthAttachment::clear(depth.clone(), 1.0)
        };
        let cmd = renderer.command_buffer()?;
        {
            let mut pass = cmd.begin_render_pass(
                RenderPassDescriptor::new()
                    .with_label("normal g-buffer")
                    .with_color_attachment(ColorAttachment::clear(
                        normal_target.share(),
                        Color::TRANSPARENT,
                    ))
                    .with_depth_attachment(depth_attachment),
            )?;
            pass.bind_pipeline(normals_pipeline);
            for draw in draws {
                pass.push_vertex_uniform(0, &draw.castable.transforms);
                draw.castable.mesh.draw(&mut pass);
            }
        }
        *depth_written = true;

        match &self.ssao {
            Some(ssao) => {
                ssao.render(cmd, camera, &depth, &normal_target.share())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn render_color_pass(
        &self,
        renderer: &mut Renderer,
        camera: &Camera,
        draws: &[TriangleDraw],
        light_view_proj: Option<Mat4>,
        use_ssao: bool,
        depth_written: bool,
    ) -> Result<(), GraphicsError> {
        let target = frame_target(renderer)?;
        let depth = renderer.depth_texture();
        let (width, height) = renderer.size();

        let (shadow_map, shadow_sampler) = match (&self.shadow, light_view_proj) {
            (Some(shadow), Some(_)) => (shadow.shadow_map(), shadow.sampler().clone()),
            _ => (
                self.fallbacks.shadow.share(),
                self.fallbacks.shadow_sampler.clone(),
            ),
        };
        let (occlusion, occlusion_sampler) = match (&self.ssao, use_ssao) {
            (Some(ssao), true) => (ssao.ssao_map(), ssao.sampler().clone()),
            _ => (
                self.fallbacks.occlusion.share(),
                self.fallbacks.occlusion_sampler.clone(),
            ),
        };
        let light = DirectionalLightUniforms::new(
            &camera.transform_vector(&self.light.normalized_direction()),
            &self.light.color,
            self.light.intensity,
        );
        let frame = FrameParams {
            viewport_size: [width as f32, height as f32],
            use_shadows: u32::from(light_view_proj.is_some()),
            use_ssao: u32::from(use_ssao),
        };
        let light_view_proj = light_view_proj.unwrap_or_else(Mat4::identity);

        let cmd = renderer.command_buffer()?;
        let mut pass = cmd.begin_render_pass(
            RenderPassDescriptor::new()
                .with_label("robot scene")
                .with_color_attachment(ColorAttachment::clear(target, self.config.clear_color))
                .with_depth_attachment(if depth_written {
                    DepthAttachment::load(depth)
                } else {
                    DepthAttachment::clear(depth, 1.0)
                }),
        )?;

        if let Some(pipelines) = self.pipelines.get(&GeometryKind::TriangleMesh)
            && !draws.is_empty()
        {
            pass.bind_pipeline(&pipelines.main);
            pass.push_fragment_uniform(1, &light);
            pass.push_fragment_uniform(2, &frame);
            pass.bind_fragment_sampler(0, &shadow_map, &shadow_sampler);
            pass.bind_fragment_sampler(1, &occlusion, &occlusion_sampler);
            for draw in draws {
                // Same bytes as the depth pre-pass.
                pass.push_vertex_uniform(0, &draw.castable.transforms);
                pass.push_vertex_uniform(
                    1,
                    &LightSpaceUniforms::new(&light_view_proj, &draw.castable.model),
                );
                pass.push_fragment_uniform(0, &MaterialUniforms::from(&draw.material));
                draw.castable.mesh.draw(&mut pass);
            }
        }

        let view_proj = camera.view_proj();
        for kind in [GeometryKind::Heightfield, GeometryKind::PointCloud] {
            let Some(pipelines) = self.pipelines.get(&kind) else {
                continue;
            };
            let mut bound = false;
            for object in self.objects.iter().filter(|o| o.kind == kind && o.is_enabled()) {
                if !bound {
                    pass.bind_pipeline(&pipelines.main);
                    bound = true;
                }
                let mvp = view_proj * object.transform;
                pass.push_vertex_uniform(0, &DepthUniforms::from_mvp(&mvp));
                for (view, material) in object.geometry.views().iter().zip(&object.materials) {
                    pass.push_fragment_uniform(
                        0,
                        &TintUniforms {
                            color: material.base_color.into(),
                        },
                    );
                    view.draw(&mut pass);
                }
            }
        }
        Ok(())
    }
}

impl Scene for RobotScene {
    fn render(&mut self, renderer: &mut Renderer, camera: &Camera) -> Result<(), GraphicsError> {
        frame_target(renderer)?;
        self.ensure_pipelines(renderer)?;
        self.ensure_targets(renderer.size())?;

        let draws = self.triangle_draws(camera);
        let castables: Vec<OpaqueCastable> = draws
            .iter()
            .filter(|d| d.opaque)
            .map(|d| d.castable.clone())
            .collect();

        let light_view_proj = self.render_shadows(renderer, &castables)?;

        let mut depth_written = false;
        if let Some(prepass) = &mut self.prepass
            && !castables.is_empty()
        {
            render_depth_only_pass(renderer, prepass, &castables)?;
            depth_written = true;
        }

        let use_ssao = self.render_screen_space(renderer, camera, &draws, &mut depth_written)?;
        self.render_color_pass(renderer, camera, &draws, light_view_proj, use_ssao, depth_written)
    }

    fn release(&mut self) {
        for object in &mut self.objects {
            object.geometry.release();
        }
        self.objects.clear();
        self.pipelines.clear();
        self.layouts.clear();
        if let Some(shadow) = &mut self.shadow {
            shadow.release();
        }
        if let Some(prepass) = &mut self.prepass {
            prepass.release();
        }
        if let Some(target) = &mut self.normal_target {
            target.release();
        }
        if let Some(ssao) = &mut self.ssao {
            ssao.release();
        }
        self.fallbacks.release();
    }
}

fn create_normal_target(
    device: &Arc<Device>,
    width: u32,
    height: u32,
) -> Result<Texture, GraphicsError> {
    device.create_texture(
        &TextureDescriptor::new_2d(
            width,
            height,
            NORMAL_TARGET_FORMAT,
            TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        )
        .with_label("normal g-buffer"),
    )
}

/// Lit triangle pipeline. Tests `LessEqual` so a depth pre-pass of the same
/// transforms passes.
fn create_pbr_pipeline(
    device: &Arc<Device>,
    layout: &MeshLayout,
    color_format: TextureFormat,
    depth_format: TextureFormat,
) -> Result<GraphicsPipeline, GraphicsError> {
    let shaders = BuiltinShaders::new();
    let vertex = load_shader(device, &shaders, library::PBR_BASIC, ShaderStage::Vertex)?;
    let fragment = load_shader(device, &shaders, library::PBR_BASIC, ShaderStage::Fragment)?;
    device.create_pipeline(
        &GraphicsPipelineDescriptor::new(vertex)
            .with_label("pbr")
            .with_fragment_shader(fragment)
            .with_vertex_input(layout.to_vertex_input_state())
            .with_topology(PrimitiveTopology::TriangleList)
            .with_cull_mode(CullMode::Back)
            .with_depth_stencil(
                DepthStencilState::new(depth_format, CompareFunction::LessEqual)
                    .with_depth_write(true),
            )
            .with_color_target(ColorTargetDescription::new(color_format)),
    )
}

fn create_normals_pipeline(
    device: &Arc<Device>,
    layout: &MeshLayout,
    depth_format: TextureFormat,
) -> Result<GraphicsPipeline, GraphicsError> {
    let shaders = BuiltinShaders::new();
    let vertex = load_shader(device, &shaders, library::NORMALS, ShaderStage::Vertex)?;
    let fragment = load_shader(device, &shaders, library::NORMALS, ShaderStage::Fragment)?;
    device.create_pipeline(
        &GraphicsPipelineDescriptor::new(vertex)
            .with_label("normal g-buffer")
            .with_fragment_shader(fragment)
            .with_vertex_input(layout.to_vertex_input_state())
            .with_topology(PrimitiveTopology::TriangleList)
            .with_cull_mode(CullMode::Back)
            .with_depth_stencil(
                DepthStencilState::new(depth_format, CompareFunction::LessEqual)
                    .with_depth_write(true),
            )
            .with_color_target(ColorTargetDescription::new(NORMAL_TARGET_FORMAT)),
    )
}
