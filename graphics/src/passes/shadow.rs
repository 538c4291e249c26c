//! Directional shadow maps.
//!
//! The light camera is fitted to a bounding sphere of whatever must cast
//! shadows: the scene's world-space AABB, or the main camera's frustum.
//! The sphere radius is rounded up to [`SHADOW_RADIUS_GRANULARITY`] so the
//! light-space box does not jitter from frame to frame. The light sits one
//! radius behind the center, looking along the light direction, and the
//! orthographic box spans `[-r, r]` in X and Y and `[0, 2r]` in front of the
//! eye, which [`shadow_orthographic_matrix`] maps to depth `[0, 1]`.

use umbra_core::bounds::{Aabb, Corners, frustum_bounding_sphere};
use umbra_core::camera::Camera;
use umbra_core::light::DirectionalLight;
use umbra_core::math::{
    SHADOW_RADIUS_GRANULARITY, Vec2, Vec3, look_at, round_up_to, shadow_orthographic_matrix,
    stable_up_vector,
};

use crate::error::GraphicsError;
use crate::renderer::Renderer;
use crate::resources::{Sampler, TextureRef};
use crate::types::{
    AddressMode, CompareFunction, CullMode, SamplerDescriptor, TextureDescriptor, TextureFormat,
    TextureUsage,
};
use crate::uniforms::DepthUniforms;

use super::depth::{DepthPassConfig, DepthPassInfo, OpaqueCastable, render_depth_pass_into};

/// Default shadow map edge length in texels.
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;

#[derive(Debug, Clone)]
pub struct ShadowPassConfig {
    pub width: u32,
    pub height: u32,
    /// Shadow map format; the renderer's depth format when `None`.
    pub format: Option<TextureFormat>,
    /// Pipeline state. Shadows are cast by both faces by default.
    pub depth: DepthPassConfig,
}

impl Default for ShadowPassConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_SHADOW_MAP_SIZE,
            height: DEFAULT_SHADOW_MAP_SIZE,
            format: None,
            depth: DepthPassConfig::default()
                .with_cull_mode(CullMode::None)
                .with_label("shadow pass"),
        }
    }
}

impl ShadowPassConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Light camera fitted around a bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFit {
    pub center: Vec3,
    /// Rounded radius.
    pub radius: f32,
    pub camera: Camera,
}

fn fit_sphere(center: Vec3, radius: f32, light: &DirectionalLight) -> ShadowFit {
    let radius = round_up_to(radius, SHADOW_RADIUS_GRANULARITY).max(SHADOW_RADIUS_GRANULARITY);
    let direction = light.normalized_direction();
    let eye = center - radius * direction;
    // Up is world +Z, except for a light along Z where +Z would make
    // look_at degenerate; there +Y is used instead.
    let view = look_at(&eye, &center, &stable_up_vector(&direction));
    let size = 2.0 * radius;
    let projection = shadow_orthographic_matrix(Vec2::new(size, size), -radius, radius);
    ShadowFit {
        center,
        radius,
        camera: Camera::new(projection, view),
    }
}

/// Fit the light camera around `bounds`.
pub fn fit_shadow_to_aabb(
    bounds: &Aabb,
    light: &DirectionalLight,
) -> Result<ShadowFit, GraphicsError> {
    if bounds.is_empty() {
        return Err(GraphicsError::InvalidParameter(
            "cannot fit a shadow map to empty scene bounds".to_string(),
        ));
    }
    Ok(fit_sphere(bounds.center(), bounds.radius(), light))
}

/// Fit the light camera around the bounding sphere of world-space frustum
/// corners.
pub fn fit_shadow_to_frustum(corners: &Corners, light: &DirectionalLight) -> ShadowFit {
    let (center, radius) = frustum_bounding_sphere(corners);
    fit_sphere(center, radius, light)
}

/// Shadow map, its comparison sampler and the light camera of the last
/// render.
///
/// The shadow map is always a dedicated texture; [`release`](Self::release)
/// frees it.
#[derive(Debug)]
pub struct ShadowPassInfo {
    pass: DepthPassInfo,
    sampler: Sampler,
    light_camera: Camera,
}

impl ShadowPassInfo {
    pub fn create(renderer: &Renderer, config: &ShadowPassConfig) -> Result<Self, GraphicsError> {
        let device = renderer.device();
        let format = config.format.unwrap_or(renderer.depth_format());
        let mut usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        if format == TextureFormat::Depth32Float {
            usage |= TextureUsage::COPY_SRC;
        }
        let shadow_map = device.create_texture(
            &TextureDescriptor::new_2d(config.width, config.height, format, usage)
                .with_label("shadow map"),
        )?;
        let pass = DepthPassInfo::with_target(device, shadow_map, &config.depth)?;
        let sampler = device.create_sampler(
            &SamplerDescriptor::linear()
                .with_label("shadow sampler")
                .with_address_mode(AddressMode::ClampToEdge)
                .with_compare(CompareFunction::Less),
        )?;
        log::info!(
            "created {}x{} {format:?} shadow map",
            config.width,
            config.height
        );
        Ok(Self {
            pass,
            sampler,
            light_camera: Camera::default(),
        })
    }

    pub fn shadow_map(&self) -> TextureRef {
        self.pass.depth_texture()
    }

    /// Comparison sampler for shadow lookups.
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Light camera used by the most recent shadow render.
    pub fn light_camera(&self) -> &Camera {
        &self.light_camera
    }

    pub fn depth_pass(&self) -> &DepthPassInfo {
        &self.pass
    }

    pub fn release(&mut self) {
        self.pass.release();
    }

    /// Render `castables` from the light camera of `fit`.
    pub fn render(
        &mut self,
        renderer: &mut Renderer,
        fit: &ShadowFit,
        castables: &[OpaqueCastable],
    ) -> Result<(), GraphicsError> {
        self.light_camera = fit.camera;
        let light_view_proj = fit.camera.view_proj();
        let cmd = renderer.command_buffer()?;
        render_depth_pass_into(
            cmd,
            &self.pass,
            "shadow pass",
            castables
                .iter()
                .map(|c| (&c.mesh, DepthUniforms::from_mvp(&(light_view_proj * c.model)))),
        )
    }
}

/// Render the shadow map with the light fitted to world-space scene bounds.
pub fn render_shadow_pass_from_aabb(
    renderer: &mut Renderer,
    info: &mut ShadowPassInfo,
    light: &DirectionalLight,
    castables: &[OpaqueCastable],
    scene_bounds: &Aabb,
) -> Result<(), GraphicsError> {
    let fit = fit_shadow_to_aabb(scene_bounds, light)?;
    info.render(renderer, &fit, castables)
}

/// Render the shadow map with the light fitted to the main camera's frustum.
pub fn render_shadow_pass_from_frustum(
    renderer: &mut Renderer,
    info: &mut ShadowPassInfo,
    light: &DirectionalLight,
    castables: &[OpaqueCastable],
    camera: &Camera,
) -> Result<(), GraphicsError> {
    let corners = camera.world_frustum_corners().ok_or_else(|| {
        GraphicsError::InvalidParameter("camera projection is not invertible".to_string())
    })?;
    let fit = fit_shadow_to_frustum(&corners, light);
    info.render(renderer, &fit, castables)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use umbra_core::math::Point3;

    use super::*;
    use crate::device::{Device, DeviceDescriptor};
    use crate::window::RenderWindow;

    fn assert_contains(fit: &ShadowFit, points: &[Vec3]) {
        let view_proj = fit.camera.view_proj();
        for p in points {
            let clip = view_proj * Point3::from(*p).to_homogeneous();
            let ndc = clip.xyz() / clip.w;
            assert!(ndc.x.abs() <= 1.0 + 1e-5, "{p:?} -> {ndc:?}");
            assert!(ndc.y.abs() <= 1.0 + 1e-5, "{p:?} -> {ndc:?}");
            assert!((-1e-5..=1.0 + 1e-5).contains(&ndc.z), "{p:?} -> {ndc:?}");
        }
    }

    #[test]
    fn test_radius_rounded_to_sixteenth() {
        let bounds = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let fit = fit_shadow_to_aabb(&bounds, &DirectionalLight::default()).unwrap();
        assert_relative_eq!(fit.radius, 28.0 / 16.0);
        assert!(fit.radius >= bounds.radius());
    }

    #[test]
    fn test_aabb_corners_inside_light_box() {
        let bounds = Aabb::new(Vec3::new(-3.0, 0.5, 0.0), Vec3::new(2.0, 4.0, 1.5));
        for direction in [
            Vec3::new(0.0, -1.0, -1.0),
            Vec3::new(1.0, 0.3, -0.2),
            Vec3::new(0.0, 0.0, -1.0),
        ] {
            let light = DirectionalLight::new(direction, Vec3::new(1.0, 1.0, 1.0), 1.0);
            let fit = fit_shadow_to_aabb(&bounds, &light).unwrap();
            assert_contains(&fit, &bounds.corners());
        }
    }

    #[test]
    fn test_frustum_corners_inside_light_box() {
        let camera = Camera::perspective_looking_at(
            1.0,
            1.5,
            0.1,
            20.0,
            Vec3::new(5.0, 5.0, 3.0),
            Vec3::zeros(),
        );
        let corners = camera.world_frustum_corners().unwrap();
        let fit = fit_shadow_to_frustum(&corners, &DirectionalLight::default());
        assert_contains(&fit, &corners);
    }

    #[test]
    fn test_light_eye_behind_center() {
        let bounds = Aabb::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));
        let light = DirectionalLight::new(Vec3::new(0.0, 0.0, -2.0), Vec3::x(), 1.0);
        let fit = fit_shadow_to_aabb(&bounds, &light).unwrap();
        let eye = fit.camera.position();
        assert_relative_eq!(eye, fit.center + Vec3::new(0.0, 0.0, fit.radius), epsilon = 1e-5);
        assert_relative_eq!(fit.camera.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
        // Straight down: +Z is parallel to the view direction, so +Y is up.
        assert_relative_eq!(fit.camera.up(), Vec3::y(), epsilon = 1e-5);

        let slanted = DirectionalLight::new(Vec3::new(1.0, 0.0, -1.0), Vec3::x(), 1.0);
        let fit = fit_shadow_to_aabb(&bounds, &slanted).unwrap();
        assert!(fit.camera.up().z > 0.0);
        assert!(fit.camera.view.to_homogeneous().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_bounds_rejected() {
        assert!(matches!(
            fit_shadow_to_aabb(&Aabb::default(), &DirectionalLight::default()),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_shadow_map_is_owned() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let renderer = Renderer::new(Arc::clone(&device), RenderWindow::headless(4, 4)).unwrap();
        let config = ShadowPassConfig::default().with_size(64, 64);
        let mut info = ShadowPassInfo::create(&renderer, &config).unwrap();
        assert!(info.depth_pass().owns_depth_texture());
        assert!(info.sampler().is_comparison());
        assert_eq!(info.shadow_map().width(), 64);
        assert_eq!(device.live_texture_count(), 3);

        info.release();
        info.release();
        assert!(info.shadow_map().is_released());
        assert!(!renderer.depth_texture().is_released());
    }
}
