//! Screen-space contact shadows.
//!
//! For each pixel the view-space position is rebuilt from depth and a ray is
//! marched towards the light; a hit in the depth buffer darkens the pixel.

use std::sync::Arc;

use umbra_core::camera::Camera;
use umbra_core::light::DirectionalLight;
use umbra_core::math::{Mat4, Vec3, mat4_to_cols_array_2d};

use crate::command::{ColorAttachment, CommandBuffer, RenderPassDescriptor};
use crate::device::Device;
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipeline;
use crate::resources::{Sampler, Texture, TextureRef};
use crate::shader::library;
use crate::types::Color;
use crate::uniforms::ScreenSpaceShadowParams;

use super::{
    EFFECT_TARGET_FORMAT, create_effect_target, create_fullscreen_pipeline, create_nearest_sampler,
    draw_fullscreen,
};

/// Ray-march parameters, in view-space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSpaceShadowConfig {
    pub max_dist: f32,
    pub step_size: f32,
    pub num_steps: u32,
    pub bias: f32,
}

impl Default for ScreenSpaceShadowConfig {
    fn default() -> Self {
        Self {
            max_dist: 1.0,
            step_size: 0.1,
            num_steps: 16,
            bias: 0.05,
        }
    }
}

impl ScreenSpaceShadowConfig {
    pub fn with_max_dist(mut self, max_dist: f32) -> Self {
        self.max_dist = max_dist;
        self
    }

    pub fn with_steps(mut self, num_steps: u32, step_size: f32) -> Self {
        self.num_steps = num_steps;
        self.step_size = step_size;
        self
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }
}

#[derive(Debug)]
pub struct ScreenSpaceShadowPass {
    device: Arc<Device>,
    config: ScreenSpaceShadowConfig,
    pipeline: GraphicsPipeline,
    sampler: Sampler,
    target: Texture,
}

impl ScreenSpaceShadowPass {
    pub fn new(
        device: &Arc<Device>,
        width: u32,
        height: u32,
        config: ScreenSpaceShadowConfig,
    ) -> Result<Self, GraphicsError> {
        let pipeline = create_fullscreen_pipeline(
            device,
            library::SCREEN_SPACE_SHADOWS,
            EFFECT_TARGET_FORMAT,
            "screen-space shadows",
        )?;
        let sampler = create_nearest_sampler(device, "screen-space shadow depth sampler")?;
        let target = create_effect_target(device, width, height, "screen-space shadow map")?;
        Ok(Self {
            device: Arc::clone(device),
            config,
            pipeline,
            sampler,
            target,
        })
    }

    pub fn config(&self) -> &ScreenSpaceShadowConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ScreenSpaceShadowConfig) {
        self.config = config;
    }

    /// Visibility map, 1 where lit.
    pub fn shadow_map(&self) -> TextureRef {
        self.target.share()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.width(), self.target.height())
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        if self.size() == (width, height) && !self.target.is_released() {
            return Ok(());
        }
        self.target = create_effect_target(&self.device, width, height, "screen-space shadow map")?;
        Ok(())
    }

    /// Uniform block for `camera` and `light`.
    pub fn params(&self, camera: &Camera, light: &DirectionalLight) -> ScreenSpaceShadowParams {
        let to_light: Vec3 = -camera.transform_vector(&light.normalized_direction());
        ScreenSpaceShadowParams {
            projection: mat4_to_cols_array_2d(&camera.projection),
            inv_projection: mat4_to_cols_array_2d(
                &camera.projection.try_inverse().unwrap_or_else(Mat4::identity),
            ),
            to_light: to_light.into(),
            max_dist: self.config.max_dist,
            step_size: self.config.step_size,
            num_steps: self.config.num_steps,
            bias: self.config.bias,
            _pad: 0.0,
        }
    }

    /// Record the ray-march pass. `depth` is only sampled.
    pub fn render(
        &self,
        cmd: &mut CommandBuffer,
        camera: &Camera,
        light: &DirectionalLight,
        depth: &TextureRef,
    ) -> Result<(), GraphicsError> {
        let params = self.params(camera, light);
        let mut pass = cmd.begin_render_pass(
            RenderPassDescriptor::new()
                .with_label("screen-space shadows")
                .with_color_attachment(ColorAttachment::clear(self.target.share(), Color::WHITE)),
        )?;
        pass.bind_pipeline(&self.pipeline);
        pass.push_fragment_uniform(0, &params);
        pass.bind_fragment_sampler(0, depth, &self.sampler);
        draw_fullscreen(&mut pass);
        Ok(())
    }

    pub fn release(&mut self) {
        self.target.release();
    }
}
