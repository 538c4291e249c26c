//! Screen-space post-effects.
//!
//! Each effect samples the shared depth texture (and for SSAO the normal
//! G-buffer) and renders a full-viewport triangle into its own `R32Float`
//! targets. The sampled textures are never attached to the effect's passes.

pub mod screen_space_shadows;
pub mod ssao;

use std::sync::Arc;

pub use screen_space_shadows::{ScreenSpaceShadowConfig, ScreenSpaceShadowPass};
pub use ssao::{SsaoConfig, SsaoPass, generate_ssao_kernel, generate_ssao_noise};

use crate::command::RenderPass;
use crate::device::Device;
use crate::error::GraphicsError;
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDescriptor};
use crate::resources::{Sampler, Texture};
use crate::shader::{BuiltinShaders, ShaderStage, library, load_shader};
use crate::types::{
    AddressMode, ColorTargetDescription, SamplerDescriptor, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Format of every effect output.
pub const EFFECT_TARGET_FORMAT: TextureFormat = TextureFormat::R32Float;

/// Pipeline drawing [`library::FULLSCREEN`] with fragment stage `fragment`
/// into one `format` target.
pub(crate) fn create_fullscreen_pipeline(
    device: &Arc<Device>,
    fragment: &str,
    format: TextureFormat,
    label: &str,
) -> Result<GraphicsPipeline, GraphicsError> {
    let shaders = BuiltinShaders::new();
    let vertex = load_shader(device, &shaders, library::FULLSCREEN, ShaderStage::Vertex)?;
    let fragment = load_shader(device, &shaders, fragment, ShaderStage::Fragment)?;
    device.create_pipeline(
        &GraphicsPipelineDescriptor::new(vertex)
            .with_label(label)
            .with_fragment_shader(fragment)
            .with_color_target(ColorTargetDescription::new(format)),
    )
}

/// Draw the full-viewport triangle. No vertex buffers are bound.
pub(crate) fn draw_fullscreen(pass: &mut RenderPass<'_>) {
    pass.draw(3, 1, 0, 0);
}

/// A sampleable color target sized to the viewport.
pub(crate) fn create_effect_target(
    device: &Arc<Device>,
    width: u32,
    height: u32,
    label: &str,
) -> Result<Texture, GraphicsError> {
    device.create_texture(
        &TextureDescriptor::new_2d(
            width,
            height,
            EFFECT_TARGET_FORMAT,
            TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        )
        .with_label(label),
    )
}

/// Nearest, clamped sampler for depth and float inputs.
pub(crate) fn create_nearest_sampler(
    device: &Device,
    label: &str,
) -> Result<Sampler, GraphicsError> {
    device.create_sampler(
        &SamplerDescriptor::nearest()
            .with_label(label)
            .with_address_mode(AddressMode::ClampToEdge),
    )
}
