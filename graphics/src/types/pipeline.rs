//! Fixed-function pipeline state.

use super::{CompareFunction, TextureFormat};

/// Which triangle faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Winding order of front-facing triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

/// Constant and slope-scaled depth bias.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale: f32,
    pub clamp: f32,
}

impl DepthBias {
    pub fn is_enabled(&self) -> bool {
        self.constant != 0 || self.slope_scale != 0.0
    }
}

/// Rasterizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: DepthBias,
}

/// Depth test and write configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

impl DepthStencilState {
    /// Depth test with `compare` and writes enabled.
    pub fn new(format: TextureFormat, compare: CompareFunction) -> Self {
        Self {
            format,
            depth_write_enabled: true,
            depth_compare: compare,
        }
    }

    pub fn with_depth_write(mut self, enabled: bool) -> Self {
        self.depth_write_enabled = enabled;
        self
    }
}

/// Color blending for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendState {
    /// Source replaces destination.
    #[default]
    Replace,
    /// Straight alpha blending.
    AlphaBlending,
    /// Premultiplied alpha blending.
    PremultipliedAlpha,
}

/// One color target of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetDescription {
    pub format: TextureFormat,
    pub blend: BlendState,
}

impl ColorTargetDescription {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            blend: BlendState::Replace,
        }
    }

    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }
}
