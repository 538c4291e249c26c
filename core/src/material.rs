//! Material parameters shared by loaders and the renderer.

use crate::math::Vec4;

/// PBR material for the metallic-roughness workflow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbrMaterialData {
    pub base_color: Vec4,
    pub metalness: f32,
    pub roughness: f32,
    /// Ambient occlusion factor.
    pub ao: f32,
}

impl Default for PbrMaterialData {
    fn default() -> Self {
        Self {
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            metalness: 0.0,
            roughness: 1.0,
            ao: 1.0,
        }
    }
}

impl PbrMaterialData {
    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metalness(mut self, metalness: f32) -> Self {
        self.metalness = metalness;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }
}
