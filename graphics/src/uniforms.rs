//! Uniform block layouts shared with the built-in shaders.
//!
//! Every struct here is `#[repr(C)]` and byte-for-byte identical to the WGSL
//! struct of the same purpose: column-major 4x4 matrices, 3x3 matrices stored
//! as three 16-byte columns and 3-vectors padded to 16 bytes.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use umbra_core::material::PbrMaterialData;
use umbra_core::math::{
    Mat4, Vec3, mat3_to_padded_cols, mat4_to_cols_array_2d, normal_matrix,
};

/// Per-draw transform block (`TransformUniforms` in `umbra/transforms.wgsl`).
///
/// `mvp` leads the block. Depth-only passes push [`DepthUniforms`] built from
/// the same value, so both passes rasterize identical clip positions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformUniforms {
    pub mvp: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
}

const_assert_eq!(std::mem::size_of::<TransformUniforms>(), 176);

impl TransformUniforms {
    /// Compute every matrix for a drawable with world transform `model`.
    ///
    /// `view_proj` must be the camera's `P * V`; the MVP is `view_proj * model`.
    pub fn new(view_proj: &Mat4, view: &Mat4, model: &Mat4) -> Self {
        let mvp = view_proj * model;
        let model_view = view * model;
        Self {
            mvp: mat4_to_cols_array_2d(&mvp),
            model_view: mat4_to_cols_array_2d(&model_view),
            normal: mat3_to_padded_cols(&normal_matrix(&model_view)),
        }
    }
}

/// MVP-only block read by `depth_only.vert.wgsl` and `solid_color.vert.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DepthUniforms {
    pub mvp: [[f32; 4]; 4],
}

const_assert_eq!(std::mem::size_of::<DepthUniforms>(), 64);

impl DepthUniforms {
    pub fn from_mvp(mvp: &Mat4) -> Self {
        Self {
            mvp: mat4_to_cols_array_2d(mvp),
        }
    }
}

impl From<&TransformUniforms> for DepthUniforms {
    fn from(transform: &TransformUniforms) -> Self {
        Self { mvp: transform.mvp }
    }
}

/// Light-space MVP used for shadow lookups.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightSpaceUniforms {
    pub mvp: [[f32; 4]; 4],
}

const_assert_eq!(std::mem::size_of::<LightSpaceUniforms>(), 64);

impl LightSpaceUniforms {
    pub fn new(light_view_proj: &Mat4, model: &Mat4) -> Self {
        Self {
            mvp: mat4_to_cols_array_2d(&(light_view_proj * model)),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
    pub ao: f32,
    pub _pad: f32,
}

const_assert_eq!(std::mem::size_of::<MaterialUniforms>(), 32);

impl From<&PbrMaterialData> for MaterialUniforms {
    fn from(material: &PbrMaterialData) -> Self {
        Self {
            base_color: material.base_color.into(),
            metalness: material.metalness,
            roughness: material.roughness,
            ao: material.ao,
            _pad: 0.0,
        }
    }
}

/// Directional light in view space.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightUniforms {
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub _pad: f32,
}

const_assert_eq!(std::mem::size_of::<DirectionalLightUniforms>(), 32);

impl DirectionalLightUniforms {
    pub fn new(view_direction: &Vec3, color: &Vec3, intensity: f32) -> Self {
        Self {
            direction: view_direction.normalize().into(),
            intensity,
            color: (*color).into(),
            _pad: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameParams {
    pub viewport_size: [f32; 2],
    pub use_shadows: u32,
    pub use_ssao: u32,
}

const_assert_eq!(std::mem::size_of::<FrameParams>(), 16);

/// Color multiplier for debug geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TintUniforms {
    pub color: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<TintUniforms>(), 16);

impl Default for TintUniforms {
    fn default() -> Self {
        Self { color: [1.0; 4] }
    }
}

/// Number of hemisphere samples in the SSAO kernel.
pub const SSAO_KERNEL_SIZE: usize = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SsaoParams {
    pub projection: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub kernel: [[f32; 4]; SSAO_KERNEL_SIZE],
    pub noise_scale: [f32; 2],
    pub radius: f32,
    pub bias: f32,
}

const_assert_eq!(std::mem::size_of::<SsaoParams>(), 1168);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlurParams {
    pub direction: [f32; 2],
    pub texel_size: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<BlurParams>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ScreenSpaceShadowParams {
    pub projection: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub to_light: [f32; 3],
    pub max_dist: f32,
    pub step_size: f32,
    pub num_steps: u32,
    pub bias: f32,
    pub _pad: f32,
}

const_assert_eq!(std::mem::size_of::<ScreenSpaceShadowParams>(), 160);

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use umbra_core::math::{Isometry3, Vec3, perspective_rh};

    use super::*;
    use crate::shader::library::{
        BuiltinShaders, DEPTH_ONLY, PBR_BASIC, SCREEN_SPACE_SHADOWS, SOLID_COLOR, SSAO, SSAO_BLUR,
    };
    use crate::shader::{ShaderLoader, ShaderStage, reflect};

    fn block_size(name: &str, stage: ShaderStage, slot: u32) -> usize {
        let source = BuiltinShaders::new().load(name, stage).unwrap();
        reflect(&source).unwrap().uniform(slot).unwrap().size as usize
    }

    #[test]
    fn test_sizes_match_shader_blocks() {
        use std::mem::size_of;
        use ShaderStage::{Fragment, Vertex};

        assert_eq!(block_size(DEPTH_ONLY, Vertex, 0), size_of::<DepthUniforms>());
        assert_eq!(block_size(PBR_BASIC, Vertex, 0), size_of::<TransformUniforms>());
        assert_eq!(block_size(PBR_BASIC, Vertex, 1), size_of::<LightSpaceUniforms>());
        assert_eq!(block_size(PBR_BASIC, Fragment, 0), size_of::<MaterialUniforms>());
        assert_eq!(block_size(PBR_BASIC, Fragment, 1), size_of::<DirectionalLightUniforms>());
        assert_eq!(block_size(PBR_BASIC, Fragment, 2), size_of::<FrameParams>());
        assert_eq!(block_size(SOLID_COLOR, Vertex, 0), size_of::<DepthUniforms>());
        assert_eq!(block_size(SOLID_COLOR, Fragment, 0), size_of::<TintUniforms>());
        assert_eq!(block_size(SSAO, Fragment, 0), size_of::<SsaoParams>());
        assert_eq!(block_size(SSAO_BLUR, Fragment, 0), size_of::<BlurParams>());
        assert_eq!(
            block_size(SCREEN_SPACE_SHADOWS, Fragment, 0),
            size_of::<ScreenSpaceShadowParams>()
        );
    }

    #[test]
    fn test_depth_block_reuses_transform_mvp() {
        let projection = perspective_rh(1.0, 1.5, 0.1, 50.0);
        let view = Isometry3::translation(0.0, 0.0, -5.0).to_homogeneous();
        let model = Isometry3::translation(1.0, 2.0, 3.0).to_homogeneous();
        let transform = TransformUniforms::new(&(projection * view), &view, &model);
        let depth = DepthUniforms::from(&transform);
        assert_eq!(bytemuck::bytes_of(&depth), &bytemuck::bytes_of(&transform)[..64]);
    }

    #[test]
    fn test_normal_matrix_of_rotation_is_rotation() {
        let view = Mat4::identity();
        let model = Isometry3::rotation(Vec3::new(0.0, 0.0, 0.7)).to_homogeneous();
        let transform = TransformUniforms::new(&view, &view, &model);
        for (c, column) in transform.normal.iter().enumerate() {
            for r in 0..3 {
                assert_relative_eq!(column[r], model[(r, c)], epsilon = 1e-6);
            }
            assert_eq!(column[3], 0.0);
        }
    }
}
