//! Built-in shaders.
//!
//! Sources are stored as `.wgsl` files under `shaders/` and embedded at
//! compile time. Stage files are named `<name>.vert.wgsl` and
//! `<name>.frag.wgsl`; library modules live in `shaders/umbra/` and are
//! pulled in with `#include`.
//!
//! | Include path | Description |
//! |--------------|-------------|
//! | `umbra/math.wgsl` | Constants and small helpers |
//! | `umbra/transforms.wgsl` | Per-draw transform block |
//! | `umbra/lighting.wgsl` | Directional light, material block, Cook-Torrance BRDF |
//! | `umbra/depth.wgsl` | Depth reconstruction and normal encoding |

use crate::error::GraphicsError;

use super::{ShaderComposer, ShaderLoader, ShaderSource, ShaderStage};

// =============================================================================
// Library modules
// =============================================================================

const MATH_MODULE: &str = include_str!("../../shaders/umbra/math.wgsl");
const TRANSFORMS_MODULE: &str = include_str!("../../shaders/umbra/transforms.wgsl");
const LIGHTING_MODULE: &str = include_str!("../../shaders/umbra/lighting.wgsl");
const DEPTH_MODULE: &str = include_str!("../../shaders/umbra/depth.wgsl");

const MODULES: &[(&str, &str)] = &[
    ("umbra/math.wgsl", MATH_MODULE),
    ("umbra/transforms.wgsl", TRANSFORMS_MODULE),
    ("umbra/lighting.wgsl", LIGHTING_MODULE),
    ("umbra/depth.wgsl", DEPTH_MODULE),
];

// =============================================================================
// Stage sources
// =============================================================================

/// Depth-only vertex stage used by depth pre-passes and shadow passes.
pub const DEPTH_ONLY: &str = "depth_only";
/// Lit opaque geometry with shadow and occlusion lookups.
pub const PBR_BASIC: &str = "pbr_basic";
/// Unlit per-vertex color, used for debug geometry.
pub const SOLID_COLOR: &str = "solid_color";
/// View-space normals encoded into two channels.
pub const NORMALS: &str = "normals";
/// Full-viewport triangle.
pub const FULLSCREEN: &str = "fullscreen";
pub const SSAO: &str = "ssao";
pub const SSAO_BLUR: &str = "ssao_blur";
pub const SCREEN_SPACE_SHADOWS: &str = "screen_space_shadows";

const STAGES: &[(&str, ShaderStage, &str)] = &[
    (
        DEPTH_ONLY,
        ShaderStage::Vertex,
        include_str!("../../shaders/depth_only.vert.wgsl"),
    ),
    (
        PBR_BASIC,
        ShaderStage::Vertex,
        include_str!("../../shaders/pbr_basic.vert.wgsl"),
    ),
    (
        PBR_BASIC,
        ShaderStage::Fragment,
        include_str!("../../shaders/pbr_basic.frag.wgsl"),
    ),
    (
        SOLID_COLOR,
        ShaderStage::Vertex,
        include_str!("../../shaders/solid_color.vert.wgsl"),
    ),
    (
        SOLID_COLOR,
        ShaderStage::Fragment,
        include_str!("../../shaders/solid_color.frag.wgsl"),
    ),
    (
        NORMALS,
        ShaderStage::Vertex,
        include_str!("../../shaders/normals.vert.wgsl"),
    ),
    (
        NORMALS,
        ShaderStage::Fragment,
        include_str!("../../shaders/normals.frag.wgsl"),
    ),
    (
        FULLSCREEN,
        ShaderStage::Vertex,
        include_str!("../../shaders/fullscreen.vert.wgsl"),
    ),
    (
        SSAO,
        ShaderStage::Fragment,
        include_str!("../../shaders/ssao.frag.wgsl"),
    ),
    (
        SSAO_BLUR,
        ShaderStage::Fragment,
        include_str!("../../shaders/ssao_blur.frag.wgsl"),
    ),
    (
        SCREEN_SPACE_SHADOWS,
        ShaderStage::Fragment,
        include_str!("../../shaders/screen_space_shadows.frag.wgsl"),
    ),
];

// =============================================================================
// BuiltinShaders
// =============================================================================

/// Loader for the shaders shipped with umbra.
#[derive(Debug, Clone)]
pub struct BuiltinShaders {
    composer: ShaderComposer,
}

impl BuiltinShaders {
    pub fn new() -> Self {
        let mut composer = ShaderComposer::new();
        for (path, source) in MODULES {
            composer.register_include(path, source);
        }
        Self { composer }
    }

    /// Composer preloaded with the `umbra/` library modules.
    pub fn composer(&self) -> &ShaderComposer {
        &self.composer
    }

    /// Every `(name, stage)` pair this loader can provide.
    pub fn stages() -> impl Iterator<Item = (&'static str, ShaderStage)> {
        STAGES.iter().map(|(name, stage, _)| (*name, *stage))
    }
}

impl Default for BuiltinShaders {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLoader for BuiltinShaders {
    fn load(&self, name: &str, stage: ShaderStage) -> Result<ShaderSource, GraphicsError> {
        let (_, _, code) = STAGES
            .iter()
            .find(|(n, s, _)| *n == name && *s == stage)
            .ok_or_else(|| {
                GraphicsError::ShaderError(format!("no built-in {stage:?} shader named '{name}'"))
            })?;
        let code = self.composer.compose(code)?;
        Ok(ShaderSource::wgsl(name, stage, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::reflect;

    #[test]
    fn test_every_builtin_reflects() {
        let loader = BuiltinShaders::new();
        for (name, stage) in BuiltinShaders::stages() {
            let source = loader.load(name, stage).unwrap();
            if let Err(e) = reflect(&source) {
                panic!("{name} ({stage:?}): {e}");
            }
        }
    }

    #[test]
    fn test_depth_only_declares_mvp_block() {
        let source = BuiltinShaders::new()
            .load(DEPTH_ONLY, ShaderStage::Vertex)
            .unwrap();
        let reflection = reflect(&source).unwrap();
        assert_eq!(reflection.uniform(0).unwrap().size, 64);
    }

    #[test]
    fn test_pbr_blocks() {
        let loader = BuiltinShaders::new();
        let vertex = reflect(&loader.load(PBR_BASIC, ShaderStage::Vertex).unwrap()).unwrap();
        assert_eq!(vertex.uniform(0).unwrap().size, 176);
        assert_eq!(vertex.uniform(1).unwrap().size, 64);

        let fragment = reflect(&loader.load(PBR_BASIC, ShaderStage::Fragment).unwrap()).unwrap();
        assert_eq!(fragment.counts.num_uniform_buffers, 3);
        assert_eq!(fragment.counts.num_samplers, 2);
        assert!(fragment.sampler(0).unwrap().comparison);
    }

    #[test]
    fn test_unknown_shader() {
        let result = BuiltinShaders::new().load("missing", ShaderStage::Fragment);
        assert!(matches!(result, Err(GraphicsError::ShaderError(_))));
    }

    #[test]
    fn test_includes_are_expanded() {
        let source = BuiltinShaders::new()
            .load(PBR_BASIC, ShaderStage::Fragment)
            .unwrap();
        assert!(!source.code.contains("#include"));
        assert!(source.code.contains("fn distribution_ggx"));
        assert_eq!(source.code.matches("const PI").count(), 1);
    }
}
