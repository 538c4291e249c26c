//! Shaders: sources, loading, `#include` composition and reflection.
//!
//! Shaders are written in WGSL, one file per stage. Resource bindings follow
//! a fixed convention so a pipeline layout can be derived from reflection
//! alone:
//!
//! | Stage    | Resource         | Group | Binding        |
//! |----------|------------------|-------|----------------|
//! | vertex   | uniform slot `n` | 0     | `n`            |
//! | fragment | uniform slot `n` | 1     | `n`            |
//! | fragment | texture slot `n` | 2     | `2n`           |
//! | fragment | sampler slot `n` | 2     | `2n + 1`       |
//!
//! Uniform data is pushed per draw through
//! [`RenderPass::push_vertex_uniform`](crate::RenderPass::push_vertex_uniform)
//! and [`RenderPass::push_fragment_uniform`](crate::RenderPass::push_fragment_uniform).

mod composer;
pub mod library;
mod reflect;

use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::GpuShader;
use crate::device::Device;
use crate::error::GraphicsError;

pub use composer::ShaderComposer;
pub use library::BuiltinShaders;
pub use reflect::{
    FRAGMENT_TEXTURE_GROUP, FRAGMENT_UNIFORM_GROUP, SamplerSlot, ShaderReflection,
    ShaderResourceCounts, TextureSampleKind, UniformSlot, VERTEX_UNIFORM_GROUP, reflect,
};

bitflags! {
    /// Shader source formats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderFormat: u32 {
        /// WebGPU shading language source.
        const WGSL = 1 << 0;
        /// SPIR-V binary.
        const SPIRV = 1 << 1;
    }
}

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Entry point name used when none is given.
    pub fn default_entry_point(self) -> &'static str {
        match self {
            Self::Vertex => "vs_main",
            Self::Fragment => "fs_main",
        }
    }
}

/// Source of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    /// Logical name, used in diagnostics.
    pub name: String,
    pub stage: ShaderStage,
    pub format: ShaderFormat,
    pub code: String,
    pub entry_point: String,
}

impl ShaderSource {
    /// WGSL source with the stage's default entry point.
    pub fn wgsl(name: impl Into<String>, stage: ShaderStage, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage,
            format: ShaderFormat::WGSL,
            code: code.into(),
            entry_point: stage.default_entry_point().to_string(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }
}

struct ShaderInner {
    source: ShaderSource,
    reflection: ShaderReflection,
    gpu: GpuShader,
}

/// A compiled shader stage plus its reflected resource usage.
///
/// Created by [`Device::create_shader`]; cheap to clone.
#[derive(Clone)]
pub struct Shader {
    inner: Arc<ShaderInner>,
}

impl Shader {
    pub(crate) fn new(source: ShaderSource, reflection: ShaderReflection, gpu: GpuShader) -> Self {
        Self {
            inner: Arc::new(ShaderInner {
                source,
                reflection,
                gpu,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.source.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.inner.source.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.inner.source.entry_point
    }

    pub fn source(&self) -> &ShaderSource {
        &self.inner.source
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.inner.reflection
    }

    /// Declared resource counts.
    pub fn resource_counts(&self) -> ShaderResourceCounts {
        self.inner.reflection.counts
    }

    pub fn gpu(&self) -> &GpuShader {
        &self.inner.gpu
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.inner.source.name)
            .field("stage", &self.inner.source.stage)
            .field("counts", &self.inner.reflection.counts)
            .finish()
    }
}

/// Supplies shader sources by logical name.
pub trait ShaderLoader {
    /// Source of shader `name` for `stage`.
    fn load(&self, name: &str, stage: ShaderStage) -> Result<ShaderSource, GraphicsError>;
}

/// Load shader `name` through `loader` and compile it on `device`.
pub fn load_shader(
    device: &Device,
    loader: &dyn ShaderLoader,
    name: &str,
    stage: ShaderStage,
) -> Result<Shader, GraphicsError> {
    device.create_shader(loader.load(name, stage)?)
}
