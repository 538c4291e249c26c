//! Resource reflection for WGSL shaders via naga.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, ImageClass, ScalarKind, TypeInner};

use crate::error::GraphicsError;

use super::{ShaderFormat, ShaderSource, ShaderStage};

/// Bind group holding vertex-stage uniforms.
pub const VERTEX_UNIFORM_GROUP: u32 = 0;
/// Bind group holding fragment-stage uniforms.
pub const FRAGMENT_UNIFORM_GROUP: u32 = 1;
/// Bind group holding fragment textures and their samplers.
pub const FRAGMENT_TEXTURE_GROUP: u32 = 2;

/// Number of resources of each kind a shader declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderResourceCounts {
    pub num_uniform_buffers: u32,
    /// Texture and sampler pairs.
    pub num_samplers: u32,
    pub num_storage_buffers: u32,
    pub num_storage_textures: u32,
}

/// A uniform block the shader reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub slot: u32,
    /// Size of the block in bytes, including trailing padding.
    pub size: u32,
}

/// How a sampled texture is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleKind {
    /// Float texture read without filtering.
    Float,
    /// Depth texture.
    Depth,
    Sint,
    Uint,
}

/// A texture plus sampler pair bound at one fragment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSlot {
    pub slot: u32,
    pub sample_kind: TextureSampleKind,
    /// Whether the sampler is a comparison sampler.
    pub comparison: bool,
}

/// Resources declared by one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderReflection {
    pub counts: ShaderResourceCounts,
    /// Uniform blocks sorted by slot.
    pub uniforms: Vec<UniformSlot>,
    /// Texture/sampler pairs sorted by slot.
    pub samplers: Vec<SamplerSlot>,
}

impl ShaderReflection {
    pub fn uniform(&self, slot: u32) -> Option<&UniformSlot> {
        self.uniforms.iter().find(|u| u.slot == slot)
    }

    pub fn sampler(&self, slot: u32) -> Option<&SamplerSlot> {
        self.samplers.iter().find(|s| s.slot == slot)
    }
}

#[derive(Default)]
struct PendingSlot {
    texture: Option<TextureSampleKind>,
    sampler: Option<bool>,
}

/// Parse and validate `source`, and collect the resources it declares.
///
/// # Errors
///
/// Returns [`GraphicsError::ShaderError`] if the source does not parse or
/// validate, lacks the requested entry point, or binds a resource outside
/// the group layout described in the [module docs](super).
pub fn reflect(source: &ShaderSource) -> Result<ShaderReflection, GraphicsError> {
    if source.format != ShaderFormat::WGSL {
        return Err(GraphicsError::FeatureNotSupported(format!(
            "shader '{}': only WGSL sources can be reflected",
            source.name
        )));
    }

    let module = naga::front::wgsl::parse_str(&source.code).map_err(|e| {
        GraphicsError::ShaderError(format!(
            "'{}': {}",
            source.name,
            e.emit_to_string(&source.code)
        ))
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| GraphicsError::ShaderError(format!("'{}': {e}", source.name)))?;

    let wanted = match source.stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == source.entry_point && ep.stage == wanted)
    {
        return Err(GraphicsError::ShaderError(format!(
            "'{}': no {:?} entry point named '{}'",
            source.name, source.stage, source.entry_point
        )));
    }

    let uniform_group = match source.stage {
        ShaderStage::Vertex => VERTEX_UNIFORM_GROUP,
        ShaderStage::Fragment => FRAGMENT_UNIFORM_GROUP,
    };

    let mut reflection = ShaderReflection::default();
    let mut pending: std::collections::BTreeMap<u32, PendingSlot> = Default::default();

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        let name = var.name.as_deref().unwrap_or("<unnamed>");
        let misplaced = || {
            GraphicsError::ShaderError(format!(
                "'{}': resource '{name}' at @group({}) @binding({}) breaks the {:?} layout",
                source.name, binding.group, binding.binding, source.stage
            ))
        };
        let inner = &module.types[var.ty].inner;

        match var.space {
            AddressSpace::Uniform => {
                if binding.group != uniform_group {
                    return Err(misplaced());
                }
                reflection.uniforms.push(UniformSlot {
                    slot: binding.binding,
                    size: inner.size(module.to_ctx()),
                });
                reflection.counts.num_uniform_buffers += 1;
            }
            AddressSpace::Storage { .. } => {
                reflection.counts.num_storage_buffers += 1;
            }
            AddressSpace::Handle => {
                if source.stage != ShaderStage::Fragment || binding.group != FRAGMENT_TEXTURE_GROUP
                {
                    return Err(misplaced());
                }
                let slot = pending.entry(binding.binding / 2).or_default();
                match inner {
                    TypeInner::Image {
                        class: ImageClass::Storage { .. },
                        ..
                    } => {
                        reflection.counts.num_storage_textures += 1;
                    }
                    TypeInner::Image { class, .. } if binding.binding % 2 == 0 => {
                        slot.texture = Some(match class {
                            ImageClass::Depth { .. } => TextureSampleKind::Depth,
                            ImageClass::Sampled {
                                kind: ScalarKind::Sint,
                                ..
                            } => TextureSampleKind::Sint,
                            ImageClass::Sampled {
                                kind: ScalarKind::Uint,
                                ..
                            } => TextureSampleKind::Uint,
                            ImageClass::Sampled { .. } => TextureSampleKind::Float,
                            _ => return Err(misplaced()),
                        });
                    }
                    TypeInner::Sampler { comparison } if binding.binding % 2 == 1 => {
                        slot.sampler = Some(*comparison);
                    }
                    _ => return Err(misplaced()),
                }
            }
            _ => {}
        }
    }

    for (slot, entry) in pending {
        match (entry.texture, entry.sampler) {
            (Some(sample_kind), Some(comparison)) => {
                if comparison && sample_kind != TextureSampleKind::Depth {
                    return Err(GraphicsError::ShaderError(format!(
                        "'{}': comparison sampler at slot {slot} must pair with a depth texture",
                        source.name
                    )));
                }
                reflection.samplers.push(SamplerSlot {
                    slot,
                    sample_kind,
                    comparison,
                });
            }
            (None, None) => {}
            _ => {
                return Err(GraphicsError::ShaderError(format!(
                    "'{}': fragment slot {slot} needs a texture at binding {} and a sampler at {}",
                    source.name,
                    2 * slot,
                    2 * slot + 1
                )));
            }
        }
    }
    reflection.counts.num_samplers = reflection.samplers.len() as u32;
    reflection.uniforms.sort_by_key(|u| u.slot);

    Ok(reflection)
}
