//! Type conversions between umbra types and wgpu types.

use umbra_core::mesh::{PrimitiveTopology, VertexElementFormat, VertexStepMode};

use crate::types::{
    AddressMode, BlendState, BufferUsage, Color, CompareFunction, CullMode, FilterMode, FrontFace,
    LoadOp, StoreOp, TextureFormat, TextureUsage,
};

/// Convert BufferUsage flags to wgpu buffer usages.
pub fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::MAP_READ) {
        result |= wgpu::BufferUsages::MAP_READ;
    }
    if usage.contains(BufferUsage::MAP_WRITE) {
        result |= wgpu::BufferUsages::MAP_WRITE;
    }

    result
}

/// Convert TextureFormat to wgpu format.
pub fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,

        TextureFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        TextureFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Depth32FloatStencil8 => wgpu::TextureFormat::Depth32FloatStencil8,
    }
}

/// Convert a wgpu surface format back to an umbra format.
///
/// Returns `None` for formats umbra does not render to.
pub fn texture_format_from_wgpu(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    Some(match format {
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
        _ => return None,
    })
}

/// Convert TextureUsage flags to wgpu texture usages.
pub fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        result |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }

    result
}

/// Convert AddressMode to wgpu address mode.
pub fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Convert FilterMode to wgpu filter mode.
pub fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Convert FilterMode to wgpu mipmap filter mode.
pub fn convert_mipmap_filter_mode(mode: FilterMode) -> wgpu::MipmapFilterMode {
    match mode {
        FilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
        FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

/// Convert CompareFunction to wgpu compare function.
pub fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

/// Convert a color load op. wgpu has no "don't care", so it loads instead.
pub fn convert_color_load_op(op: LoadOp<Color>) -> wgpu::LoadOp<wgpu::Color> {
    match op {
        LoadOp::Clear(color) => wgpu::LoadOp::Clear(wgpu::Color {
            r: color.r,
            g: color.g,
            b: color.b,
            a: color.a,
        }),
        LoadOp::Load | LoadOp::DontCare => wgpu::LoadOp::Load,
    }
}

/// Convert a depth load op.
pub fn convert_depth_load_op(op: LoadOp<f32>) -> wgpu::LoadOp<f32> {
    match op {
        LoadOp::Clear(depth) => wgpu::LoadOp::Clear(depth),
        LoadOp::Load | LoadOp::DontCare => wgpu::LoadOp::Load,
    }
}

/// Convert StoreOp to wgpu store op.
pub fn convert_store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::Discard => wgpu::StoreOp::Discard,
    }
}

/// Convert VertexElementFormat to wgpu vertex format.
pub fn convert_vertex_format(format: VertexElementFormat) -> wgpu::VertexFormat {
    match format {
        VertexElementFormat::Float => wgpu::VertexFormat::Float32,
        VertexElementFormat::Float2 => wgpu::VertexFormat::Float32x2,
        VertexElementFormat::Float3 => wgpu::VertexFormat::Float32x3,
        VertexElementFormat::Float4 => wgpu::VertexFormat::Float32x4,
        VertexElementFormat::Uint => wgpu::VertexFormat::Uint32,
        VertexElementFormat::Uint2 => wgpu::VertexFormat::Uint32x2,
        VertexElementFormat::Uint3 => wgpu::VertexFormat::Uint32x3,
        VertexElementFormat::Uint4 => wgpu::VertexFormat::Uint32x4,
        VertexElementFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
        VertexElementFormat::Snorm8x4 => wgpu::VertexFormat::Snorm8x4,
        VertexElementFormat::Half2 => wgpu::VertexFormat::Float16x2,
        VertexElementFormat::Half4 => wgpu::VertexFormat::Float16x4,
    }
}

/// Convert PrimitiveTopology to wgpu primitive topology.
pub fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

/// Convert VertexStepMode to wgpu vertex step mode.
pub fn convert_step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub fn convert_cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub fn convert_front_face(face: FrontFace) -> wgpu::FrontFace {
    match face {
        FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
        FrontFace::Clockwise => wgpu::FrontFace::Cw,
    }
}

/// Convert BlendState to wgpu blend state.
pub fn convert_blend_state(blend: BlendState) -> wgpu::BlendState {
    match blend {
        BlendState::Replace => wgpu::BlendState::REPLACE,
        BlendState::AlphaBlending => wgpu::BlendState::ALPHA_BLENDING,
        BlendState::PremultipliedAlpha => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_format_round_trip() {
        for format in [TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgba8Unorm] {
            assert_eq!(
                texture_format_from_wgpu(convert_texture_format(format)),
                Some(format)
            );
        }
        assert_eq!(texture_format_from_wgpu(wgpu::TextureFormat::R8Uint), None);
    }

    #[test]
    fn test_dont_care_loads() {
        assert_eq!(convert_depth_load_op(LoadOp::DontCare), wgpu::LoadOp::Load);
        assert_eq!(convert_depth_load_op(LoadOp::Clear(1.0)), wgpu::LoadOp::Clear(1.0));
    }
}
