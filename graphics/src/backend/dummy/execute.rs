//! Command interpretation for the dummy backend.

use std::collections::HashMap;

use umbra_core::math::{Mat4, Vec3, Vec4};
use umbra_core::mesh::{PrimitiveTopology, VertexAttrib, VertexElementFormat};

use crate::command::{Command, DrawArgs, DrawIndexedArgs, RenderPassDescriptor};
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipeline;
use crate::resources::{BufferRef, TextureRef};
use crate::shader::ShaderStage;
use crate::types::{Color, LoadOp, TextureFormat, Viewport};

use super::raster::{DepthTarget, RasterState, rasterize_triangle};
use super::{DummyTexture, dummy_buffer, dummy_texture};

/// State of the render pass being executed.
struct PassState {
    descriptor: RenderPassDescriptor,
    pipeline: Option<GraphicsPipeline>,
    viewport: Option<Viewport>,
    vertex_buffers: HashMap<u32, (BufferRef, u64)>,
    index_buffer: Option<(BufferRef, u64)>,
}

pub(super) fn execute(commands: &[Command]) -> Result<(), GraphicsError> {
    // Pushed uniform data persists for the whole submission.
    let mut uniforms: HashMap<(ShaderStage, u32), Vec<u8>> = HashMap::new();
    let mut pass: Option<PassState> = None;

    for command in commands {
        match command {
            Command::BeginRenderPass(descriptor) => {
                begin_render_pass(descriptor)?;
                pass = Some(PassState {
                    descriptor: descriptor.clone(),
                    pipeline: None,
                    viewport: None,
                    vertex_buffers: HashMap::new(),
                    index_buffer: None,
                });
            }
            Command::EndRenderPass => pass = None,
            Command::BeginCopyPass | Command::EndCopyPass => {}
            Command::SetPipeline(pipeline) => {
                if let Some(pass) = pass.as_mut() {
                    pass.pipeline = Some(pipeline.clone());
                }
            }
            Command::SetViewport(viewport) => {
                if let Some(pass) = pass.as_mut() {
                    pass.viewport = Some(*viewport);
                }
            }
            Command::SetVertexBuffer {
                slot,
                buffer,
                offset,
            } => {
                if let Some(pass) = pass.as_mut() {
                    pass.vertex_buffers.insert(*slot, (buffer.clone(), *offset));
                }
            }
            Command::SetIndexBuffer { buffer, offset } => {
                if let Some(pass) = pass.as_mut() {
                    pass.index_buffer = Some((buffer.clone(), *offset));
                }
            }
            Command::PushUniform { stage, slot, data } => {
                uniforms.insert((*stage, *slot), data.clone());
            }
            Command::BindFragmentSampler { .. } => {}
            Command::Draw(args) => {
                if let Some(pass) = pass.as_ref() {
                    draw(pass, &uniforms, Indices::Direct(args))?;
                }
            }
            Command::DrawIndexed(args) => {
                if let Some(pass) = pass.as_ref() {
                    draw(pass, &uniforms, Indices::Indexed(args))?;
                }
            }
            Command::UploadToBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            }
            | Command::DownloadFromBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => copy_buffer(source, *source_offset, destination, *destination_offset, *size)?,
            Command::UploadToTexture {
                source,
                source_offset,
                bytes_per_row,
                destination,
            } => copy_buffer_to_texture(source, *source_offset, *bytes_per_row, destination)?,
            Command::DownloadFromTexture {
                source,
                destination,
                destination_offset,
                bytes_per_row,
            } => copy_texture_to_buffer(source, destination, *destination_offset, *bytes_per_row)?,
        }
    }
    Ok(())
}

fn begin_render_pass(descriptor: &RenderPassDescriptor) -> Result<(), GraphicsError> {
    for attachment in &descriptor.color_attachments {
        if let LoadOp::Clear(color) = attachment.load {
            let texture = dummy_texture(attachment.texture.gpu())?;
            let texel = color_texel(texture.descriptor().format, color);
            for chunk in texture.data().chunks_exact_mut(texel.len()) {
                chunk.copy_from_slice(&texel);
            }
        }
    }
    if let Some(depth) = &descriptor.depth_attachment
        && let LoadOp::Clear(value) = depth.load
    {
        let texture = dummy_texture(depth.texture.gpu())?;
        for chunk in texture.data().chunks_exact_mut(4) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }
    Ok(())
}

/// Encode a clear color in the storage layout of `format`.
fn color_texel(format: TextureFormat, color: Color) -> Vec<u8> {
    let unorm = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let rgba = [color.r, color.g, color.b, color.a];
    match format {
        TextureFormat::R8Unorm => vec![unorm(color.r)],
        TextureFormat::R32Float => (color.r as f32).to_le_bytes().to_vec(),
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => rgba.map(unorm).to_vec(),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
            vec![unorm(color.b), unorm(color.g), unorm(color.r), unorm(color.a)]
        }
        TextureFormat::Rg16Float => [color.r, color.g]
            .iter()
            .flat_map(|&v| half::f16::from_f64(v).to_le_bytes())
            .collect(),
        TextureFormat::Rgba16Float => rgba
            .iter()
            .flat_map(|&v| half::f16::from_f64(v).to_le_bytes())
            .collect(),
        TextureFormat::Rgba32Float => rgba
            .iter()
            .flat_map(|&v| (v as f32).to_le_bytes())
            .collect(),
        _ => vec![0; DummyTexture::stored_texel_size(format) as usize],
    }
}

enum Indices<'a> {
    Direct(&'a DrawArgs),
    Indexed(&'a DrawIndexedArgs),
}

fn draw(
    pass: &PassState,
    uniforms: &HashMap<(ShaderStage, u32), Vec<u8>>,
    indices: Indices<'_>,
) -> Result<(), GraphicsError> {
    let Some(pipeline) = pass.pipeline.as_ref() else {
        return Err(GraphicsError::InvalidState(
            "draw without a bound pipeline".to_string(),
        ));
    };
    let desc = pipeline.descriptor();
    let (Some(depth_state), Some(depth)) = (desc.depth_stencil, &pass.descriptor.depth_attachment)
    else {
        log::trace!("DummyBackend: skipping draw without a depth attachment");
        return Ok(());
    };
    if !desc.color_targets.is_empty() {
        log::trace!("DummyBackend: skipping draw into color targets");
        return Ok(());
    }
    if !matches!(
        desc.primitive_topology,
        PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip
    ) {
        log::trace!("DummyBackend: skipping non-triangle draw");
        return Ok(());
    }

    let vertex_input = &desc.vertex_input;
    let Some(position) = vertex_input
        .attributes
        .iter()
        .find(|a| a.location == VertexAttrib::Position.location())
    else {
        return Err(GraphicsError::InvalidState(
            "depth-only pipeline has no position attribute".to_string(),
        ));
    };
    if position.format != VertexElementFormat::Float3 {
        return Err(GraphicsError::InvalidState(format!(
            "software rasterizer expects Float3 positions, got {:?}",
            position.format
        )));
    }
    let stride = vertex_input
        .bindings
        .iter()
        .find(|b| b.slot == position.binding)
        .map_or(0, |b| b.stride) as usize;
    let Some((vertex_buffer, vertex_offset)) = pass.vertex_buffers.get(&position.binding) else {
        return Err(GraphicsError::InvalidState(format!(
            "no vertex buffer bound at slot {}",
            position.binding
        )));
    };
    let vertex_bytes = dummy_buffer(vertex_buffer.gpu())?.snapshot();

    let mvp = uniforms
        .get(&(ShaderStage::Vertex, 0))
        .filter(|data| data.len() >= 64)
        .map(|data| Mat4::from_column_slice(&bytemuck::pod_collect_to_vec::<u8, f32>(&data[..64])))
        .unwrap_or_else(Mat4::identity);

    let vertex_ids: Vec<i64> = match indices {
        Indices::Direct(args) => (0..args.vertex_count)
            .map(|i| (args.first_vertex + i) as i64)
            .collect(),
        Indices::Indexed(args) => {
            let Some((index_buffer, index_offset)) = pass.index_buffer.as_ref() else {
                return Err(GraphicsError::InvalidState(
                    "indexed draw without an index buffer".to_string(),
                ));
            };
            let index_bytes = dummy_buffer(index_buffer.gpu())?.snapshot();
            let start = *index_offset as usize + args.first_index as usize * 4;
            let end = start + args.index_count as usize * 4;
            if end > index_bytes.len() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "index range {start}..{end} exceeds index buffer size {}",
                    index_bytes.len()
                )));
            }
            bytemuck::pod_collect_to_vec::<u8, u32>(&index_bytes[start..end])
                .into_iter()
                .map(|i| i as i64 + args.base_vertex as i64)
                .collect()
        }
    };

    let fetch = |id: i64| -> Result<Vec4, GraphicsError> {
        let start = *vertex_offset as usize + id as usize * stride + position.offset as usize;
        let bytes = vertex_bytes.get(start..start + 12).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("vertex {id} lies outside its vertex buffer"))
        })?;
        let p: [f32; 3] = bytemuck::pod_read_unaligned(bytes);
        Ok(mvp * Vec3::from(p).push(1.0))
    };

    let texture = dummy_texture(depth.texture.gpu())?;
    let size = texture.descriptor().size;
    let state = RasterState {
        viewport: pass
            .viewport
            .unwrap_or_else(|| Viewport::from_dimensions(size.width, size.height)),
        compare: depth_state.depth_compare,
        depth_write: depth_state.depth_write_enabled,
        cull_mode: desc.rasterizer.cull_mode,
        front_face: desc.rasterizer.front_face,
        depth_bias: desc.rasterizer.depth_bias,
    };

    let mut data = texture.data();
    let mut texels = bytemuck::pod_collect_to_vec::<u8, f32>(&data[..]);
    let mut target = DepthTarget {
        width: size.width,
        height: size.height,
        texels: &mut texels,
    };

    let triangles: Vec<[i64; 3]> = match desc.primitive_topology {
        PrimitiveTopology::TriangleStrip => vertex_ids
            .windows(3)
            .enumerate()
            .map(|(i, w)| if i % 2 == 0 { [w[0], w[1], w[2]] } else { [w[1], w[0], w[2]] })
            .collect(),
        _ => vertex_ids
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
    };
    for [a, b, c] in triangles {
        rasterize_triangle(&mut target, [fetch(a)?, fetch(b)?, fetch(c)?], &state);
    }
    data.copy_from_slice(bytemuck::cast_slice::<f32, u8>(&texels));
    Ok(())
}

fn copy_buffer(
    source: &BufferRef,
    source_offset: u64,
    destination: &BufferRef,
    destination_offset: u64,
    size: u64,
) -> Result<(), GraphicsError> {
    let src = dummy_buffer(source.gpu())?.snapshot();
    let dst = dummy_buffer(destination.gpu())?;
    let mut dst = dst.data();
    let (s, d, n) = (source_offset as usize, destination_offset as usize, size as usize);
    if s + n > src.len() || d + n > dst.len() {
        return Err(GraphicsError::InvalidParameter(format!(
            "buffer copy of {n} bytes ({} @{s} -> {} @{d}) is out of bounds",
            source.label(),
            destination.label()
        )));
    }
    dst[d..d + n].copy_from_slice(&src[s..s + n]);
    Ok(())
}

fn copy_buffer_to_texture(
    source: &BufferRef,
    source_offset: u64,
    bytes_per_row: u32,
    destination: &TextureRef,
) -> Result<(), GraphicsError> {
    let src = dummy_buffer(source.gpu())?.snapshot();
    let texture = dummy_texture(destination.gpu())?;
    let desc = texture.descriptor();
    let row = (desc.size.width * DummyTexture::stored_texel_size(desc.format)) as usize;
    let rows = (desc.size.height * desc.size.depth) as usize;
    let mut dst = texture.data();
    for y in 0..rows {
        let s = source_offset as usize + y * bytes_per_row as usize;
        let bytes = src.get(s..s + row).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "texture upload to '{}' reads past the end of its transfer buffer",
                destination.label()
            ))
        })?;
        dst[y * row..(y + 1) * row].copy_from_slice(bytes);
    }
    Ok(())
}

fn copy_texture_to_buffer(
    source: &TextureRef,
    destination: &BufferRef,
    destination_offset: u64,
    bytes_per_row: u32,
) -> Result<(), GraphicsError> {
    let texture = dummy_texture(source.gpu())?;
    let desc = texture.descriptor();
    if desc.format.is_depth_stencil() && desc.format != TextureFormat::Depth32Float {
        return Err(GraphicsError::InvalidParameter(format!(
            "depth readback of '{}' requires Depth32Float, got {:?}",
            source.label(),
            desc.format
        )));
    }
    let src = texture.data().clone();
    let row = (desc.size.width * DummyTexture::stored_texel_size(desc.format)) as usize;
    let rows = (desc.size.height * desc.size.depth) as usize;
    let dst = dummy_buffer(destination.gpu())?;
    let mut dst = dst.data();
    for y in 0..rows {
        let d = destination_offset as usize + y * bytes_per_row as usize;
        let slot = dst.get_mut(d..d + row).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "texture download from '{}' writes past the end of its transfer buffer",
                source.label()
            ))
        })?;
        slot.copy_from_slice(&src[y * row..(y + 1) * row]);
    }
    Ok(())
}
