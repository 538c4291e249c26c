//! Command buffer encoding for the wgpu backend.
//!
//! Uniform pushes are collected into one arena buffer per submission, each
//! at an offset aligned to the device's uniform offset alignment. Bind
//! groups are created per draw from whatever uniforms and samplers are bound
//! at that point.

use std::collections::HashMap;

use crate::command::{Command, RenderPassDescriptor};
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipeline;
use crate::resources::{BufferRef, Sampler, TextureRef};
use crate::shader::ShaderStage;

use super::super::{GpuPipeline, GpuSampler};
use super::conversion::{convert_color_load_op, convert_depth_load_op, convert_store_op};
use super::resources::align_up;
use super::{wgpu_buffer, wgpu_texture};

/// Per-submission storage for pushed uniforms.
struct UniformArena {
    buffer: Option<wgpu::Buffer>,
    /// `(offset, len)` of each `PushUniform` command, by command index.
    ranges: HashMap<usize, (u64, u64)>,
}

impl UniformArena {
    fn build(device: &wgpu::Device, queue: &wgpu::Queue, commands: &[Command]) -> Self {
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let mut bytes = Vec::new();
        let mut ranges = HashMap::new();
        for (index, command) in commands.iter().enumerate() {
            if let Command::PushUniform { data, .. } = command {
                let offset = align_up(bytes.len() as u64, alignment);
                bytes.resize(offset as usize, 0);
                bytes.extend_from_slice(data);
                ranges.insert(index, (offset, data.len() as u64));
            }
        }
        if bytes.is_empty() {
            return Self {
                buffer: None,
                ranges,
            };
        }
        // Bindings may read up to the next aligned offset.
        bytes.resize(align_up(bytes.len() as u64, alignment) as usize, 0);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("umbra uniform arena"),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&buffer, 0, &bytes);
        Self {
            buffer: Some(buffer),
            ranges,
        }
    }
}

/// Bindings in effect for the next draw.
#[derive(Default)]
struct BindingState {
    uniforms: HashMap<(ShaderStage, u32), (u64, u64)>,
    samplers: HashMap<u32, (TextureRef, Sampler)>,
    pipeline: Option<GraphicsPipeline>,
}

pub(super) fn execute(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    commands: &[Command],
) -> Result<wgpu::SubmissionIndex, GraphicsError> {
    let arena = UniformArena::build(device, queue, commands);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("umbra command buffer"),
    });

    let mut state = BindingState::default();
    let mut pass: Option<wgpu::RenderPass<'static>> = None;

    for (index, command) in commands.iter().enumerate() {
        match command {
            Command::BeginRenderPass(descriptor) => {
                pass = Some(begin_render_pass(&mut encoder, descriptor)?);
                state.pipeline = None;
            }
            Command::EndRenderPass => pass = None,
            Command::BeginCopyPass | Command::EndCopyPass => {}
            Command::SetPipeline(pipeline) => {
                if let Some(pass) = pass.as_mut()
                    && let GpuPipeline::Wgpu { pipeline: raw, .. } = pipeline.gpu()
                {
                    pass.set_pipeline(raw);
                }
                state.pipeline = Some(pipeline.clone());
            }
            Command::SetViewport(viewport) => {
                if let Some(pass) = pass.as_mut() {
                    pass.set_viewport(
                        viewport.x,
                        viewport.y,
                        viewport.width,
                        viewport.height,
                        viewport.min_depth,
                        viewport.max_depth,
                    );
                }
            }
            Command::SetVertexBuffer {
                slot,
                buffer,
                offset,
            } => {
                if let Some(pass) = pass.as_mut() {
                    pass.set_vertex_buffer(*slot, wgpu_buffer(buffer.gpu())?.slice(*offset..));
                }
            }
            Command::SetIndexBuffer { buffer, offset } => {
                if let Some(pass) = pass.as_mut() {
                    pass.set_index_buffer(
                        wgpu_buffer(buffer.gpu())?.slice(*offset..),
                        wgpu::IndexFormat::Uint32,
                    );
                }
            }
            Command::PushUniform { stage, slot, .. } => {
                if let Some(range) = arena.ranges.get(&index) {
                    state.uniforms.insert((*stage, *slot), *range);
                }
            }
            Command::BindFragmentSampler {
                slot,
                texture,
                sampler,
            } => {
                state
                    .samplers
                    .insert(*slot, (texture.clone(), sampler.clone()));
            }
            Command::Draw(args) => {
                if let Some(pass) = pass.as_mut() {
                    bind_groups(device, pass, &state, &arena)?;
                    pass.draw(
                        args.first_vertex..args.first_vertex + args.vertex_count,
                        args.first_instance..args.first_instance + args.instance_count,
                    );
                }
            }
            Command::DrawIndexed(args) => {
                if let Some(pass) = pass.as_mut() {
                    bind_groups(device, pass, &state, &arena)?;
                    pass.draw_indexed(
                        args.first_index..args.first_index + args.index_count,
                        args.base_vertex,
                        args.first_instance..args.first_instance + args.instance_count,
                    );
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
            } => {
                encoder.copy_buffer_to_buffer(
                    wgpu_buffer(source.gpu())?,
                    *source_offset,
                    wgpu_buffer(destination.gpu())?,
                    *destination_offset,
                    *size,
                );
            }
            Command::UploadToTexture {
                source,
                source_offset,
                bytes_per_row,
                destination,
            } => {
                encoder.copy_buffer_to_texture(
                    buffer_copy(source, *source_offset, *bytes_per_row, destination)?,
                    texture_copy(destination)?,
                    copy_extent(destination),
                );
            }
            Command::DownloadFromTexture {
                source,
                destination,
                destination_offset,
                bytes_per_row,
            } => {
                encoder.copy_texture_to_buffer(
                    texture_copy(source)?,
                    buffer_copy(destination, *destination_offset, *bytes_per_row, source)?,
                    copy_extent(source),
                );
            }
        }
    }
    drop(pass);

    Ok(queue.submit(std::iter::once(encoder.finish())))
}

fn begin_render_pass(
    encoder: &mut wgpu::CommandEncoder,
    descriptor: &RenderPassDescriptor,
) -> Result<wgpu::RenderPass<'static>, GraphicsError> {
    let color_attachments = descriptor
        .color_attachments
        .iter()
        .map(|attachment| {
            let (_, view) = wgpu_texture(attachment.texture.gpu())?;
            Ok(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: convert_color_load_op(attachment.load),
                    store: convert_store_op(attachment.store),
                },
                depth_slice: None,
            }))
        })
        .collect::<Result<Vec<_>, GraphicsError>>()?;

    let depth_stencil_attachment = descriptor
        .depth_attachment
        .as_ref()
        .map(|attachment| {
            let (_, view) = wgpu_texture(attachment.texture.gpu())?;
            let stencil_ops = attachment
                .texture
                .format()
                .has_stencil()
                .then_some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                });
            Ok(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: convert_depth_load_op(attachment.load),
                    store: convert_store_op(attachment.store),
                }),
                stencil_ops,
            })
        })
        .transpose()?;

    let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: descriptor.label.as_deref(),
        color_attachments: &color_attachments,
        depth_stencil_attachment,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    Ok(pass.forget_lifetime())
}

/// Create and set the three bind groups the current pipeline expects.
fn bind_groups(
    device: &wgpu::Device,
    pass: &mut wgpu::RenderPass<'static>,
    state: &BindingState,
    arena: &UniformArena,
) -> Result<(), GraphicsError> {
    let Some(pipeline) = &state.pipeline else {
        return Err(GraphicsError::InvalidState(
            "draw without a bound pipeline".to_string(),
        ));
    };
    let GpuPipeline::Wgpu {
        bind_group_layouts, ..
    } = pipeline.gpu()
    else {
        return Err(GraphicsError::Internal(format!(
            "pipeline '{}' does not belong to the wgpu backend",
            pipeline.label()
        )));
    };
    let descriptor = pipeline.descriptor();

    let vertex_entries = uniform_entries(pipeline, ShaderStage::Vertex, state, arena)?;
    let fragment_entries = uniform_entries(pipeline, ShaderStage::Fragment, state, arena)?;

    // Depth views for combined depth-stencil textures must select the depth aspect.
    let mut views = Vec::new();
    let samplers = descriptor
        .fragment_shader
        .as_ref()
        .map(|s| s.reflection().samplers.as_slice())
        .unwrap_or_default();
    for slot in samplers {
        let (texture, sampler) = state.samplers.get(&slot.slot).ok_or_else(|| {
            GraphicsError::InvalidState(format!(
                "pipeline '{}': fragment sampler slot {} was never bound",
                pipeline.label(),
                slot.slot
            ))
        })?;
        if !slot.comparison && !sampler.descriptor().is_non_filtering() {
            return Err(GraphicsError::InvalidParameter(format!(
                "pipeline '{}': fragment sampler slot {} needs a nearest-filtered sampler",
                pipeline.label(),
                slot.slot
            )));
        }
        let (raw, view) = wgpu_texture(texture.gpu())?;
        let view = if texture.format().has_stencil() {
            raw.create_view(&wgpu::TextureViewDescriptor {
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            })
        } else {
            (**view).clone()
        };
        let GpuSampler::Wgpu(sampler) = sampler.gpu() else {
            return Err(GraphicsError::Internal(
                "sampler does not belong to the wgpu backend".to_string(),
            ));
        };
        views.push((slot.slot, view, sampler.clone()));
    }
    let mut texture_entries = Vec::with_capacity(views.len() * 2);
    for (slot, view, sampler) in &views {
        texture_entries.push(wgpu::BindGroupEntry {
            binding: slot * 2,
            resource: wgpu::BindingResource::TextureView(view),
        });
        texture_entries.push(wgpu::BindGroupEntry {
            binding: slot * 2 + 1,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }

    for (group, (layout, entries)) in bind_group_layouts
        .iter()
        .zip([vertex_entries, fragment_entries, texture_entries])
        .enumerate()
    {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &entries,
        });
        pass.set_bind_group(group as u32, &bind_group, &[]);
    }
    Ok(())
}

fn uniform_entries<'a>(
    pipeline: &GraphicsPipeline,
    stage: ShaderStage,
    state: &BindingState,
    arena: &'a UniformArena,
) -> Result<Vec<wgpu::BindGroupEntry<'a>>, GraphicsError> {
    let descriptor = pipeline.descriptor();
    let reflection = match stage {
        ShaderStage::Vertex => Some(descriptor.vertex_shader.reflection()),
        ShaderStage::Fragment => descriptor.fragment_shader.as_ref().map(|s| s.reflection()),
    };
    let Some(reflection) = reflection else {
        return Ok(Vec::new());
    };
    reflection
        .uniforms
        .iter()
        .map(|uniform| {
            let (offset, _) = state
                .uniforms
                .get(&(stage, uniform.slot))
                .copied()
                .ok_or_else(|| {
                    GraphicsError::InvalidState(format!(
                        "pipeline '{}': {stage:?} uniform slot {} was never pushed",
                        pipeline.label(),
                        uniform.slot
                    ))
                })?;
            let buffer = arena
                .buffer
                .as_ref()
                .ok_or_else(|| GraphicsError::Internal("uniform arena is empty".to_string()))?;
            Ok(wgpu::BindGroupEntry {
                binding: uniform.slot,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset,
                    size: wgpu::BufferSize::new(uniform.size as u64),
                }),
            })
        })
        .collect()
}

fn buffer_copy<'a>(
    buffer: &'a BufferRef,
    offset: u64,
    bytes_per_row: u32,
    texture: &TextureRef,
) -> Result<wgpu::TexelCopyBufferInfo<'a>, GraphicsError> {
    Ok(wgpu::TexelCopyBufferInfo {
        buffer: wgpu_buffer(buffer.gpu())?,
        layout: wgpu::TexelCopyBufferLayout {
            offset,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(texture.height()),
        },
    })
}

fn texture_copy(texture: &TextureRef) -> Result<wgpu::TexelCopyTextureInfo<'_>, GraphicsError> {
    let (raw, _) = wgpu_texture(texture.gpu())?;
    let aspect = if texture.format().is_depth_stencil() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    };
    Ok(wgpu::TexelCopyTextureInfo {
        texture: raw,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect,
    })
}

fn copy_extent(texture: &TextureRef) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: texture.width(),
        height: texture.height(),
        depth_or_array_layers: 1,
    }
}
