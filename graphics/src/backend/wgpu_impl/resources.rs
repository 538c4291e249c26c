//! Resource creation for the wgpu backend.

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipelineDescriptor;
use crate::shader::{
    FRAGMENT_TEXTURE_GROUP, FRAGMENT_UNIFORM_GROUP, Shader, ShaderReflection, ShaderSource,
    TextureSampleKind, VERTEX_UNIFORM_GROUP,
};
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor};

use super::super::{GpuBuffer, GpuPipeline, GpuSampler, GpuShader, GpuTexture};
use super::conversion::{
    convert_address_mode, convert_blend_state, convert_buffer_usage, convert_compare_function,
    convert_cull_mode, convert_filter_mode, convert_front_face, convert_mipmap_filter_mode,
    convert_step_mode, convert_texture_format, convert_texture_usage, convert_topology,
    convert_vertex_format,
};
use super::{WAIT_TIMEOUT, WgpuBackend};

/// Round `value` up to a multiple of `alignment`.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl WgpuBackend {
    pub(super) fn create_buffer_impl(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        // Mapping and copies work in 4-byte units.
        let size = align_up(descriptor.size.max(1), wgpu::COPY_BUFFER_ALIGNMENT);
        log::trace!(
            "WgpuBackend: creating buffer {:?} (size: {size})",
            descriptor.label
        );

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size,
            usage: convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu(Arc::new(buffer)))
    }

    pub(super) fn create_texture_impl(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        use crate::backend::GpuBackend;

        if !self.supports_texture_format(descriptor.format, descriptor.usage) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture '{}' ({}x{}): {:?} with usage {:?} unsupported by adapter '{}'",
                descriptor.display_label(),
                descriptor.size.width,
                descriptor.size.height,
                descriptor.format,
                descriptor.usage,
                self.adapter.get_info().name
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth_or_array_layers: descriptor.size.depth,
            },
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(descriptor.format),
            usage: convert_texture_usage(descriptor.usage),
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            dimension: Some(wgpu::TextureViewDimension::D2),
            ..Default::default()
        });

        Ok(GpuTexture::Wgpu {
            texture: Arc::new(texture),
            view: Arc::new(view),
        })
    }

    pub(super) fn create_sampler_impl(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: convert_address_mode(descriptor.address_mode_u),
            address_mode_v: convert_address_mode(descriptor.address_mode_v),
            address_mode_w: convert_address_mode(descriptor.address_mode_w),
            mag_filter: convert_filter_mode(descriptor.mag_filter),
            min_filter: convert_filter_mode(descriptor.min_filter),
            mipmap_filter: convert_mipmap_filter_mode(descriptor.mipmap_filter),
            compare: descriptor.compare.map(convert_compare_function),
            ..Default::default()
        });

        Ok(GpuSampler::Wgpu(Arc::new(sampler)))
    }

    pub(super) fn create_shader_impl(
        &self,
        source: &ShaderSource,
    ) -> Result<GpuShader, GraphicsError> {
        log::trace!("WgpuBackend: creating shader {}", source.name);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.name),
                source: wgpu::ShaderSource::Wgsl(source.code.as_str().into()),
            });
        Ok(GpuShader::Wgpu(Arc::new(module)))
    }

    pub(super) fn create_pipeline_impl(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        let label = descriptor.display_label();
        let vertex_module = shader_module(&descriptor.vertex_shader)?;
        let fragment_module = descriptor
            .fragment_shader
            .as_ref()
            .map(shader_module)
            .transpose()?;

        // Vertex buffer layouts indexed by slot, with empty layouts filling gaps.
        let vertex_input = &descriptor.vertex_input;
        let num_slots = vertex_input
            .bindings
            .iter()
            .map(|b| b.slot as usize + 1)
            .max()
            .unwrap_or(0);
        let mut vertex_attrs: Vec<Vec<wgpu::VertexAttribute>> = vec![Vec::new(); num_slots];
        let mut strides = vec![(0u64, wgpu::VertexStepMode::Vertex); num_slots];
        for binding in &vertex_input.bindings {
            strides[binding.slot as usize] =
                (binding.stride as u64, convert_step_mode(binding.step_mode));
            vertex_attrs[binding.slot as usize] = vertex_input
                .attributes_for(binding.slot)
                .map(|attr| wgpu::VertexAttribute {
                    format: convert_vertex_format(attr.format),
                    offset: attr.offset as u64,
                    shader_location: attr.location,
                })
                .collect();
        }
        let vertex_buffer_layouts: Vec<wgpu::VertexBufferLayout> = strides
            .iter()
            .zip(&vertex_attrs)
            .map(|((stride, step_mode), attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: *step_mode,
                attributes,
            })
            .collect();

        let empty = ShaderReflection::default();
        let fragment_reflection = descriptor
            .fragment_shader
            .as_ref()
            .map(Shader::reflection)
            .unwrap_or(&empty);
        let bind_group_layouts = self.bind_group_layouts(
            label,
            descriptor.vertex_shader.reflection(),
            fragment_reflection,
        );

        let pipeline_layout = {
            let refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
            self.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(label),
                    bind_group_layouts: &refs,
                    immediate_size: 0,
                })
        };

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: convert_texture_format(target.format),
                    blend: Some(convert_blend_state(target.blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let rasterizer = &descriptor.rasterizer;
        let depth_stencil = descriptor
            .depth_stencil
            .map(|state| wgpu::DepthStencilState {
                format: convert_texture_format(state.format),
                depth_write_enabled: state.depth_write_enabled,
                depth_compare: convert_compare_function(state.depth_compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: rasterizer.depth_bias.constant,
                    slope_scale: rasterizer.depth_bias.slope_scale,
                    clamp: rasterizer.depth_bias.clamp,
                },
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some(descriptor.vertex_shader.entry_point()),
                    buffers: &vertex_buffer_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: fragment_module.zip(descriptor.fragment_shader.as_ref()).map(
                    |(module, shader)| wgpu::FragmentState {
                        module,
                        entry_point: Some(shader.entry_point()),
                        targets: &color_targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                ),
                primitive: wgpu::PrimitiveState {
                    topology: convert_topology(descriptor.primitive_topology),
                    strip_index_format: None,
                    front_face: convert_front_face(rasterizer.front_face),
                    cull_mode: convert_cull_mode(rasterizer.cull_mode),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: descriptor.sample_count,
                    ..Default::default()
                },
                multiview_mask: None,
                cache: None,
            });
        log::trace!("WgpuBackend: created pipeline {label}");

        Ok(GpuPipeline::Wgpu {
            pipeline: Arc::new(pipeline),
            bind_group_layouts: Arc::new(bind_group_layouts),
        })
    }

    /// Layouts for the three bind groups every umbra pipeline uses.
    ///
    /// Non-comparison texture slots are unfilterable so that `R32Float`
    /// targets can be sampled on every adapter.
    fn bind_group_layouts(
        &self,
        label: &str,
        vertex: &ShaderReflection,
        fragment: &ShaderReflection,
    ) -> Vec<wgpu::BindGroupLayout> {
        let uniform_entries = |reflection: &ShaderReflection, visibility| {
            reflection
                .uniforms
                .iter()
                .map(|uniform| wgpu::BindGroupLayoutEntry {
                    binding: uniform.slot,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(uniform.size as u64),
                    },
                    count: None,
                })
                .collect::<Vec<_>>()
        };

        let mut texture_entries = Vec::with_capacity(fragment.samplers.len() * 2);
        for sampler in &fragment.samplers {
            let sample_type = match sampler.sample_kind {
                TextureSampleKind::Float => wgpu::TextureSampleType::Float { filterable: false },
                TextureSampleKind::Depth => wgpu::TextureSampleType::Depth,
                TextureSampleKind::Sint => wgpu::TextureSampleType::Sint,
                TextureSampleKind::Uint => wgpu::TextureSampleType::Uint,
            };
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: sampler.slot * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            let sampler_type = if sampler.comparison {
                wgpu::SamplerBindingType::Comparison
            } else {
                wgpu::SamplerBindingType::NonFiltering
            };
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: sampler.slot * 2 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            });
        }

        let groups = [
            (
                VERTEX_UNIFORM_GROUP,
                uniform_entries(vertex, wgpu::ShaderStages::VERTEX),
            ),
            (
                FRAGMENT_UNIFORM_GROUP,
                uniform_entries(fragment, wgpu::ShaderStages::FRAGMENT),
            ),
            (FRAGMENT_TEXTURE_GROUP, texture_entries),
        ];
        groups
            .iter()
            .map(|(group, entries)| {
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{label} group {group}")),
                        entries,
                    })
            })
            .collect()
    }

    pub(super) fn write_mapped_impl(
        &self,
        buffer: &wgpu::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if data.is_empty() {
            return Ok(());
        }
        let (start, end) = self.mappable_range(buffer, offset, data.len() as u64)?;
        let slice = buffer.slice(start..end);
        self.map_blocking(&slice, wgpu::MapMode::Write)?;
        {
            let mut mapped = slice.get_mapped_range_mut();
            let local = (offset - start) as usize;
            mapped[local..local + data.len()].copy_from_slice(data);
        }
        buffer.unmap();
        Ok(())
    }

    pub(super) fn read_mapped_impl(
        &self,
        buffer: &wgpu::Buffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let (start, end) = self.mappable_range(buffer, offset, size)?;
        let slice = buffer.slice(start..end);
        self.map_blocking(&slice, wgpu::MapMode::Read)?;
        let data = {
            let mapped = slice.get_mapped_range();
            let local = (offset - start) as usize;
            mapped[local..local + size as usize].to_vec()
        };
        buffer.unmap();
        Ok(data)
    }

    /// Widen `offset..offset + size` to the alignment wgpu requires for mapping.
    fn mappable_range(
        &self,
        buffer: &wgpu::Buffer,
        offset: u64,
        size: u64,
    ) -> Result<(u64, u64), GraphicsError> {
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= buffer.size())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "mapped range {offset}..{offset}+{size} exceeds buffer size {}",
                    buffer.size()
                ))
            })?;
        let start = offset - offset % wgpu::MAP_ALIGNMENT;
        let end = align_up(end, wgpu::COPY_BUFFER_ALIGNMENT).min(buffer.size());
        Ok((start, end))
    }

    fn map_blocking(
        &self,
        slice: &wgpu::BufferSlice<'_>,
        mode: wgpu::MapMode,
    ) -> Result<(), GraphicsError> {
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(mode, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(WAIT_TIMEOUT),
            })
            .map_err(|e| {
                log::error!("waiting for buffer map failed: {e}");
                GraphicsError::DeviceLost
            })?;
        match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GraphicsError::InvalidState(format!("buffer map failed: {e}"))),
            Err(_) => Err(GraphicsError::Internal(
                "buffer map callback was dropped".to_string(),
            )),
        }
    }
}

fn shader_module(shader: &Shader) -> Result<&wgpu::ShaderModule, GraphicsError> {
    match shader.gpu() {
        GpuShader::Wgpu(module) => Ok(module),
        GpuShader::Dummy => Err(GraphicsError::Internal(format!(
            "shader '{}' does not belong to the wgpu backend",
            shader.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::align_up;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }
}
