//! Command buffers, render passes and copy passes.
//!
//! All GPU work is recorded into a [`CommandBuffer`] and executed in
//! recording order when it is submitted. Passes are scoped: a
//! [`RenderPass`] or [`CopyPass`] borrows its command buffer mutably and
//! ends itself when dropped, so passes can never overlap.
//!
//! ```ignore
//! let mut cmd = device.acquire_command_buffer();
//! {
//!     let mut pass = cmd.begin_render_pass(
//!         RenderPassDescriptor::new()
//!             .with_depth_attachment(DepthAttachment::clear(depth.share(), 1.0)),
//!     )?;
//!     pass.bind_pipeline(&pipeline);
//!     pass.push_vertex_uniform(0, &mvp);
//!     mesh.draw(&mut pass);
//! }
//! cmd.submit()?;
//! ```

use std::sync::Arc;

use bytemuck::Pod;

use crate::backend::GpuFence;
use crate::device::Device;
use crate::error::GraphicsError;
use crate::pipeline::GraphicsPipeline;
use crate::resources::{BufferRef, Sampler, TextureRef, TransferBuffer, TransferDirection};
use crate::shader::ShaderStage;
pub use crate::types::COPY_BUFFER_ALIGNMENT;
use crate::types::{BufferUsage, Color, LoadOp, StoreOp, TextureFormat, TextureUsage, Viewport};

/// Row pitch alignment for buffer/texture copies.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Bytes per row of a `width`-texel row, padded for texture copies.
pub fn padded_bytes_per_row(width: u32, texel_size: u32) -> u32 {
    let unpadded = width * texel_size;
    unpadded.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT
}

// ============================================================================
// Pass descriptors
// ============================================================================

/// A color target of a render pass.
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub texture: TextureRef,
    pub load: LoadOp<Color>,
    pub store: StoreOp,
}

impl ColorAttachment {
    /// Attachment that keeps the previous contents.
    pub fn load(texture: TextureRef) -> Self {
        Self {
            texture,
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Attachment cleared to `color` when the pass begins.
    pub fn clear(texture: TextureRef, color: Color) -> Self {
        Self {
            texture,
            load: LoadOp::Clear(color),
            store: StoreOp::Store,
        }
    }

    pub fn with_store(mut self, store: StoreOp) -> Self {
        self.store = store;
        self
    }
}

/// The depth target of a render pass.
#[derive(Debug, Clone)]
pub struct DepthAttachment {
    pub texture: TextureRef,
    pub load: LoadOp<f32>,
    pub store: StoreOp,
}

impl DepthAttachment {
    /// Attachment that keeps the depth written by earlier passes.
    pub fn load(texture: TextureRef) -> Self {
        Self {
            texture,
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Attachment cleared to `depth` when the pass begins.
    pub fn clear(texture: TextureRef, depth: f32) -> Self {
        Self {
            texture,
            load: LoadOp::Clear(depth),
            store: StoreOp::Store,
        }
    }

    pub fn with_store(mut self, store: StoreOp) -> Self {
        self.store = store;
        self
    }
}

/// Attachments of a render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
}

impl RenderPassDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    fn attachments(&self) -> impl Iterator<Item = &TextureRef> {
        self.color_attachments
            .iter()
            .map(|a| &a.texture)
            .chain(self.depth_attachment.as_ref().map(|a| &a.texture))
    }

    /// Check attachment formats, usages and sizes; returns the common size.
    fn validate(&self) -> Result<(u32, u32), GraphicsError> {
        let label = self.label.as_deref().unwrap_or("<unnamed pass>");
        let mut extent = None;
        for texture in self.attachments() {
            if texture.is_released() {
                return Err(GraphicsError::InvalidState(format!(
                    "render pass '{label}': attachment '{}' has been released",
                    texture.label()
                )));
            }
            if !texture.usage().contains(TextureUsage::RENDER_ATTACHMENT) {
                return Err(GraphicsError::InvalidParameter(format!(
                    "render pass '{label}': '{}' lacks RENDER_ATTACHMENT usage",
                    texture.label()
                )));
            }
            let size = (texture.width(), texture.height());
            match extent {
                None => extent = Some(size),
                Some(first) if first != size => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "render pass '{label}': attachment '{}' is {}x{}, expected {}x{}",
                        texture.label(),
                        size.0,
                        size.1,
                        first.0,
                        first.1
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(color) = self
            .color_attachments
            .iter()
            .find(|a| a.texture.format().is_depth_stencil())
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "render pass '{label}': color attachment '{}' has depth format {:?}",
                color.texture.label(),
                color.texture.format()
            )));
        }
        if let Some(depth) = &self.depth_attachment
            && !depth.texture.format().is_depth_stencil()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "render pass '{label}': depth attachment '{}' has color format {:?}",
                depth.texture.label(),
                depth.texture.format()
            )));
        }
        extent.ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("render pass '{label}' has no attachments"))
        })
    }
}

// ============================================================================
// Recorded commands
// ============================================================================

/// Arguments of a non-indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Arguments of an indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// One recorded GPU operation.
#[derive(Debug, Clone)]
pub enum Command {
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    BeginCopyPass,
    EndCopyPass,
    SetPipeline(GraphicsPipeline),
    SetViewport(Viewport),
    SetVertexBuffer {
        slot: u32,
        buffer: BufferRef,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferRef,
        offset: u64,
    },
    /// Uniform bytes for `slot` of `stage`; they stay in effect for later
    /// draws of the same submission until pushed again.
    PushUniform {
        stage: ShaderStage,
        slot: u32,
        data: Vec<u8>,
    },
    BindFragmentSampler {
        slot: u32,
        texture: TextureRef,
        sampler: Sampler,
    },
    Draw(DrawArgs),
    DrawIndexed(DrawIndexedArgs),
    UploadToBuffer {
        source: BufferRef,
        source_offset: u64,
        destination: BufferRef,
        destination_offset: u64,
        size: u64,
    },
    UploadToTexture {
        source: BufferRef,
        source_offset: u64,
        bytes_per_row: u32,
        destination: TextureRef,
    },
    DownloadFromBuffer {
        source: BufferRef,
        source_offset: u64,
        destination: BufferRef,
        destination_offset: u64,
        size: u64,
    },
    DownloadFromTexture {
        source: TextureRef,
        destination: BufferRef,
        destination_offset: u64,
        bytes_per_row: u32,
    },
}

// ============================================================================
// Command buffer
// ============================================================================

/// Lifecycle state of a [`CommandBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Recording.
    Active,
    Submitted,
    Cancelled,
}

/// A recorded sequence of GPU operations.
///
/// A command buffer is [`Active`](CommandBufferState::Active) until it is
/// submitted or cancelled; after that it must not be used again. Operating
/// on an inactive buffer trips a debug assertion, and returns
/// [`GraphicsError::InvalidState`] in release builds.
pub struct CommandBuffer {
    device: Arc<Device>,
    commands: Vec<Command>,
    state: CommandBufferState,
}

impl CommandBuffer {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            commands: Vec::new(),
            state: CommandBufferState::Active,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CommandBufferState::Active
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn ensure_active(&self, operation: &str) -> Result<(), GraphicsError> {
        debug_assert!(
            self.is_active(),
            "{operation} on a {:?} command buffer",
            self.state
        );
        if !self.is_active() {
            return Err(GraphicsError::InvalidState(format!(
                "{operation} on a {:?} command buffer",
                self.state
            )));
        }
        Ok(())
    }

    /// Begin a render pass.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is inactive, or the attachments are released,
    /// mismatched in size, or of the wrong kind.
    pub fn begin_render_pass(
        &mut self,
        descriptor: RenderPassDescriptor,
    ) -> Result<RenderPass<'_>, GraphicsError> {
        self.ensure_active("begin_render_pass")?;
        let (width, height) = descriptor.validate()?;
        let color_formats = descriptor
            .color_attachments
            .iter()
            .map(|a| a.texture.format())
            .collect();
        let depth_format = descriptor.depth_attachment.as_ref().map(|a| a.texture.format());
        log::trace!(
            "CommandBuffer: begin render pass {:?} ({width}x{height})",
            descriptor.label
        );
        self.commands.push(Command::BeginRenderPass(descriptor));
        Ok(RenderPass {
            cmd: self,
            color_formats,
            depth_format,
            width,
            height,
            pipeline: None,
        })
    }

    /// Begin a copy pass.
    pub fn begin_copy_pass(&mut self) -> Result<CopyPass<'_>, GraphicsError> {
        self.ensure_active("begin_copy_pass")?;
        self.commands.push(Command::BeginCopyPass);
        Ok(CopyPass { cmd: self })
    }

    /// Push uniform data for vertex uniform `slot`.
    pub fn push_vertex_uniform<T: Pod>(
        &mut self,
        slot: u32,
        data: &T,
    ) -> Result<(), GraphicsError> {
        self.ensure_active("push_vertex_uniform")?;
        self.push_uniform(ShaderStage::Vertex, slot, bytemuck::bytes_of(data));
        Ok(())
    }

    /// Push uniform data for fragment uniform `slot`.
    pub fn push_fragment_uniform<T: Pod>(
        &mut self,
        slot: u32,
        data: &T,
    ) -> Result<(), GraphicsError> {
        self.ensure_active("push_fragment_uniform")?;
        self.push_uniform(ShaderStage::Fragment, slot, bytemuck::bytes_of(data));
        Ok(())
    }

    fn push_uniform(&mut self, stage: ShaderStage, slot: u32, data: &[u8]) {
        self.commands.push(Command::PushUniform {
            stage,
            slot,
            data: data.to_vec(),
        });
    }

    /// Submit the recorded work. The buffer becomes inactive.
    pub fn submit(&mut self) -> Result<(), GraphicsError> {
        self.submit_and_acquire_fence().map(|_| ())
    }

    /// Submit the recorded work and return a fence signaled when it completes.
    pub fn submit_and_acquire_fence(&mut self) -> Result<Fence, GraphicsError> {
        self.ensure_active("submit")?;
        self.state = CommandBufferState::Submitted;
        log::trace!("CommandBuffer: submitting {} commands", self.commands.len());
        let gpu = self.device.backend().submit(&self.commands)?;
        Ok(Fence {
            device: Arc::clone(&self.device),
            gpu,
        })
    }

    /// Discard the recorded work. The buffer becomes inactive.
    pub fn cancel(&mut self) -> Result<(), GraphicsError> {
        self.ensure_active("cancel")?;
        self.state = CommandBufferState::Cancelled;
        log::trace!("CommandBuffer: cancelled {} commands", self.commands.len());
        self.commands.clear();
        Ok(())
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if self.is_active() && !self.commands.is_empty() {
            log::debug!(
                "CommandBuffer dropped while active; discarding {} commands",
                self.commands.len()
            );
        }
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("state", &self.state)
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// Signaled when a submitted command buffer has finished executing.
pub struct Fence {
    device: Arc<Device>,
    gpu: GpuFence,
}

impl Fence {
    /// Block until the submission has completed.
    pub fn wait(&self) -> Result<(), GraphicsError> {
        self.device.backend().wait_fence(&self.gpu)
    }

    pub fn gpu(&self) -> &GpuFence {
        &self.gpu
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Fence").field(&self.gpu).finish()
    }
}

// ============================================================================
// Render pass
// ============================================================================

/// A render pass being recorded. Ends when dropped.
///
/// Per-draw calls do not return errors: misuse such as binding a pipeline
/// whose formats do not match the attachments is a debug assertion.
pub struct RenderPass<'a> {
    cmd: &'a mut CommandBuffer,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    width: u32,
    height: u32,
    pipeline: Option<GraphicsPipeline>,
}

impl RenderPass<'_> {
    pub fn device(&self) -> &Arc<Device> {
        &self.cmd.device
    }

    pub fn color_formats(&self) -> &[TextureFormat] {
        &self.color_formats
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_format
    }

    /// Attachment size in texels.
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pipeline bound most recently.
    pub fn pipeline(&self) -> Option<&GraphicsPipeline> {
        self.pipeline.as_ref()
    }

    pub fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        let desc = pipeline.descriptor();
        debug_assert!(
            desc.color_formats().eq(self.color_formats.iter().copied()),
            "pipeline '{}' targets {:?}, pass has {:?}",
            pipeline.label(),
            desc.color_formats().collect::<Vec<_>>(),
            self.color_formats
        );
        debug_assert_eq!(
            desc.depth_format(),
            self.depth_format,
            "pipeline '{}' depth format does not match the pass",
            pipeline.label()
        );
        self.pipeline = Some(pipeline.clone());
        self.cmd.commands.push(Command::SetPipeline(pipeline.clone()));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.cmd.commands.push(Command::SetViewport(viewport));
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, buffer: &BufferRef, offset: u64) {
        debug_assert!(!buffer.is_released(), "binding released buffer '{}'", buffer.label());
        debug_assert!(buffer.usage().contains(BufferUsage::VERTEX));
        self.cmd.commands.push(Command::SetVertexBuffer {
            slot,
            buffer: buffer.clone(),
            offset,
        });
    }

    /// Bind a `u32` index buffer.
    pub fn bind_index_buffer(&mut self, buffer: &BufferRef, offset: u64) {
        debug_assert!(!buffer.is_released(), "binding released buffer '{}'", buffer.label());
        debug_assert!(buffer.usage().contains(BufferUsage::INDEX));
        self.cmd.commands.push(Command::SetIndexBuffer {
            buffer: buffer.clone(),
            offset,
        });
    }

    /// Bind a texture and sampler to fragment slot `slot`.
    pub fn bind_fragment_sampler(&mut self, slot: u32, texture: &TextureRef, sampler: &Sampler) {
        debug_assert!(!texture.is_released(), "binding released texture '{}'", texture.label());
        debug_assert!(texture.usage().contains(TextureUsage::TEXTURE_BINDING));
        self.cmd.commands.push(Command::BindFragmentSampler {
            slot,
            texture: texture.clone(),
            sampler: sampler.clone(),
        });
    }

    pub fn push_vertex_uniform<T: Pod>(&mut self, slot: u32, data: &T) {
        self.push_uniform_bytes(ShaderStage::Vertex, slot, bytemuck::bytes_of(data));
    }

    pub fn push_fragment_uniform<T: Pod>(&mut self, slot: u32, data: &T) {
        self.push_uniform_bytes(ShaderStage::Fragment, slot, bytemuck::bytes_of(data));
    }

    /// Push raw uniform bytes.
    pub fn push_uniform_bytes(&mut self, stage: ShaderStage, slot: u32, data: &[u8]) {
        if let Some(pipeline) = &self.pipeline {
            let desc = pipeline.descriptor();
            let shader = match stage {
                ShaderStage::Vertex => Some(&desc.vertex_shader),
                ShaderStage::Fragment => desc.fragment_shader.as_ref(),
            };
            if let Some(block) = shader.and_then(|s| s.reflection().uniform(slot)) {
                debug_assert!(
                    data.len() >= block.size as usize,
                    "{stage:?} uniform {slot} of '{}' needs {} bytes, got {}",
                    pipeline.label(),
                    block.size,
                    data.len()
                );
            }
        }
        self.cmd.push_uniform(stage, slot, data);
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        debug_assert!(self.pipeline.is_some(), "draw without a bound pipeline");
        self.cmd.commands.push(Command::Draw(DrawArgs {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        }));
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        debug_assert!(self.pipeline.is_some(), "draw without a bound pipeline");
        self.cmd.commands.push(Command::DrawIndexed(DrawIndexedArgs {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        }));
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        self.cmd.commands.push(Command::EndRenderPass);
    }
}

// ============================================================================
// Copy pass
// ============================================================================

/// A copy pass being recorded. Ends when dropped.
pub struct CopyPass<'a> {
    cmd: &'a mut CommandBuffer,
}

impl CopyPass<'_> {
    /// Copy `size` bytes from an upload transfer buffer into `destination`.
    pub fn upload_to_buffer(
        &mut self,
        source: &TransferBuffer,
        source_offset: u64,
        destination: &BufferRef,
        destination_offset: u64,
        size: u64,
    ) {
        debug_assert_eq!(source.direction(), TransferDirection::Upload);
        debug_assert!(destination.usage().contains(BufferUsage::COPY_DST));
        debug_assert!(source_offset + size <= source.size());
        debug_assert!(destination_offset + size <= destination.size());
        debug_assert!(
            [source_offset, destination_offset, size]
                .iter()
                .all(|v| v % COPY_BUFFER_ALIGNMENT == 0),
            "buffer copies must be {COPY_BUFFER_ALIGNMENT}-byte aligned"
        );
        self.cmd.commands.push(Command::UploadToBuffer {
            source: source.share(),
            source_offset,
            destination: destination.clone(),
            destination_offset,
            size,
        });
    }

    /// Copy a whole texture's texels from an upload transfer buffer.
    pub fn upload_to_texture(
        &mut self,
        source: &TransferBuffer,
        source_offset: u64,
        bytes_per_row: u32,
        destination: &TextureRef,
    ) {
        debug_assert_eq!(source.direction(), TransferDirection::Upload);
        debug_assert!(destination.usage().contains(TextureUsage::COPY_DST));
        debug_assert_eq!(bytes_per_row % COPY_BYTES_PER_ROW_ALIGNMENT, 0);
        self.cmd.commands.push(Command::UploadToTexture {
            source: source.share(),
            source_offset,
            bytes_per_row,
            destination: destination.clone(),
        });
    }

    /// Copy `size` bytes of `source` into a download transfer buffer.
    pub fn download_from_buffer(
        &mut self,
        source: &BufferRef,
        source_offset: u64,
        destination: &TransferBuffer,
        destination_offset: u64,
        size: u64,
    ) {
        debug_assert_eq!(destination.direction(), TransferDirection::Download);
        debug_assert!(source.usage().contains(BufferUsage::COPY_SRC));
        debug_assert!(source_offset + size <= source.size());
        debug_assert!(destination_offset + size <= destination.size());
        debug_assert!(
            [source_offset, destination_offset, size]
                .iter()
                .all(|v| v % COPY_BUFFER_ALIGNMENT == 0),
            "buffer copies must be {COPY_BUFFER_ALIGNMENT}-byte aligned"
        );
        self.cmd.commands.push(Command::DownloadFromBuffer {
            source: source.clone(),
            source_offset,
            destination: destination.share(),
            destination_offset,
            size,
        });
    }

    /// Copy all texels of `source` into a download transfer buffer.
    pub fn download_from_texture(
        &mut self,
        source: &TextureRef,
        destination: &TransferBuffer,
        destination_offset: u64,
        bytes_per_row: u32,
    ) {
        debug_assert_eq!(destination.direction(), TransferDirection::Download);
        debug_assert!(source.usage().contains(TextureUsage::COPY_SRC));
        debug_assert_eq!(bytes_per_row % COPY_BYTES_PER_ROW_ALIGNMENT, 0);
        self.cmd.commands.push(Command::DownloadFromTexture {
            source: source.clone(),
            destination: destination.share(),
            destination_offset,
            bytes_per_row,
        });
    }
}

impl Drop for CopyPass<'_> {
    fn drop(&mut self) {
        self.cmd.commands.push(Command::EndCopyPass);
    }
}
