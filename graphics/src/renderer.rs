//! The per-window frame coordinator.
//!
//! A [`Renderer`] owns the device handle, the window's surface, the depth
//! texture every pass shares, and the state of the frame being recorded:
//!
//! ```ignore
//! renderer.begin_frame()?;
//! if renderer.wait_and_acquire_swapchain()? {
//!     render_depth_only_pass(&mut renderer, &prepass, &castables, &camera)?;
//!     scene.render(&mut renderer, &camera)?;
//! }
//! renderer.end_frame()?;
//! ```

use std::sync::Arc;

use crate::backend::GpuSurface;
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::GraphicsError;
use crate::resources::{Texture, TextureRef};
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};
use crate::window::RenderWindow;

/// Depth format used when no hint is given.
pub const DEFAULT_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Depth formats probed after the hint, most precise first.
pub const DEPTH_FORMAT_FALLBACKS: [TextureFormat; 5] = [
    TextureFormat::Depth32Float,
    TextureFormat::Depth32FloatStencil8,
    TextureFormat::Depth24PlusStencil8,
    TextureFormat::Depth24Plus,
    TextureFormat::Depth16Unorm,
];

const DEPTH_PROBE_USAGE: TextureUsage =
    TextureUsage::RENDER_ATTACHMENT.union(TextureUsage::TEXTURE_BINDING);

/// First format out of `hint` followed by [`DEPTH_FORMAT_FALLBACKS`] that
/// `device` can render to and sample.
pub fn select_depth_format(
    device: &Device,
    hint: TextureFormat,
) -> Result<TextureFormat, GraphicsError> {
    if !hint.is_depth_stencil() {
        return Err(GraphicsError::InvalidParameter(format!(
            "depth format hint {hint:?} is not a depth format"
        )));
    }
    std::iter::once(hint)
        .chain(DEPTH_FORMAT_FALLBACKS)
        .find(|format| device.supports_texture_format(*format, DEPTH_PROBE_USAGE))
        .ok_or_else(|| {
            GraphicsError::FeatureNotSupported(format!(
                "no depth target format supported (tried {hint:?}, {DEPTH_FORMAT_FALLBACKS:?})"
            ))
        })
}

/// Device, window binding, shared depth texture and the current frame.
pub struct Renderer {
    device: Arc<Device>,
    window: RenderWindow,
    surface: GpuSurface,
    swapchain_format: TextureFormat,
    depth_format: TextureFormat,
    depth_texture: Texture,
    /// Stands in for the swapchain when the window is headless.
    headless_target: Option<Texture>,
    command_buffer: Option<CommandBuffer>,
    swapchain_texture: Option<TextureRef>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("window", &self.window)
            .field("swapchain_format", &self.swapchain_format)
            .field("depth_format", &self.depth_format)
            .field("in_frame", &self.command_buffer.is_some())
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Claim `window` for `device` with the default depth format.
    pub fn new(device: Arc<Device>, window: RenderWindow) -> Result<Self, GraphicsError> {
        Self::with_depth_format(device, window, DEFAULT_DEPTH_FORMAT)
    }

    /// Claim `window` for `device`, using `hint` for the shared depth texture
    /// if the device supports it and the first supported fallback otherwise.
    ///
    /// # Errors
    ///
    /// Fails if the surface cannot be created or no depth format is usable.
    pub fn with_depth_format(
        device: Arc<Device>,
        window: RenderWindow,
        hint: TextureFormat,
    ) -> Result<Self, GraphicsError> {
        let surface = device.backend().create_surface(&window)?;
        let swapchain_format = device.backend().surface_format(&surface);
        let depth_format = select_depth_format(&device, hint)?;
        if depth_format != hint {
            log::info!("Renderer: depth format {hint:?} unsupported, using {depth_format:?}");
        }

        let (width, height) = target_size(&window);
        let depth_texture = create_depth_texture(&device, depth_format, width, height)?;
        let headless_target = if matches!(surface, GpuSurface::Headless) {
            Some(create_headless_target(&device, swapchain_format, width, height)?)
        } else {
            None
        };

        log::info!(
            "Renderer: {width}x{height}, color {swapchain_format:?}, depth {depth_format:?}"
        );

        Ok(Self {
            device,
            window,
            surface,
            swapchain_format,
            depth_format,
            depth_texture,
            headless_target,
            command_buffer: None,
            swapchain_texture: None,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn window(&self) -> &RenderWindow {
        &self.window
    }

    /// Mutable access to the window, e.g. to resize a headless target.
    pub fn window_mut(&mut self) -> &mut RenderWindow {
        &mut self.window
    }

    /// Color format of swapchain images.
    pub fn swapchain_format(&self) -> TextureFormat {
        self.swapchain_format
    }

    /// Format of the shared depth texture.
    pub fn depth_format(&self) -> TextureFormat {
        self.depth_format
    }

    /// The shared depth texture. Replaced when the window is resized.
    pub fn depth_texture(&self) -> TextureRef {
        self.depth_texture.share()
    }

    /// Size of the render targets in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.depth_texture.width(), self.depth_texture.height())
    }

    /// Whether a frame is being recorded.
    pub fn in_frame(&self) -> bool {
        self.command_buffer.is_some()
    }

    /// Start a frame by acquiring its command buffer.
    pub fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        debug_assert!(self.command_buffer.is_none(), "begin_frame called twice");
        if self.command_buffer.is_some() {
            return Err(GraphicsError::InvalidState(
                "begin_frame called while a frame is open".to_string(),
            ));
        }
        self.command_buffer = Some(self.device.acquire_command_buffer());
        Ok(())
    }

    /// Command buffer of the current frame.
    pub fn command_buffer(&mut self) -> Result<&mut CommandBuffer, GraphicsError> {
        self.command_buffer.as_mut().ok_or_else(|| {
            GraphicsError::InvalidState("no frame is being recorded".to_string())
        })
    }

    /// Swapchain image of the current frame, valid until [`end_frame`](Self::end_frame).
    pub fn swapchain_texture(&self) -> Option<TextureRef> {
        self.swapchain_texture.clone()
    }

    /// Wait for a swapchain image.
    ///
    /// Returns `Ok(false)` when the window cannot be presented to right now
    /// (minimized, zero-sized, surface outdated). The caller must then skip
    /// all rendering for the frame; the next frame retries.
    pub fn wait_and_acquire_swapchain(&mut self) -> Result<bool, GraphicsError> {
        if self.command_buffer.is_none() {
            return Err(GraphicsError::InvalidState(
                "wait_and_acquire_swapchain outside of a frame".to_string(),
            ));
        }
        if self.window.is_minimized() {
            log::debug!("Renderer: window minimized, skipping frame");
            return Ok(false);
        }
        self.resize_targets()?;

        let texture = match &self.headless_target {
            Some(target) => target.share(),
            None => {
                let Some(gpu) = self.device.backend().acquire_surface_texture(&self.surface)?
                else {
                    log::debug!("Renderer: no swapchain image, skipping frame");
                    return Ok(false);
                };
                let (width, height) = self.size();
                let descriptor = TextureDescriptor::new_2d(
                    width,
                    height,
                    self.swapchain_format,
                    TextureUsage::RENDER_ATTACHMENT,
                )
                .with_label("swapchain image");
                TextureRef::external(Arc::clone(&self.device), descriptor, gpu)
            }
        };
        self.swapchain_texture = Some(texture);
        Ok(true)
    }

    /// Recreate the size-dependent targets if the window changed size.
    fn resize_targets(&mut self) -> Result<(), GraphicsError> {
        let (width, height) = target_size(&self.window);
        if (width, height) == self.size() {
            return Ok(());
        }
        log::debug!("Renderer: resizing targets to {width}x{height}");
        self.device
            .backend()
            .configure_surface(&self.surface, width, height)?;
        self.depth_texture = create_depth_texture(&self.device, self.depth_format, width, height)?;
        if self.headless_target.is_some() {
            self.headless_target = Some(create_headless_target(
                &self.device,
                self.swapchain_format,
                width,
                height,
            )?);
        }
        Ok(())
    }

    /// Finish the frame.
    ///
    /// Submits the frame's commands and presents when a swapchain image was
    /// acquired; otherwise the recorded commands are cancelled.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        let Some(mut cmd) = self.command_buffer.take() else {
            return Err(GraphicsError::InvalidState(
                "end_frame without begin_frame".to_string(),
            ));
        };
        match self.swapchain_texture.take() {
            Some(_) => {
                cmd.submit()?;
                self.device.backend().present(&self.surface);
            }
            None => cmd.cancel()?,
        }
        Ok(())
    }
}

fn target_size(window: &RenderWindow) -> (u32, u32) {
    let (width, height) = window.size_in_pixels();
    (width.max(1), height.max(1))
}

fn create_depth_texture(
    device: &Arc<Device>,
    format: TextureFormat,
    width: u32,
    height: u32,
) -> Result<Texture, GraphicsError> {
    let mut usage = DEPTH_PROBE_USAGE;
    if format == TextureFormat::Depth32Float
        && device.supports_texture_format(format, usage | TextureUsage::COPY_SRC)
    {
        usage |= TextureUsage::COPY_SRC;
    }
    device.create_texture(
        &TextureDescriptor::new_2d(width, height, format, usage).with_label("shared depth"),
    )
}

fn create_headless_target(
    device: &Arc<Device>,
    format: TextureFormat,
    width: u32,
    height: u32,
) -> Result<Texture, GraphicsError> {
    device.create_texture(
        &TextureDescriptor::new_2d(
            width,
            height,
            format,
            TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        )
        .with_label("headless swapchain"),
    )
}
