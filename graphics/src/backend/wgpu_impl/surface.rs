//! wgpu surface implementation.
//!
//! A [`WgpuSurface`] binds a winit window to the device and hands out one
//! swapchain image per frame.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::GpuTexture;
use crate::error::GraphicsError;
use crate::types::TextureFormat;

use super::WgpuBackend;
use super::conversion::{convert_texture_format, texture_format_from_wgpu};

/// A wgpu surface plus the swapchain image acquired for the current frame.
pub struct WgpuSurface {
    surface: wgpu::Surface<'static>,
    window: Arc<winit::window::Window>,
    format: TextureFormat,
    config: Mutex<wgpu::SurfaceConfiguration>,
    current: Mutex<Option<wgpu::SurfaceTexture>>,
}

impl std::fmt::Debug for WgpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config.lock();
        f.debug_struct("WgpuSurface")
            .field("format", &self.format)
            .field("width", &config.width)
            .field("height", &config.height)
            .finish_non_exhaustive()
    }
}

impl WgpuSurface {
    /// Create a surface for `window` and configure it at the window's current size.
    pub fn new(
        backend: &WgpuBackend,
        window: Arc<winit::window::Window>,
    ) -> Result<Self, GraphicsError> {
        // The surface holds its own reference to the window, so it is 'static.
        let surface = backend
            .instance()
            .create_surface(window.clone())
            .map_err(|e| {
                GraphicsError::InitializationFailed(format!("Failed to create surface: {e}"))
            })?;

        let caps = surface.get_capabilities(backend.adapter());
        let format = caps
            .formats
            .iter()
            .copied()
            .filter_map(texture_format_from_wgpu)
            .find(|f| *f == TextureFormat::Bgra8UnormSrgb)
            .or_else(|| {
                caps.formats
                    .iter()
                    .copied()
                    .find_map(texture_format_from_wgpu)
            })
            .ok_or_else(|| {
                GraphicsError::FeatureNotSupported(format!(
                    "surface offers no usable color format (offered: {:?})",
                    caps.formats
                ))
            })?;

        // Swapchain images can be read back when the platform allows it.
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage,
            format: convert_texture_format(format),
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(backend.device(), &config);
        log::info!(
            "Configured wgpu surface {}x{} ({format:?})",
            config.width,
            config.height
        );

        Ok(Self {
            surface,
            window,
            format,
            config: Mutex::new(config),
            current: Mutex::new(None),
        })
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Reconfigure for a new size. Zero sizes are ignored.
    pub fn resize(&self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let mut config = self.config.lock();
        if config.width == width && config.height == height {
            return;
        }
        config.width = width;
        config.height = height;
        self.surface.configure(device, &config);
        log::debug!("Resized wgpu surface to {width}x{height}");
    }

    /// Acquire the next swapchain image.
    ///
    /// Returns `Ok(None)` for transient conditions (minimized window,
    /// outdated or lost surface, timeout) so the caller skips the frame.
    pub fn acquire(&self, device: &wgpu::Device) -> Result<Option<GpuTexture>, GraphicsError> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(None);
        }
        self.resize(device, size.width, size.height);

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory acquiring a swapchain image");
                return Err(GraphicsError::OutOfMemory);
            }
            Err(e) => {
                log::debug!("Skipping frame, swapchain image unavailable: {e}");
                let config = self.config.lock();
                self.surface.configure(device, &config);
                return Ok(None);
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let texture = GpuTexture::Wgpu {
            texture: Arc::new(frame.texture.clone()),
            view: Arc::new(view),
        };
        *self.current.lock() = Some(frame);
        Ok(Some(texture))
    }

    /// Present the image acquired by the last [`acquire`](Self::acquire).
    pub fn present(&self) {
        if let Some(frame) = self.current.lock().take() {
            self.window.pre_present_notify();
            frame.present();
        }
    }
}
