//! Windows a renderer can present to.
//!
//! Event dispatch stays with the application. The renderer only asks a
//! window for its current pixel size and pixel density, and whether it is
//! minimized.

use std::sync::Arc;

/// A presentation target.
#[derive(Debug, Clone)]
pub enum RenderWindow {
    /// No window; frames are rendered into an off-screen texture.
    Headless {
        width: u32,
        height: u32,
        pixel_density: f32,
        minimized: bool,
    },
    /// A winit window.
    Winit(Arc<winit::window::Window>),
}

impl RenderWindow {
    /// Off-screen target of `width` by `height` pixels.
    pub fn headless(width: u32, height: u32) -> Self {
        Self::Headless {
            width,
            height,
            pixel_density: 1.0,
            minimized: false,
        }
    }

    pub fn winit(window: Arc<winit::window::Window>) -> Self {
        Self::Winit(window)
    }

    /// Current size in physical pixels.
    pub fn size_in_pixels(&self) -> (u32, u32) {
        match self {
            Self::Headless { width, height, .. } => (*width, *height),
            Self::Winit(window) => {
                let size = window.inner_size();
                (size.width, size.height)
            }
        }
    }

    /// Ratio of physical pixels to logical points.
    pub fn pixel_density(&self) -> f32 {
        match self {
            Self::Headless { pixel_density, .. } => *pixel_density,
            Self::Winit(window) => window.scale_factor() as f32,
        }
    }

    /// Whether no frame can be presented right now.
    pub fn is_minimized(&self) -> bool {
        match self {
            Self::Headless {
                width,
                height,
                minimized,
                ..
            } => *minimized || *width == 0 || *height == 0,
            Self::Winit(window) => {
                let size = window.inner_size();
                window.is_minimized().unwrap_or(false) || size.width == 0 || size.height == 0
            }
        }
    }

    /// Mark a headless window minimized or restored. No-op for real windows.
    pub fn set_minimized(&mut self, value: bool) {
        if let Self::Headless { minimized, .. } = self {
            *minimized = value;
        }
    }

    /// Resize a headless window. No-op for real windows.
    pub fn set_size(&mut self, new_width: u32, new_height: u32) {
        if let Self::Headless { width, height, .. } = self {
            *width = new_width;
            *height = new_height;
        }
    }

    pub fn is_headless(&self) -> bool {
        matches!(self, Self::Headless { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_window() {
        let mut window = RenderWindow::headless(320, 240);
        assert_eq!(window.size_in_pixels(), (320, 240));
        assert_eq!(window.pixel_density(), 1.0);
        assert!(!window.is_minimized());

        window.set_minimized(true);
        assert!(window.is_minimized());
        window.set_minimized(false);
        window.set_size(0, 240);
        assert!(window.is_minimized());
    }
}
