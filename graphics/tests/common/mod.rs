//! Common utilities for renderer integration tests.
//!
//! Tests are parameterized over [`Backend`] with `rstest`; a backend that
//! cannot be created on this machine (no adapter, headless CI) is skipped.

#![allow(dead_code)]

use std::sync::Arc;

use umbra_core::mesh::{MeshData, PositionVertex, PrimitiveTopology};
use umbra_graphics::mesh::create_and_upload_mesh;
use umbra_graphics::{
    BackendType, Device, DeviceDescriptor, Mesh, RenderWindow, Renderer, Texture,
    TextureDescriptor, TextureFormat, TextureUsage,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends the tests run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU reference backend, always available.
    Dummy,
    /// wgpu on whatever adapter the machine has.
    WebGpu,
}

impl Backend {
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => true,
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::WebGpu => "webgpu",
        }
    }

    pub fn to_descriptor(self) -> DeviceDescriptor {
        let backend = match self {
            Backend::Dummy => BackendType::Dummy,
            Backend::WebGpu => BackendType::Wgpu,
        };
        DeviceDescriptor::new()
            .with_label(format!("{} test device", self.name()))
            .with_backend(backend)
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A device on one backend plus helpers for the usual test resources.
pub struct TestContext {
    pub backend: Backend,
    pub device: Arc<Device>,
}

impl TestContext {
    /// Create a context, or `None` if the backend is not available here.
    pub fn new(backend: Backend) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        if !backend.is_available() {
            return None;
        }
        let device = match Device::new(backend.to_descriptor()) {
            Ok(device) => device,
            Err(err) => {
                eprintln!("{} backend unavailable: {err}", backend.name());
                return None;
            }
        };
        Some(Self { backend, device })
    }

    /// Headless renderer of `width` by `height` pixels.
    pub fn renderer(&self, width: u32, height: u32) -> Renderer {
        Renderer::new(Arc::clone(&self.device), RenderWindow::headless(width, height))
            .expect("failed to create headless renderer")
    }

    /// Readable `Depth32Float` render target.
    pub fn depth_target(&self, width: u32, height: u32) -> Texture {
        self.device
            .create_texture(
                &TextureDescriptor::new_2d(
                    width,
                    height,
                    TextureFormat::Depth32Float,
                    TextureUsage::RENDER_ATTACHMENT
                        | TextureUsage::TEXTURE_BINDING
                        | TextureUsage::COPY_SRC,
                )
                .with_label("test depth"),
            )
            .expect("failed to create depth target")
    }

    pub fn upload(&self, data: &MeshData) -> Mesh {
        create_and_upload_mesh(&self.device, data).expect("failed to upload mesh")
    }
}

// ============================================================================
// Test Data
// ============================================================================

/// The triangle `(0,0,0), (1,0,0), (0,1,0)`, unindexed.
pub fn corner_triangle() -> MeshData {
    MeshData::new(
        PrimitiveTopology::TriangleList,
        &[
            PositionVertex::new(0.0, 0.0, 0.0),
            PositionVertex::new(1.0, 0.0, 0.0),
            PositionVertex::new(0.0, 1.0, 0.0),
        ],
        &[],
    )
}

/// `count` position vertices along the X axis.
pub fn position_strip(count: usize) -> MeshData {
    let vertices: Vec<_> = (0..count)
        .map(|i| PositionVertex::new(i as f32, 0.0, 0.0))
        .collect();
    MeshData::new(PrimitiveTopology::TriangleList, &vertices, &[])
}
