//! # umbra graphics
//!
//! A multi-pass renderer built on explicit command buffers.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Device`] - GPU resource creation over a [`backend`] (wgpu, or the
//!   CPU dummy backend used by tests)
//! - [`resources`] - owned and borrowed buffers and textures, transfer buffers
//! - [`CommandBuffer`] - recorded render and copy passes, submitted or
//!   cancelled exactly once
//! - [`mesh`] - GPU meshes, views and mesh groups uploaded from
//!   [`MeshData`](umbra_core::mesh::MeshData)
//! - [`Renderer`] - window, shared depth texture and the per-frame command
//!   buffer
//! - [`passes`] - depth pre-pass and directional shadow maps
//! - [`effects`] - SSAO and screen-space shadows
//! - [`scene`] - scenes that chain these passes into a frame
//!
//! ## Example
//!
//! ```ignore
//! use umbra_graphics::{Device, DeviceDescriptor, Renderer, RenderWindow};
//! use umbra_graphics::scene::{RobotScene, RobotSceneConfig, Scene};
//!
//! let device = Device::new(DeviceDescriptor::dummy())?;
//! let mut renderer = Renderer::new(device, RenderWindow::headless(640, 480))?;
//! let mut scene = RobotScene::new(&renderer, RobotSceneConfig::default())?;
//!
//! renderer.begin_frame()?;
//! if renderer.wait_and_acquire_swapchain()? {
//!     scene.render(&mut renderer, &camera)?;
//! }
//! renderer.end_frame()?;
//! ```

pub mod backend;
pub mod command;
pub mod device;
pub mod effects;
pub mod error;
pub mod mesh;
pub mod passes;
pub mod pipeline;
pub mod readback;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod types;
pub mod uniforms;
pub mod window;

pub use backend::BackendType;
pub use command::{
    ColorAttachment, CommandBuffer, CopyPass, DepthAttachment, RenderPass, RenderPassDescriptor,
};
pub use device::{Device, DeviceDescriptor};
pub use error::GraphicsError;
pub use mesh::{Mesh, MeshGroup, MeshView};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineDescriptor};
pub use renderer::Renderer;
pub use resources::{Buffer, BufferRef, Sampler, Texture, TextureRef, TransferBuffer};
pub use scene::Scene;
pub use types::{
    BufferDescriptor, BufferUsage, Color, Extent3d, SamplerDescriptor, TextureDescriptor,
    TextureFormat, TextureUsage,
};
pub use window::RenderWindow;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version and the available backends.
pub fn init() {
    log::info!(
        "umbra graphics v{VERSION} initialized (gpu backend: {})",
        backend::has_gpu_backend()
    );
}
