//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used throughout the graphics system.

mod buffer;
mod common;
mod pipeline;
mod sampler;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, COPY_BUFFER_ALIGNMENT};
pub use common::{Color, CompareFunction, Extent3d, LoadOp, StoreOp, Viewport};
pub use pipeline::{
    BlendState, ColorTargetDescription, CullMode, DepthBias, DepthStencilState, FrontFace,
    RasterizerState,
};
pub use sampler::{AddressMode, FilterMode, SamplerDescriptor};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
