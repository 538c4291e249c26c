//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`Device`]:
//! - [`Buffer`] / [`BufferRef`] - GPU memory buffer, owning and non-owning
//! - [`Texture`] / [`TextureRef`] - GPU texture, owning and non-owning
//! - [`Sampler`] - Texture sampler
//! - [`TransferBuffer`] - Mappable staging buffer for uploads and downloads
//!
//! Owning handles free their GPU resource on [`release`](Buffer::release) or
//! drop; both are idempotent. The `*Ref` handles produced by `share()` never
//! free anything. [`MaybeOwned`] holds either kind where one container mixes
//! them.
//!
//! [`Device`]: crate::Device

mod buffer;
mod ownership;
mod sampler;
mod texture;
mod transfer;

pub use buffer::{Buffer, BufferRef};
pub use ownership::{GpuResource, MaybeOwned};
pub use sampler::Sampler;
pub use texture::{Texture, TextureRef};
pub use transfer::{TransferBuffer, TransferDirection};
