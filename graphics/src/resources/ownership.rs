//! Owned-or-borrowed resource slots.

use super::{Buffer, BufferRef, Texture, TextureRef};

/// A GPU resource with an owning handle and a shareable non-owning handle.
pub trait GpuResource {
    /// Non-owning handle type.
    type Ref: Clone;

    /// Hand out a non-owning handle.
    fn share(&self) -> Self::Ref;

    /// Free the resource. Must be idempotent.
    fn release(&mut self);
}

impl GpuResource for Buffer {
    type Ref = BufferRef;

    fn share(&self) -> BufferRef {
        Buffer::share(self)
    }

    fn release(&mut self) {
        Buffer::release(self)
    }
}

impl GpuResource for Texture {
    type Ref = TextureRef;

    fn share(&self) -> TextureRef {
        Texture::share(self)
    }

    fn release(&mut self) {
        Texture::release(self)
    }
}

/// A resource slot that either owns its resource or borrows it from
/// somewhere else.
///
/// Used where one container mixes both, e.g. a mesh whose vertex buffer is
/// its own but whose index buffer belongs to a shared group.
#[derive(Debug)]
pub enum MaybeOwned<R: GpuResource> {
    /// This slot frees the resource on release.
    Owned(R),
    /// Another owner frees the resource; release is a no-op.
    Borrowed(R::Ref),
}

impl<R: GpuResource> MaybeOwned<R> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Non-owning handle to the resource, whichever way it is held.
    pub fn share(&self) -> R::Ref {
        match self {
            Self::Owned(resource) => resource.share(),
            Self::Borrowed(resource) => resource.clone(),
        }
    }

    /// Release the resource if this slot owns it.
    pub fn release(&mut self) {
        if let Self::Owned(resource) = self {
            resource.release();
        }
    }
}

impl<R: GpuResource> From<R> for MaybeOwned<R> {
    fn from(resource: R) -> Self {
        Self::Owned(resource)
    }
}

impl From<BufferRef> for MaybeOwned<Buffer> {
    fn from(buffer: BufferRef) -> Self {
        Self::Borrowed(buffer)
    }
}

impl From<TextureRef> for MaybeOwned<Texture> {
    fn from(texture: TextureRef) -> Self {
        Self::Borrowed(texture)
    }
}

impl MaybeOwned<Buffer> {
    pub fn size(&self) -> u64 {
        match self {
            Self::Owned(buffer) => buffer.size(),
            Self::Borrowed(buffer) => buffer.size(),
        }
    }

    pub fn is_released(&self) -> bool {
        match self {
            Self::Owned(buffer) => buffer.is_released(),
            Self::Borrowed(buffer) => buffer.is_released(),
        }
    }
}

impl MaybeOwned<Texture> {
    pub fn format(&self) -> crate::types::TextureFormat {
        match self {
            Self::Owned(texture) => texture.format(),
            Self::Borrowed(texture) => texture.format(),
        }
    }

    pub fn is_released(&self) -> bool {
        match self {
            Self::Owned(texture) => texture.is_released(),
            Self::Borrowed(texture) => texture.is_released(),
        }
    }
}
