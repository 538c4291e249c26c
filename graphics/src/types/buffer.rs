//! Buffer usage flags and descriptors.
//!
//! Buffers in umbra are mesh storage (vertices, indices), uniform blocks, or
//! CPU-visible staging for uploads and readback. [`BufferDescriptor::validate`]
//! enforces the WebGPU combination rules on every backend, so a descriptor
//! the dummy backend accepts is also valid for wgpu.

use bitflags::bitflags;

use crate::error::GraphicsError;

/// Size and offset granularity for buffer copies and mapped ranges.
pub const COPY_BUFFER_ALIGNMENT: u64 = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const COPY_SRC = 1 << 3;
        const COPY_DST = 1 << 4;
        /// CPU readable after a download copy. Combines only with `COPY_DST`.
        const MAP_READ = 1 << 5;
        /// CPU writable staging. Combines only with `COPY_SRC`.
        const MAP_WRITE = 1 << 6;
    }
}

impl BufferUsage {
    /// Vertex storage filled by copies and readable back for checks.
    pub const MESH_VERTICES: Self = Self::VERTEX.union(Self::COPY_DST).union(Self::COPY_SRC);
    /// Index storage, same copy rules as [`MESH_VERTICES`](Self::MESH_VERTICES).
    pub const MESH_INDICES: Self = Self::INDEX.union(Self::COPY_DST).union(Self::COPY_SRC);
    /// Staging written on the CPU and copied into GPU buffers or textures.
    pub const UPLOAD_STAGING: Self = Self::MAP_WRITE.union(Self::COPY_SRC);
    /// Staging that GPU data is copied into and then read on the CPU.
    pub const DOWNLOAD_STAGING: Self = Self::MAP_READ.union(Self::COPY_DST);

    pub fn is_mappable(self) -> bool {
        self.intersects(Self::MAP_READ | Self::MAP_WRITE)
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// A buffer holding `size` bytes of interleaved vertices.
    pub fn mesh_vertices(size: u64) -> Self {
        Self::new(size, BufferUsage::MESH_VERTICES)
    }

    /// A buffer holding `size` bytes of `u32` indices.
    pub fn mesh_indices(size: u64) -> Self {
        Self::new(size, BufferUsage::MESH_INDICES)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label used in logs and diagnostics.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed buffer>")
    }

    /// Check the descriptor before it reaches a backend.
    ///
    /// Rejects an empty size or usage, map flags combined with anything but
    /// their copy direction, and mappable sizes that are not a multiple of
    /// [`COPY_BUFFER_ALIGNMENT`].
    pub fn validate(&self) -> Result<(), GraphicsError> {
        let label = self.display_label();
        if self.size == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{label}': size cannot be zero"
            )));
        }
        if self.usage.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{label}': usage cannot be empty"
            )));
        }
        let usage = self.usage;
        if usage.contains(BufferUsage::MAP_READ) && !BufferUsage::DOWNLOAD_STAGING.contains(usage)
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{label}': MAP_READ only combines with COPY_DST, got {usage:?}"
            )));
        }
        if usage.contains(BufferUsage::MAP_WRITE) && !BufferUsage::UPLOAD_STAGING.contains(usage) {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{label}': MAP_WRITE only combines with COPY_SRC, got {usage:?}"
            )));
        }
        if usage.is_mappable() && self.size % COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{label}': mappable size {} is not a multiple of {COPY_BUFFER_ALIGNMENT}",
                self.size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for usage in [
            BufferUsage::MESH_VERTICES,
            BufferUsage::MESH_INDICES,
            BufferUsage::UPLOAD_STAGING,
            BufferUsage::DOWNLOAD_STAGING,
            BufferUsage::UNIFORM,
        ] {
            assert!(BufferDescriptor::new(64, usage).validate().is_ok(), "{usage:?}");
        }
        assert!(BufferUsage::UPLOAD_STAGING.is_mappable());
        assert!(!BufferUsage::MESH_VERTICES.is_mappable());
    }

    #[test]
    fn test_map_flags_keep_their_copy_direction() {
        let mixed = BufferUsage::MAP_READ | BufferUsage::VERTEX;
        assert!(BufferDescriptor::new(64, mixed).validate().is_err());
        let crossed = BufferUsage::MAP_WRITE | BufferUsage::COPY_DST;
        assert!(BufferDescriptor::new(64, crossed).validate().is_err());
        assert!(BufferDescriptor::new(64, BufferUsage::MAP_READ).validate().is_ok());
    }

    #[test]
    fn test_size_rules() {
        let zero = BufferDescriptor::mesh_vertices(0).with_label("empty");
        match zero.validate() {
            Err(GraphicsError::InvalidParameter(msg)) => assert!(msg.contains("'empty'")),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
        assert!(BufferDescriptor::new(6, BufferUsage::UPLOAD_STAGING).validate().is_err());
        // Only mapped buffers are held to the copy alignment.
        assert!(BufferDescriptor::mesh_indices(6).validate().is_ok());
        assert!(BufferDescriptor::new(8, BufferUsage::empty()).validate().is_err());
    }
}
