//! Typed vertex structs.
//!
//! A [`Vertex`] is a plain-old-data struct whose in-memory size equals the
//! stride its [`MeshLayout`] declares for binding 0.

use bytemuck::{Pod, Zeroable};

use super::layout::{MeshLayout, VertexAttrib, VertexElementFormat};

/// A plain-old-data vertex type with a known layout.
pub trait Vertex: Pod {
    /// Layout describing this vertex type in binding slot 0.
    fn layout() -> MeshLayout;
}

/// Position-only vertex, used by depth-only and debug geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PositionVertex {
    pub position: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<PositionVertex>() == 12);

impl PositionVertex {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z],
        }
    }
}

impl Vertex for PositionVertex {
    fn layout() -> MeshLayout {
        MeshLayout::new().add_binding(0, 12).add_attribute(
            VertexAttrib::Position,
            0,
            VertexElementFormat::Float3,
            0,
        )
    }
}

/// Position, normal and color, each field aligned to 16 bytes.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct DefaultVertex {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub normal: [f32; 3],
    pub _pad1: f32,
    pub color: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<DefaultVertex>() == 48);

impl DefaultVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            _pad0: 0.0,
            normal,
            _pad1: 0.0,
            color,
        }
    }
}

impl Vertex for DefaultVertex {
    fn layout() -> MeshLayout {
        MeshLayout::new()
            .add_binding(0, 48)
            .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
            .add_attribute(VertexAttrib::Normal, 0, VertexElementFormat::Float3, 16)
            .add_attribute(VertexAttrib::Color0, 0, VertexElementFormat::Float4, 32)
    }
}

/// Position and color, for lines and points.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub color: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<ColorVertex>() == 32);

impl ColorVertex {
    pub fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self {
            position,
            _pad0: 0.0,
            color,
        }
    }
}

impl Vertex for ColorVertex {
    fn layout() -> MeshLayout {
        MeshLayout::new()
            .add_binding(0, 32)
            .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
            .add_attribute(VertexAttrib::Color0, 0, VertexElementFormat::Float4, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check<V: Vertex>() {
        let layout = V::layout();
        assert_eq!(std::mem::size_of::<V>(), layout.vertex_size() as usize);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_vertex_sizes_match_layouts() {
        check::<PositionVertex>();
        check::<DefaultVertex>();
        check::<ColorVertex>();
    }
}
