//! Type-erased vertex storage.

use super::layout::MeshLayout;
use super::vertex::Vertex;
use super::MeshDataError;

/// Vertex bytes together with the layout that describes them.
///
/// The blob is one interleaved stream, so its layout has exactly one
/// binding. Built from a typed slice with [`from_vertices`](Self::from_vertices), or
/// from raw bytes for data whose layout is only known at runtime. Typed access
/// goes through `bytemuck`, so a mismatched vertex type is reported instead of
/// reinterpreted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VertexDataBlob {
    data: Vec<u8>,
    layout: MeshLayout,
    num_vertices: u32,
}

impl VertexDataBlob {
    /// Copy a slice of typed vertices.
    ///
    /// # Panics
    ///
    /// Panics if `V::layout()` declares more than one binding, or if
    /// `size_of::<V>()` differs from its stride.
    pub fn from_vertices<V: Vertex>(vertices: &[V]) -> Self {
        let layout = V::layout();
        assert_eq!(layout.num_bindings(), 1, "vertex types describe a single binding");
        assert_eq!(
            std::mem::size_of::<V>(),
            layout.vertex_size() as usize,
            "vertex type size does not match its layout stride"
        );
        Self {
            data: bytemuck::cast_slice(vertices).to_vec(),
            layout,
            num_vertices: vertices.len() as u32,
        }
    }

    /// Wrap raw bytes described by `layout`.
    ///
    /// Fails unless `layout` has exactly one binding and `data` holds
    /// `num_vertices` vertices of its stride.
    pub fn from_bytes(
        data: Vec<u8>,
        layout: MeshLayout,
        num_vertices: u32,
    ) -> Result<Self, MeshDataError> {
        if layout.num_bindings() != 1 {
            return Err(MeshDataError::InvalidLayout(format!(
                "vertex data blob needs exactly one binding, layout has {}",
                layout.num_bindings()
            )));
        }
        let expected = num_vertices as usize * layout.vertex_size() as usize;
        if data.len() != expected {
            return Err(MeshDataError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            layout,
            num_vertices,
        })
    }

    pub fn layout(&self) -> &MeshLayout {
        &self.layout
    }

    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    /// Raw vertex bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Borrow the data as typed vertices.
    ///
    /// Returns `None` when `V` does not match the stored layout stride or the
    /// storage is not suitably aligned for `V`.
    pub fn as_slice<V: Vertex>(&self) -> Option<&[V]> {
        if std::mem::size_of::<V>() != self.layout.vertex_size() as usize {
            return None;
        }
        bytemuck::try_cast_slice(&self.data).ok()
    }

    /// Copy the data out as typed vertices.
    pub fn to_vertices<V: Vertex>(&self) -> Result<Vec<V>, MeshDataError> {
        if std::mem::size_of::<V>() != self.layout.vertex_size() as usize {
            return Err(MeshDataError::SizeMismatch {
                expected: self.layout.vertex_size() as usize,
                actual: std::mem::size_of::<V>(),
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::layout::{VertexAttrib, VertexElementFormat};
    use crate::mesh::vertex::{DefaultVertex, PositionVertex};

    #[test]
    fn test_typed_roundtrip() {
        let verts = [
            PositionVertex::new(0.0, 0.0, 0.0),
            PositionVertex::new(1.0, 0.0, 0.0),
        ];
        let blob = VertexDataBlob::from_vertices(&verts);
        assert_eq!(blob.num_vertices(), 2);
        assert_eq!(blob.byte_len(), 24);
        assert_eq!(blob.to_vertices::<PositionVertex>().unwrap(), verts.to_vec());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let blob = VertexDataBlob::from_vertices(&[PositionVertex::default(); 4]);
        assert!(blob.as_slice::<DefaultVertex>().is_none());
        assert!(blob.to_vertices::<DefaultVertex>().is_err());
    }

    #[test]
    fn test_from_bytes_checks_length() {
        let layout = <PositionVertex as Vertex>::layout();
        assert!(VertexDataBlob::from_bytes(vec![0; 36], layout.clone(), 3).is_ok());
        assert!(VertexDataBlob::from_bytes(vec![0; 35], layout, 3).is_err());
    }

    #[test]
    fn test_from_bytes_rejects_extra_bindings() {
        let layout = <PositionVertex as Vertex>::layout().add_binding(1, 4).add_attribute(
            VertexAttrib::TexCoord1,
            1,
            VertexElementFormat::Float,
            0,
        );
        // 12 + 4 bytes per vertex would be the full payload for both streams.
        let result = VertexDataBlob::from_bytes(vec![0; 48], layout.clone(), 3);
        assert!(matches!(result, Err(MeshDataError::InvalidLayout(_))));
        assert!(VertexDataBlob::from_bytes(vec![0; 36], layout, 3).is_err());
    }

    #[test]
    fn test_from_bytes_rejects_empty_layout() {
        let result = VertexDataBlob::from_bytes(Vec::new(), MeshLayout::new(), 0);
        assert!(matches!(result, Err(MeshDataError::InvalidLayout(_))));
    }
}
