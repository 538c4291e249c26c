//! CPU-side mesh data handed from loaders to the upload path.

use crate::bounds::Aabb;
use crate::material::PbrMaterialData;
use crate::math::Vec3;

use super::blob::VertexDataBlob;
use super::layout::{MeshLayout, VertexAttrib, VertexElementFormat};
use super::vertex::Vertex;
use super::MeshDataError;

/// Index element type used by all meshes.
pub type IndexType = u32;

/// Primitive topology describing how vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    /// Vertices per primitive, or `None` for strips.
    pub fn vertices_per_primitive(&self) -> Option<u32> {
        match self {
            Self::PointList => Some(1),
            Self::LineList => Some(2),
            Self::TriangleList => Some(3),
            Self::LineStrip | Self::TriangleStrip => None,
        }
    }
}

/// Owning CPU mesh: topology, vertex blob, optional indices and a material.
///
/// Cloning copies every byte, so it only happens when asked for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub topology: PrimitiveTopology,
    pub vertex_data: VertexDataBlob,
    pub index_data: Vec<IndexType>,
    pub material: PbrMaterialData,
}

impl MeshData {
    /// Build from typed vertices and (possibly empty) indices.
    pub fn new<V: Vertex>(
        topology: PrimitiveTopology,
        vertices: &[V],
        indices: &[IndexType],
    ) -> Self {
        Self {
            topology,
            vertex_data: VertexDataBlob::from_vertices(vertices),
            index_data: indices.to_vec(),
            material: PbrMaterialData::default(),
        }
    }

    /// Build from raw vertex bytes described by `layout`.
    pub fn from_bytes(
        topology: PrimitiveTopology,
        layout: MeshLayout,
        vertex_bytes: Vec<u8>,
        num_vertices: u32,
        indices: Vec<IndexType>,
    ) -> Result<Self, MeshDataError> {
        Ok(Self {
            topology,
            vertex_data: VertexDataBlob::from_bytes(vertex_bytes, layout, num_vertices)?,
            index_data: indices,
            material: PbrMaterialData::default(),
        })
    }

    pub fn with_material(mut self, material: PbrMaterialData) -> Self {
        self.material = material;
        self
    }

    pub fn layout(&self) -> &MeshLayout {
        self.vertex_data.layout()
    }

    pub fn num_vertices(&self) -> u32 {
        self.vertex_data.num_vertices()
    }

    pub fn num_indices(&self) -> u32 {
        self.index_data.len() as u32
    }

    pub fn is_indexed(&self) -> bool {
        !self.index_data.is_empty()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        self.vertex_data.bytes()
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.index_data)
    }

    pub fn as_view(&self) -> MeshDataView<'_> {
        MeshDataView::from(self)
    }

    /// See [`MeshDataView::bounds`].
    pub fn bounds(&self) -> Aabb {
        self.as_view().bounds()
    }
}

/// Borrowed counterpart of [`MeshData`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDataView<'a> {
    pub topology: PrimitiveTopology,
    pub layout: &'a MeshLayout,
    pub vertex_bytes: &'a [u8],
    pub index_data: &'a [IndexType],
    pub material: &'a PbrMaterialData,
}

impl<'a> From<&'a MeshData> for MeshDataView<'a> {
    fn from(data: &'a MeshData) -> Self {
        Self {
            topology: data.topology,
            layout: data.layout(),
            vertex_bytes: data.vertex_bytes(),
            index_data: &data.index_data,
            material: &data.material,
        }
    }
}

impl MeshDataView<'_> {
    pub fn num_vertices(&self) -> u32 {
        match self.layout.vertex_size() {
            0 => 0,
            stride => (self.vertex_bytes.len() / stride as usize) as u32,
        }
    }

    pub fn num_indices(&self) -> u32 {
        self.index_data.len() as u32
    }

    pub fn is_indexed(&self) -> bool {
        !self.index_data.is_empty()
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.index_data)
    }

    /// Vertex positions, read from a `Float3` position attribute of the
    /// first binding. Empty when there is no such attribute.
    pub fn positions(&self) -> Vec<Vec3> {
        let Some(attribute) = self.layout.attribute(VertexAttrib::Position) else {
            return Vec::new();
        };
        let first_slot = self.layout.bindings().first().map(|b| b.slot);
        if attribute.format != VertexElementFormat::Float3
            || Some(attribute.binding) != first_slot
        {
            return Vec::new();
        }
        let stride = self.layout.vertex_size() as usize;
        let offset = attribute.offset as usize;
        if stride == 0 {
            return Vec::new();
        }
        self.vertex_bytes
            .chunks_exact(stride)
            .filter_map(|vertex| vertex.get(offset..offset + 12))
            .map(|bytes| {
                let xyz: [f32; 3] = bytemuck::pod_read_unaligned(bytes);
                Vec3::from(xyz)
            })
            .collect()
    }

    /// Bounding box of [`positions`](Self::positions).
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions().iter())
    }

    /// Copy the viewed data into an owning [`MeshData`].
    pub fn to_owned(&self) -> MeshData {
        MeshData {
            topology: self.topology,
            vertex_data: VertexDataBlob::from_bytes(
                self.vertex_bytes.to_vec(),
                self.layout.clone(),
                self.num_vertices(),
            )
            .unwrap_or_default(),
            index_data: self.index_data.to_vec(),
            material: *self.material,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::vertex::PositionVertex;

    fn triangle() -> MeshData {
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

    #[test]
    fn test_counts() {
        let data = triangle();
        assert_eq!(data.num_vertices(), 3);
        assert_eq!(data.num_indices(), 0);
        assert!(!data.is_indexed());
        assert_eq!(data.vertex_bytes().len(), 36);
    }

    #[test]
    fn test_bounds_from_positions() {
        let bounds = triangle().bounds();
        assert_eq!(bounds.min, Vec3::zeros());
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_bounds_skip_padding() {
        use crate::mesh::vertex::DefaultVertex;
        let data = MeshData::new(
            PrimitiveTopology::PointList,
            &[
                DefaultVertex::new([-1.0, 2.0, 0.5], [0.0, 0.0, 1.0], [1.0; 4]),
                DefaultVertex::new([3.0, -2.0, 0.0], [0.0, 0.0, 1.0], [1.0; 4]),
            ],
            &[],
        );
        let bounds = data.bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(3.0, 2.0, 0.5));
    }

    #[test]
    fn test_index_bytes_are_u32() {
        let mut data = triangle();
        data.index_data = vec![0, 1, 2];
        assert!(data.is_indexed());
        assert_eq!(data.index_bytes().len(), 12);
        assert_eq!(&data.index_bytes()[4..8], &1u32.to_ne_bytes());
    }

    #[test]
    fn test_view_to_owned_roundtrip() {
        let mut data = triangle();
        data.index_data = vec![2, 1, 0];
        let view = data.as_view();
        assert_eq!(view.num_vertices(), 3);
        assert_eq!(view.to_owned(), data);
    }

    #[test]
    fn test_topology_vertices_per_primitive() {
        assert_eq!(PrimitiveTopology::LineList.vertices_per_primitive(), Some(2));
        assert_eq!(PrimitiveTopology::TriangleStrip.vertices_per_primitive(), None);
    }
}
