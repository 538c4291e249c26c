//! Meshes sharing one pair of master buffers.

use std::sync::Arc;

use umbra_core::material::PbrMaterialData;
use umbra_core::mesh::{MeshData, MeshDataView};

use crate::device::Device;
use crate::error::GraphicsError;
use crate::resources::{Buffer, BufferRef, TransferBuffer, TransferDirection};
use crate::types::BufferDescriptor;

use super::upload::check_mesh_data;
use super::{Mesh, MeshView};

/// Offset of each size in a concatenation of all of them, plus the total.
fn prefix_offsets(sizes: impl IntoIterator<Item = u64>) -> (Vec<u64>, u64) {
    let mut total = 0;
    let offsets = sizes
        .into_iter()
        .map(|size| {
            let offset = total;
            total += size;
            offset
        })
        .collect();
    (offsets, total)
}

/// A batch of meshes created against one master vertex buffer and one master
/// index buffer.
///
/// Submesh `i` starts at the sum of the byte sizes of submeshes `0..i`, in
/// the order they were given. The meshes borrow the master buffers; only the
/// group releases them.
#[derive(Debug)]
pub struct MeshGroup {
    vertex_buffer: Buffer,
    index_buffer: Option<Buffer>,
    meshes: Vec<Mesh>,
    materials: Vec<PbrMaterialData>,
    vertex_offsets: Vec<u64>,
    index_offsets: Vec<u64>,
}

impl MeshGroup {
    /// Allocate the master buffers and the borrowing submeshes. Nothing is
    /// uploaded yet.
    ///
    /// Every submesh must use the same single-binding layout.
    pub fn new(device: &Arc<Device>, data: &[MeshDataView<'_>]) -> Result<Self, GraphicsError> {
        let Some(first) = data.first() else {
            return Err(GraphicsError::InvalidParameter(
                "mesh group needs at least one mesh".to_string(),
            ));
        };
        for (i, mesh) in data.iter().enumerate() {
            check_mesh_data(mesh)?;
            if mesh.layout != first.layout {
                return Err(GraphicsError::InvalidParameter(format!(
                    "mesh group submesh {i} does not share the layout of submesh 0"
                )));
            }
        }

        let (vertex_offsets, vertex_total) =
            prefix_offsets(data.iter().map(|m| m.vertex_bytes.len() as u64));
        let (index_offsets, index_total) =
            prefix_offsets(data.iter().map(|m| m.index_bytes().len() as u64));

        let vertex_buffer = device.create_buffer(
            &BufferDescriptor::mesh_vertices(vertex_total).with_label("mesh group vertices"),
        )?;
        let index_buffer = if index_total > 0 {
            Some(device.create_buffer(
                &BufferDescriptor::mesh_indices(index_total).with_label("mesh group indices"),
            )?)
        } else {
            None
        };

        let meshes = data
            .iter()
            .enumerate()
            .map(|(i, view)| {
                let mut mesh = Mesh::new(view.layout.clone(), view.topology, view.num_vertices());
                let slot = view.layout.bindings()[0].slot;
                mesh.bind_vertex_buffer(slot, vertex_buffer.share(), vertex_offsets[i]);
                if let (true, Some(index_buffer)) = (view.is_indexed(), &index_buffer) {
                    let offset = index_offsets[i];
                    mesh.set_index_buffer(index_buffer.share(), offset, view.num_indices());
                }
                mesh
            })
            .collect();

        log::debug!(
            "created mesh group: {} meshes, {vertex_total} vertex bytes, {index_total} index bytes",
            data.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            meshes,
            materials: data.iter().map(|m| *m.material).collect(),
            vertex_offsets,
            index_offsets,
        })
    }

    /// [`new`](Self::new) for owning mesh data.
    pub fn from_mesh_data(device: &Arc<Device>, data: &[MeshData]) -> Result<Self, GraphicsError> {
        let views: Vec<_> = data.iter().map(MeshData::as_view).collect();
        Self::new(device, &views)
    }

    /// [`new`](Self::new) followed by [`upload`](Self::upload).
    pub fn create_and_upload(
        device: &Arc<Device>,
        data: &[MeshDataView<'_>],
    ) -> Result<Self, GraphicsError> {
        let group = Self::new(device, data)?;
        group.upload(data)?;
        Ok(group)
    }

    /// Upload every submesh through one transfer buffer and one submission.
    ///
    /// `data` must be the same meshes, in the same order, the group was
    /// created from.
    pub fn upload(&self, data: &[MeshDataView<'_>]) -> Result<(), GraphicsError> {
        let (vertex_offsets, vertex_total) =
            prefix_offsets(data.iter().map(|m| m.vertex_bytes.len() as u64));
        let (index_offsets, index_total) =
            prefix_offsets(data.iter().map(|m| m.index_bytes().len() as u64));
        let index_capacity = self.index_buffer.as_ref().map_or(0, Buffer::size);
        if vertex_offsets != self.vertex_offsets
            || index_offsets != self.index_offsets
            || vertex_total != self.vertex_buffer.size()
            || index_total != index_capacity
        {
            return Err(GraphicsError::InvalidParameter(
                "mesh data does not match the meshes the group was created from".to_string(),
            ));
        }
        if self.vertex_buffer.is_released() {
            return Err(GraphicsError::InvalidState(
                "upload into a released mesh group".to_string(),
            ));
        }

        let device = self.vertex_buffer.device();
        let transfer =
            TransferBuffer::new(device, TransferDirection::Upload, vertex_total + index_total)?;
        for (i, mesh) in data.iter().enumerate() {
            transfer.write(vertex_offsets[i], mesh.vertex_bytes)?;
            if mesh.is_indexed() {
                transfer.write(vertex_total + index_offsets[i], mesh.index_bytes())?;
            }
        }

        let mut cmd = device.acquire_command_buffer();
        {
            let mut copy = cmd.begin_copy_pass()?;
            copy.upload_to_buffer(&transfer, 0, &self.vertex_buffer.share(), 0, vertex_total);
            if let Some(index_buffer) = &self.index_buffer {
                copy.upload_to_buffer(
                    &transfer,
                    vertex_total,
                    &index_buffer.share(),
                    0,
                    index_total,
                );
            }
        }
        cmd.submit()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn mesh(&self, index: usize) -> Option<&Mesh> {
        self.meshes.get(index)
    }

    /// Material of each submesh, in creation order.
    pub fn materials(&self) -> &[PbrMaterialData] {
        &self.materials
    }

    /// Byte offset of submesh `index` in the master vertex buffer.
    pub fn vertex_offset(&self, index: usize) -> u64 {
        self.vertex_offsets[index]
    }

    /// Byte offset of submesh `index` in the master index buffer.
    pub fn index_offset(&self, index: usize) -> u64 {
        self.index_offsets[index]
    }

    pub fn vertex_buffer(&self) -> BufferRef {
        self.vertex_buffer.share()
    }

    pub fn index_buffer(&self) -> Option<BufferRef> {
        self.index_buffer.as_ref().map(Buffer::share)
    }

    /// One full view per submesh. They share buffers, so they can be drawn
    /// with [`draw_views`](super::draw_views).
    pub fn views(&self) -> Vec<MeshView> {
        self.meshes.iter().map(Mesh::view).collect()
    }

    /// Free the master buffers. Safe to call more than once.
    pub fn release(&mut self) {
        self.vertex_buffer.release();
        if let Some(index_buffer) = &mut self.index_buffer {
            index_buffer.release();
        }
    }
}
