//! The path from CPU mesh data to GPU buffers.

use std::sync::Arc;

use umbra_core::mesh::MeshDataView;

use crate::device::Device;
use crate::error::GraphicsError;
use crate::resources::{BufferRef, TransferBuffer, TransferDirection};
use crate::types::BufferDescriptor;

use super::Mesh;

/// Check that `data` can be placed in GPU buffers.
pub(super) fn check_mesh_data(data: &MeshDataView<'_>) -> Result<(), GraphicsError> {
    data.layout
        .validate()
        .map_err(|e| GraphicsError::InvalidParameter(format!("mesh data: {e}")))?;
    // One CPU stream fills one vertex buffer; any other slot would stay unbound.
    if data.layout.num_bindings() != 1 {
        return Err(GraphicsError::InvalidParameter(format!(
            "mesh data: layout has {} vertex bindings, expected 1",
            data.layout.num_bindings()
        )));
    }
    let stride = data.layout.vertex_size() as usize;
    if data.vertex_bytes.is_empty() {
        return Err(GraphicsError::InvalidParameter(
            "mesh data has no vertices".to_string(),
        ));
    }
    if stride == 0 || data.vertex_bytes.len() % stride != 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "mesh data: {} vertex bytes is not a whole number of {stride}-byte vertices",
            data.vertex_bytes.len()
        )));
    }
    if data.vertex_bytes.len() % 4 != 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "mesh data: {} vertex bytes is not a multiple of 4",
            data.vertex_bytes.len()
        )));
    }
    Ok(())
}

/// Allocate vertex and index buffers sized exactly to `data` and return a
/// mesh that owns them. Nothing is uploaded yet.
///
/// The vertex buffer is bound to the layout's first binding; any further
/// bindings are left for the caller.
pub fn create_mesh<'a>(
    device: &Arc<Device>,
    data: impl Into<MeshDataView<'a>>,
) -> Result<Mesh, GraphicsError> {
    let data = data.into();
    check_mesh_data(&data)?;

    let slot = data.layout.bindings()[0].slot;
    let vertex_buffer = device.create_buffer(
        &BufferDescriptor::mesh_vertices(data.vertex_bytes.len() as u64)
            .with_label("mesh vertices"),
    )?;
    let mut mesh = Mesh::new(data.layout.clone(), data.topology, data.num_vertices());
    mesh.bind_vertex_buffer(slot, vertex_buffer, 0);

    if data.is_indexed() {
        let index_buffer = device.create_buffer(
            &BufferDescriptor::mesh_indices(data.index_bytes().len() as u64)
                .with_label("mesh indices"),
        )?;
        mesh.set_index_buffer(index_buffer, 0, data.num_indices());
    }

    log::trace!(
        "created mesh: {} vertices, {} indices",
        data.num_vertices(),
        data.num_indices()
    );
    Ok(mesh)
}

/// Copy `data` into the buffers of `mesh`.
///
/// Stages vertex bytes at offset 0 and index bytes right after them in one
/// transfer buffer, then records both copies in one copy pass and submits
/// once. Does not wait for the copy to finish.
pub fn upload_mesh_to_device<'a>(
    device: &Arc<Device>,
    mesh: &Mesh,
    data: impl Into<MeshDataView<'a>>,
) -> Result<(), GraphicsError> {
    let data = data.into();
    check_mesh_data(&data)?;

    let slot = data.layout.bindings()[0].slot;
    let (Some(vertex_buffer), Some(vertex_offset)) =
        (mesh.vertex_buffer(slot), mesh.vertex_offset(slot))
    else {
        return Err(GraphicsError::InvalidState(format!(
            "mesh has no vertex buffer bound to slot {slot}"
        )));
    };
    let vertex_bytes = data.vertex_bytes;
    let index_bytes = data.index_bytes();
    check_fits(&vertex_buffer, vertex_offset, vertex_bytes.len())?;

    let index_target = if data.is_indexed() {
        let (Some(buffer), Some(offset)) = (mesh.index_buffer(), mesh.index_offset()) else {
            return Err(GraphicsError::InvalidState(
                "indexed mesh data uploaded to a mesh without an index buffer".to_string(),
            ));
        };
        check_fits(&buffer, offset, index_bytes.len())?;
        Some((buffer, offset))
    } else {
        None
    };

    let vertex_len = vertex_bytes.len() as u64;
    let index_len = index_bytes.len() as u64;
    let transfer = TransferBuffer::new(device, TransferDirection::Upload, vertex_len + index_len)?;
    transfer.write(0, vertex_bytes)?;
    if index_target.is_some() {
        transfer.write(vertex_len, index_bytes)?;
    }

    let mut cmd = device.acquire_command_buffer();
    {
        let mut copy = cmd.begin_copy_pass()?;
        copy.upload_to_buffer(&transfer, 0, &vertex_buffer, vertex_offset, vertex_len);
        if let Some((buffer, offset)) = &index_target {
            copy.upload_to_buffer(&transfer, vertex_len, buffer, *offset, index_len);
        }
    }
    cmd.submit()
}

/// [`create_mesh`] followed by [`upload_mesh_to_device`].
pub fn create_and_upload_mesh<'a>(
    device: &Arc<Device>,
    data: impl Into<MeshDataView<'a>>,
) -> Result<Mesh, GraphicsError> {
    let data = data.into();
    let mesh = create_mesh(device, data)?;
    upload_mesh_to_device(device, &mesh, data)?;
    Ok(mesh)
}

fn check_fits(buffer: &BufferRef, offset: u64, len: usize) -> Result<(), GraphicsError> {
    if buffer.is_released() {
        return Err(GraphicsError::InvalidState(format!(
            "upload into released buffer '{}'",
            buffer.label()
        )));
    }
    if offset + len as u64 > buffer.size() {
        return Err(GraphicsError::InvalidParameter(format!(
            "upload of {len} bytes at offset {offset} overflows buffer '{}' ({} bytes)",
            buffer.label(),
            buffer.size()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use umbra_core::mesh::{
        MeshData, PositionVertex, PrimitiveTopology, VertexAttrib, VertexElementFormat,
    };

    use super::*;
    use crate::device::DeviceDescriptor;

    fn device() -> Arc<Device> {
        Device::new(DeviceDescriptor::dummy()).unwrap()
    }

    fn quad() -> MeshData {
        MeshData::new(
            PrimitiveTopology::TriangleList,
            &[
                PositionVertex::new(0.0, 0.0, 0.0),
                PositionVertex::new(1.0, 0.0, 0.0),
                PositionVertex::new(1.0, 1.0, 0.0),
                PositionVertex::new(0.0, 1.0, 0.0),
            ],
            &[0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_buffers_sized_exactly() {
        let device = device();
        let data = quad();
        let mesh = create_mesh(&device, &data).unwrap();
        assert_eq!(mesh.vertex_buffer(0).unwrap().size(), 48);
        assert_eq!(mesh.index_buffer().unwrap().size(), 24);
        assert!(mesh.owns_vertex_buffer(0));
        assert!(mesh.owns_index_buffer());
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_indices(), 6);
    }

    #[test]
    fn test_non_indexed_mesh_has_no_index_buffer() {
        let device = device();
        let data = MeshData::new(
            PrimitiveTopology::PointList,
            &[PositionVertex::new(0.0, 0.0, 0.0)],
            &[],
        );
        let mesh = create_mesh(&device, &data).unwrap();
        assert!(!mesh.is_indexed());
        assert_eq!(device.live_buffer_count(), 1);
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let device = device();
        let data = MeshData::new::<PositionVertex>(PrimitiveTopology::TriangleList, &[], &[]);
        assert!(matches!(
            create_mesh(&device, &data),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_multi_binding_layout_is_rejected() {
        let device = device();
        let data = quad();
        let layout = data.layout().clone().add_binding(1, 4).add_attribute(
            VertexAttrib::TexCoord1,
            1,
            VertexElementFormat::Float,
            0,
        );
        let view = MeshDataView {
            layout: &layout,
            ..data.as_view()
        };
        assert!(matches!(
            create_mesh(&device, view),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(device.live_buffer_count(), 0);

        let mesh = create_mesh(&device, &data).unwrap();
        assert!(matches!(
            upload_mesh_to_device(&device, &mesh, view),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_upload_into_released_mesh_fails() {
        let device = device();
        let data = quad();
        let mut mesh = create_mesh(&device, &data).unwrap();
        mesh.release_owned_buffers();
        assert!(matches!(
            upload_mesh_to_device(&device, &mesh, &data),
            Err(GraphicsError::InvalidState(_))
        ));
    }

    #[test]
    fn test_upload_then_read_back() {
        let device = device();
        let data = quad();
        let mesh = create_and_upload_mesh(&device, &data).unwrap();

        let download = TransferBuffer::new(&device, TransferDirection::Download, 72).unwrap();
        let mut cmd = device.acquire_command_buffer();
        {
            let mut copy = cmd.begin_copy_pass().unwrap();
            copy.download_from_buffer(&mesh.vertex_buffer(0).unwrap(), 0, &download, 0, 48);
            copy.download_from_buffer(&mesh.index_buffer().unwrap(), 0, &download, 48, 24);
        }
        cmd.submit_and_acquire_fence().unwrap().wait().unwrap();

        assert_eq!(download.read(0, 48).unwrap(), data.vertex_bytes());
        assert_eq!(download.read(48, 24).unwrap(), data.index_bytes());
    }
}
