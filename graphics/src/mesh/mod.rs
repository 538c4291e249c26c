//! GPU meshes.
//!
//! - [`Mesh`] - vertex buffers bound to the slots of a [`MeshLayout`], plus an
//!   optional index buffer; each buffer is owned or borrowed
//! - [`MeshView`] - a non-owning sub-range of a mesh's buffers, drawn on its
//!   own or batched with [`draw_views`]
//! - [`MeshGroup`] - many meshes sharing one master vertex buffer and one
//!   master index buffer
//! - [`create_mesh`] / [`upload_mesh_to_device`] - the path from CPU
//!   [`MeshData`] to GPU buffers
//!
//! The CPU-side types come from `umbra-core` and are re-exported here.

mod group;
mod gpu;
mod upload;

pub use group::MeshGroup;
pub use gpu::{Mesh, MeshView, draw_views};
pub use upload::{create_and_upload_mesh, create_mesh, upload_mesh_to_device};

pub use umbra_core::mesh::{
    ColorVertex, DefaultVertex, IndexType, MeshData, MeshDataError, MeshDataView, MeshLayout,
    PositionVertex, PrimitiveTopology, Vertex, VertexAttrib, VertexAttribute, VertexBinding,
    VertexDataBlob, VertexElementFormat, VertexInputState, VertexStepMode,
};
