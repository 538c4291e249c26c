//! CPU-side mesh types.
//!
//! - [`MeshLayout`] - vertex bindings and attributes
//! - [`VertexDataBlob`] - vertex bytes tied to a layout
//! - [`MeshData`] / [`MeshDataView`] - what loaders hand to the upload path
//! - [`Vertex`] and a few stock vertex types
//! - [`generators`] for test and debug shapes
//!
//! These types are re-exported by `umbra-graphics`.

mod blob;
mod data;
pub mod generators;
mod layout;
mod vertex;

pub use blob::VertexDataBlob;
pub use data::{IndexType, MeshData, MeshDataView, PrimitiveTopology};
pub use layout::{
    MeshLayout, VertexAttrib, VertexAttribute, VertexBinding, VertexElementFormat,
    VertexInputState, VertexStepMode,
};
pub use vertex::{ColorVertex, DefaultVertex, PositionVertex, Vertex};

/// Errors raised while building CPU mesh data.
#[derive(Debug, thiserror::Error)]
pub enum MeshDataError {
    #[error("invalid mesh layout: {0}")]
    InvalidLayout(String),
    #[error("vertex data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}
