//! Mesh and MeshView.

use umbra_core::mesh::{MeshLayout, PrimitiveTopology};

use crate::command::RenderPass;
use crate::resources::{Buffer, BufferRef, MaybeOwned};

/// A buffer bound into a mesh at a byte offset.
#[derive(Debug)]
struct BoundBuffer {
    buffer: MaybeOwned<Buffer>,
    offset: u64,
}

/// GPU vertex buffers plus an optional `u32` index buffer.
///
/// There is one vertex buffer slot per binding declared in the layout. Each
/// slot owns its buffer or borrows it from a shared allocation such as a
/// [`MeshGroup`](super::MeshGroup); [`release_owned_buffers`](Self::release_owned_buffers)
/// only frees the owned ones.
#[derive(Debug)]
pub struct Mesh {
    layout: MeshLayout,
    topology: PrimitiveTopology,
    vertex_buffers: Vec<Option<BoundBuffer>>,
    index_buffer: Option<BoundBuffer>,
    num_vertices: u32,
    num_indices: u32,
    views: Vec<MeshView>,
}

impl Mesh {
    /// Create a mesh with no buffers bound yet.
    pub fn new(layout: MeshLayout, topology: PrimitiveTopology, num_vertices: u32) -> Self {
        let vertex_buffers = (0..layout.num_bindings()).map(|_| None).collect();
        Self {
            layout,
            topology,
            vertex_buffers,
            index_buffer: None,
            num_vertices,
            num_indices: 0,
            views: Vec::new(),
        }
    }

    pub fn layout(&self) -> &MeshLayout {
        &self.layout
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    pub fn num_indices(&self) -> u32 {
        self.num_indices
    }

    /// Bind `buffer` to vertex binding `slot`, reading from `offset` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not declared in the layout or already has a buffer.
    pub fn bind_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: impl Into<MaybeOwned<Buffer>>,
        offset: u64,
    ) -> &mut Self {
        let Some(index) = self.layout.binding_index(slot) else {
            panic!("vertex buffer slot {slot} is not declared in the mesh layout");
        };
        assert!(
            self.vertex_buffers[index].is_none(),
            "vertex buffer slot {slot} is already bound"
        );
        self.vertex_buffers[index] = Some(BoundBuffer {
            buffer: buffer.into(),
            offset,
        });
        self
    }

    /// Bind the index buffer. The mesh is indexed from now on.
    ///
    /// # Panics
    ///
    /// Panics if an index buffer is already bound.
    pub fn set_index_buffer(
        &mut self,
        buffer: impl Into<MaybeOwned<Buffer>>,
        offset: u64,
        num_indices: u32,
    ) -> &mut Self {
        assert!(self.index_buffer.is_none(), "index buffer is already bound");
        self.index_buffer = Some(BoundBuffer {
            buffer: buffer.into(),
            offset,
        });
        self.num_indices = num_indices;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Whether every declared binding has a buffer.
    pub fn is_complete(&self) -> bool {
        self.vertex_buffers.iter().all(Option::is_some)
    }

    /// Buffer bound to `slot`, if any.
    pub fn vertex_buffer(&self, slot: u32) -> Option<BufferRef> {
        self.vertex_slot(slot).map(|b| b.buffer.share())
    }

    /// Byte offset of the buffer bound to `slot`.
    pub fn vertex_offset(&self, slot: u32) -> Option<u64> {
        self.vertex_slot(slot).map(|b| b.offset)
    }

    /// Whether the buffer bound to `slot` is owned by this mesh.
    pub fn owns_vertex_buffer(&self, slot: u32) -> bool {
        self.vertex_slot(slot).is_some_and(|b| b.buffer.is_owned())
    }

    pub fn index_buffer(&self) -> Option<BufferRef> {
        self.index_buffer.as_ref().map(|b| b.buffer.share())
    }

    pub fn index_offset(&self) -> Option<u64> {
        self.index_buffer.as_ref().map(|b| b.offset)
    }

    pub fn owns_index_buffer(&self) -> bool {
        self.index_buffer.as_ref().is_some_and(|b| b.buffer.is_owned())
    }

    fn vertex_slot(&self, slot: u32) -> Option<&BoundBuffer> {
        let index = self.layout.binding_index(slot)?;
        self.vertex_buffers[index].as_ref()
    }

    /// Free the buffers this mesh owns. Borrowed buffers are left alone.
    ///
    /// Safe to call more than once.
    pub fn release_owned_buffers(&mut self) {
        for bound in self.vertex_buffers.iter_mut().flatten() {
            bound.buffer.release();
        }
        if let Some(bound) = &mut self.index_buffer {
            bound.buffer.release();
        }
    }

    /// View covering the whole mesh.
    ///
    /// # Panics
    ///
    /// Panics if a declared vertex binding has no buffer.
    pub fn view(&self) -> MeshView {
        assert!(self.is_complete(), "mesh has unbound vertex buffer slots");
        let vertex_buffers = self
            .layout
            .bindings()
            .iter()
            .zip(&self.vertex_buffers)
            .filter_map(|(binding, bound)| {
                bound
                    .as_ref()
                    .map(|b| (binding.slot, b.buffer.share(), b.offset))
            })
            .collect();
        MeshView {
            topology: self.topology,
            vertex_buffers,
            index_buffer: self
                .index_buffer
                .as_ref()
                .map(|b| (b.buffer.share(), b.offset)),
            first_vertex: 0,
            num_vertices: self.num_vertices,
            first_index: 0,
            num_indices: self.num_indices,
        }
    }

    /// Register a sub-range of the mesh as a separately drawable view.
    ///
    /// `first` and `count` are in indices for indexed meshes and in vertices
    /// otherwise.
    pub fn add_view(&mut self, first: u32, count: u32) -> &MeshView {
        let view = self.view().sub_view(first, count);
        self.views.push(view);
        &self.views[self.views.len() - 1]
    }

    /// Views registered with [`add_view`](Self::add_view).
    pub fn views(&self) -> &[MeshView] {
        &self.views
    }

    /// Bind the mesh's buffers and draw all of it.
    pub fn draw(&self, pass: &mut RenderPass<'_>) {
        self.view().draw(pass);
    }
}

/// A non-owning sub-range of a mesh's buffers.
///
/// Views hold shared handles, so they stay cheap to clone and never free
/// anything.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshView {
    topology: PrimitiveTopology,
    vertex_buffers: Vec<(u32, BufferRef, u64)>,
    index_buffer: Option<(BufferRef, u64)>,
    first_vertex: u32,
    num_vertices: u32,
    first_index: u32,
    num_indices: u32,
}

impl MeshView {
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn first_vertex(&self) -> u32 {
        self.first_vertex
    }

    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    pub fn first_index(&self) -> u32 {
        self.first_index
    }

    pub fn num_indices(&self) -> u32 {
        self.num_indices
    }

    /// Number of elements drawn: indices when indexed, vertices otherwise.
    pub fn element_count(&self) -> u32 {
        if self.is_indexed() {
            self.num_indices
        } else {
            self.num_vertices
        }
    }

    /// Byte offset of the vertex buffer bound to `slot`.
    pub fn vertex_offset(&self, slot: u32) -> Option<u64> {
        self.vertex_buffers
            .iter()
            .find(|(s, _, _)| *s == slot)
            .map(|(_, _, offset)| *offset)
    }

    pub fn index_offset(&self) -> Option<u64> {
        self.index_buffer.as_ref().map(|(_, offset)| *offset)
    }

    /// A narrower view, relative to this one.
    ///
    /// # Panics
    ///
    /// Panics if `first + count` exceeds [`element_count`](Self::element_count).
    pub fn sub_view(&self, first: u32, count: u32) -> MeshView {
        let available = self.element_count();
        assert!(
            first.checked_add(count).is_some_and(|end| end <= available),
            "sub-view {first}..{} is out of range (view has {available} elements)",
            first.saturating_add(count)
        );
        let mut view = self.clone();
        if view.is_indexed() {
            view.first_index += first;
            view.num_indices = count;
        } else {
            view.first_vertex += first;
            view.num_vertices = count;
        }
        view
    }

    /// Whether both views reference the same buffers, ignoring offsets and counts.
    pub fn same_buffers(&self, other: &MeshView) -> bool {
        self.vertex_buffers.len() == other.vertex_buffers.len()
            && self
                .vertex_buffers
                .iter()
                .zip(&other.vertex_buffers)
                .all(|((a_slot, a, _), (b_slot, b, _))| a_slot == b_slot && a.same_buffer(b))
            && match (&self.index_buffer, &other.index_buffer) {
                (Some((a, _)), Some((b, _))) => a.same_buffer(b),
                (None, None) => true,
                _ => false,
            }
    }

    fn same_offsets(&self, other: &MeshView) -> bool {
        self.vertex_buffers
            .iter()
            .zip(&other.vertex_buffers)
            .all(|((_, _, a), (_, _, b))| a == b)
            && self.index_offset() == other.index_offset()
    }

    fn bind(&self, pass: &mut RenderPass<'_>) {
        for (slot, buffer, offset) in &self.vertex_buffers {
            pass.bind_vertex_buffer(*slot, buffer, *offset);
        }
        if let Some((buffer, offset)) = &self.index_buffer {
            pass.bind_index_buffer(buffer, *offset);
        }
    }

    fn issue_draw(&self, pass: &mut RenderPass<'_>) {
        if self.is_indexed() {
            pass.draw_indexed(self.num_indices, 1, self.first_index, 0, 0);
        } else {
            pass.draw(self.num_vertices, 1, self.first_vertex, 0);
        }
    }

    /// Bind this view's buffers and draw it.
    pub fn draw(&self, pass: &mut RenderPass<'_>) {
        self.bind(pass);
        self.issue_draw(pass);
    }
}

/// Draw several views of the same buffers.
///
/// Every view must reference the buffers of the first one; only offsets and
/// counts may differ. Buffers are rebound only when offsets change.
pub fn draw_views(pass: &mut RenderPass<'_>, views: &[MeshView]) {
    let Some(first) = views.first() else {
        return;
    };
    debug_assert!(
        views[1..].iter().all(|view| view.same_buffers(first)),
        "batched mesh views must reference identical vertex and index buffers"
    );
    let mut bound: Option<&MeshView> = None;
    for view in views {
        if bound.is_none_or(|b| !b.same_offsets(view)) {
            view.bind(pass);
            bound = Some(view);
        }
        view.issue_draw(pass);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use umbra_core::mesh::{PositionVertex, Vertex, VertexAttrib, VertexElementFormat};

    use super::*;
    use crate::device::{Device, DeviceDescriptor};
    use crate::types::{BufferDescriptor, BufferUsage};

    fn device() -> Arc<Device> {
        Device::new(DeviceDescriptor::dummy()).unwrap()
    }

    fn buffer(device: &Arc<Device>, size: u64, usage: BufferUsage) -> Buffer {
        device
            .create_buffer(&BufferDescriptor::new(size, usage | BufferUsage::COPY_DST))
            .unwrap()
    }

    fn triangle_mesh(device: &Arc<Device>) -> Mesh {
        let mut mesh = Mesh::new(PositionVertex::layout(), PrimitiveTopology::TriangleList, 6);
        mesh.bind_vertex_buffer(0, buffer(device, 72, BufferUsage::VERTEX), 0);
        mesh
    }

    #[test]
    fn test_one_slot_per_binding() {
        let layout = MeshLayout::new()
            .add_binding(0, 12)
            .add_binding(3, 8)
            .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
            .add_attribute(VertexAttrib::TexCoord0, 3, VertexElementFormat::Float2, 0);
        let device = device();
        let mut mesh = Mesh::new(layout, PrimitiveTopology::TriangleList, 3);
        assert!(!mesh.is_complete());
        mesh.bind_vertex_buffer(0, buffer(&device, 36, BufferUsage::VERTEX), 0);
        mesh.bind_vertex_buffer(3, buffer(&device, 24, BufferUsage::VERTEX), 0);
        assert!(mesh.is_complete());
        assert!(mesh.vertex_buffer(3).is_some());
        assert!(mesh.vertex_buffer(1).is_none());
    }

    #[test]
    #[should_panic(expected = "not declared")]
    fn test_undeclared_slot_panics() {
        let device = device();
        let mut mesh = triangle_mesh(&device);
        mesh.bind_vertex_buffer(2, buffer(&device, 4, BufferUsage::VERTEX), 0);
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn test_rebinding_slot_panics() {
        let device = device();
        let mut mesh = triangle_mesh(&device);
        mesh.bind_vertex_buffer(0, buffer(&device, 4, BufferUsage::VERTEX), 0);
    }

    #[test]
    fn test_release_only_frees_owned_buffers() {
        let device = device();
        let shared = buffer(&device, 256, BufferUsage::INDEX);
        let mut mesh = triangle_mesh(&device);
        mesh.set_index_buffer(shared.share(), 64, 6);
        assert!(mesh.is_indexed());
        assert!(mesh.owns_vertex_buffer(0));
        assert!(!mesh.owns_index_buffer());

        let vertex = mesh.vertex_buffer(0).unwrap();
        mesh.release_owned_buffers();
        mesh.release_owned_buffers();
        assert!(vertex.is_released());
        assert!(!shared.is_released());
        assert_eq!(device.live_buffer_count(), 1);
    }

    #[test]
    fn test_sub_views() {
        let device = device();
        let mut mesh = triangle_mesh(&device);
        let view = mesh.add_view(3, 3).clone();
        assert_eq!(view.first_vertex(), 3);
        assert_eq!(view.num_vertices(), 3);

        let inner = view.sub_view(1, 2);
        assert_eq!(inner.first_vertex(), 4);
        assert_eq!(inner.element_count(), 2);
        assert!(inner.same_buffers(&view));
        assert_eq!(mesh.views().len(), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_sub_view_out_of_range() {
        let device = device();
        let mesh = triangle_mesh(&device);
        mesh.view().sub_view(4, 3);
    }

    #[test]
    fn test_views_of_different_meshes_differ() {
        let device = device();
        let a = triangle_mesh(&device);
        let b = triangle_mesh(&device);
        assert!(!a.view().same_buffers(&b.view()));
    }
}
