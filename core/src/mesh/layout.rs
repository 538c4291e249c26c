//! Vertex layout definitions for meshes.
//!
//! A [`MeshLayout`] is an ordered list of vertex-buffer bindings (slot and
//! stride) plus an ordered list of attributes (shader location, binding slot,
//! element format and byte offset). It is built once with the append-only
//! builder methods and then turned into a [`VertexInputState`] when a
//! pipeline is created.
//!
//! # Example
//!
//! ```
//! use umbra_core::mesh::{MeshLayout, VertexAttrib, VertexElementFormat};
//!
//! let layout = MeshLayout::new()
//!     .add_binding(0, 32)
//!     .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
//!     .add_attribute(VertexAttrib::Normal, 0, VertexElementFormat::Float3, 16);
//! assert_eq!(layout.vertex_size(), 32);
//! ```

use super::MeshDataError;

/// Well-known vertex attributes and the shader location each one uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttrib {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Color0,
    Color1,
    TexCoord0,
    TexCoord1,
}

impl VertexAttrib {
    /// Shader location (`@location(n)`) used for this attribute.
    pub fn location(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Tangent => 2,
            Self::Bitangent => 3,
            Self::Color0 => 4,
            Self::Color1 => 5,
            Self::TexCoord0 => 6,
            Self::TexCoord1 => 7,
        }
    }
}

impl From<VertexAttrib> for u32 {
    fn from(attrib: VertexAttrib) -> Self {
        attrib.location()
    }
}

/// Element format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    Float,
    Float2,
    Float3,
    Float4,
    Uint,
    Uint2,
    Uint3,
    Uint4,
    /// Four 8-bit unsigned integers normalized to `[0, 1]`.
    Unorm8x4,
    /// Four 8-bit signed integers normalized to `[-1, 1]`.
    Snorm8x4,
    /// Two 16-bit floats.
    Half2,
    /// Four 16-bit floats.
    Half4,
}

impl VertexElementFormat {
    /// Size in bytes of one element.
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::Uint | Self::Unorm8x4 | Self::Snorm8x4 | Self::Half2 => 4,
            Self::Float2 | Self::Uint2 | Self::Half4 => 8,
            Self::Float3 | Self::Uint3 => 12,
            Self::Float4 | Self::Uint4 => 16,
        }
    }
}

/// Whether a binding advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

/// One vertex-buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    /// Binding slot the buffer is bound to.
    pub slot: u32,
    /// Bytes between consecutive elements.
    pub stride: u32,
    pub step_mode: VertexStepMode,
}

/// One vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location.
    pub location: u32,
    /// Slot of the binding this attribute reads from.
    pub binding: u32,
    pub format: VertexElementFormat,
    /// Byte offset within one element of the binding.
    pub offset: u32,
}

/// Pipeline-facing vertex input description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexInputState {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexInputState {
    /// Attributes reading from the binding with the given slot.
    pub fn attributes_for(&self, slot: u32) -> impl Iterator<Item = &VertexAttribute> {
        self.attributes.iter().filter(move |a| a.binding == slot)
    }
}

/// Vertex buffer bindings and attributes for a mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MeshLayout {
    bindings: Vec<VertexBinding>,
    attributes: Vec<VertexAttribute>,
}

impl MeshLayout {
    /// Maximum number of vertex-buffer bindings.
    pub const MAX_BINDINGS: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Append a per-vertex binding.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already declared or the layout is full.
    pub fn add_binding(self, slot: u32, stride: u32) -> Self {
        self.push_binding(slot, stride, VertexStepMode::Vertex)
    }

    /// Append a per-instance binding.
    pub fn add_instance_binding(self, slot: u32, stride: u32) -> Self {
        self.push_binding(slot, stride, VertexStepMode::Instance)
    }

    fn push_binding(mut self, slot: u32, stride: u32, step_mode: VertexStepMode) -> Self {
        assert!(
            self.bindings.len() < Self::MAX_BINDINGS,
            "at most {} vertex bindings are supported",
            Self::MAX_BINDINGS
        );
        assert!(
            self.binding(slot).is_none(),
            "vertex binding slot {slot} declared twice"
        );
        self.bindings.push(VertexBinding {
            slot,
            stride,
            step_mode,
        });
        self
    }

    /// Append an attribute reading from an already declared binding.
    ///
    /// # Panics
    ///
    /// Panics if `binding` was not declared, or if the attribute does not fit
    /// inside the binding's stride.
    pub fn add_attribute(
        mut self,
        location: impl Into<u32>,
        binding: u32,
        format: VertexElementFormat,
        offset: u32,
    ) -> Self {
        let location = location.into();
        let Some(desc) = self.binding(binding) else {
            panic!("attribute at location {location} references undeclared binding {binding}");
        };
        assert!(
            offset + format.size() <= desc.stride,
            "attribute at location {location} (offset {offset}, {} bytes) overflows stride {}",
            format.size(),
            desc.stride
        );
        self.attributes.push(VertexAttribute {
            location,
            binding,
            format,
            offset,
        });
        self
    }

    pub fn num_bindings(&self) -> usize {
        self.bindings.len()
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn bindings(&self) -> &[VertexBinding] {
        &self.bindings
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Binding declared for `slot`.
    pub fn binding(&self, slot: u32) -> Option<&VertexBinding> {
        self.bindings.iter().find(|b| b.slot == slot)
    }

    /// Position of the binding for `slot` in declaration order.
    pub fn binding_index(&self, slot: u32) -> Option<usize> {
        self.bindings.iter().position(|b| b.slot == slot)
    }

    /// Attribute bound to the given shader location.
    pub fn attribute(&self, location: impl Into<u32>) -> Option<&VertexAttribute> {
        let location = location.into();
        self.attributes.iter().find(|a| a.location == location)
    }

    /// Size in bytes of one vertex: the stride of the first binding.
    pub fn vertex_size(&self) -> u32 {
        self.bindings.first().map_or(0, |b| b.stride)
    }

    /// Check that the layout can be used to build a pipeline.
    pub fn validate(&self) -> Result<(), MeshDataError> {
        if self.bindings.is_empty() {
            return Err(MeshDataError::InvalidLayout("no vertex bindings".into()));
        }
        if self.attributes.is_empty() {
            return Err(MeshDataError::InvalidLayout("no vertex attributes".into()));
        }
        for attr in &self.attributes {
            if self.binding(attr.binding).is_none() {
                return Err(MeshDataError::InvalidLayout(format!(
                    "attribute {} references undeclared binding {}",
                    attr.location, attr.binding
                )));
            }
        }
        Ok(())
    }

    /// Materialize the layout into pipeline vertex input state.
    pub fn to_vertex_input_state(&self) -> VertexInputState {
        VertexInputState {
            bindings: self.bindings.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_binding_layout() -> MeshLayout {
        MeshLayout::new()
            .add_binding(0, 32)
            .add_binding(1, 8)
            .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
            .add_attribute(VertexAttrib::Normal, 0, VertexElementFormat::Float3, 16)
            .add_attribute(VertexAttrib::TexCoord0, 1, VertexElementFormat::Float2, 0)
    }

    #[test]
    fn test_vertex_input_state_matches_layout() {
        let layout = two_binding_layout();
        let state = layout.to_vertex_input_state();
        assert_eq!(state.bindings.len(), layout.num_bindings());
        for attr in &state.attributes {
            assert!(layout.binding(attr.binding).is_some());
        }
        assert_eq!(state.attributes_for(1).count(), 1);
    }

    #[test]
    fn test_vertex_input_state_is_stable() {
        let layout = two_binding_layout();
        let a = layout.to_vertex_input_state();
        let b = layout.to_vertex_input_state();
        assert_eq!(a, b);
        assert_eq!(layout, two_binding_layout());
    }

    #[test]
    fn test_attribute_lookup() {
        let layout = two_binding_layout();
        assert_eq!(layout.attribute(VertexAttrib::Normal).unwrap().offset, 16);
        assert!(layout.attribute(VertexAttrib::Color0).is_none());
        assert_eq!(layout.vertex_size(), 32);
        assert_eq!(layout.binding_index(1), Some(1));
    }

    #[test]
    #[should_panic(expected = "undeclared binding")]
    fn test_attribute_requires_binding() {
        let _ = MeshLayout::new()
            .add_binding(0, 12)
            .add_attribute(VertexAttrib::Position, 3, VertexElementFormat::Float3, 0);
    }

    #[test]
    #[should_panic(expected = "overflows stride")]
    fn test_attribute_offset_within_stride() {
        let _ = MeshLayout::new()
            .add_binding(0, 12)
            .add_attribute(VertexAttrib::Normal, 0, VertexElementFormat::Float3, 4);
    }

    #[test]
    fn test_validate() {
        assert!(MeshLayout::new().validate().is_err());
        assert!(MeshLayout::new().add_binding(0, 12).validate().is_err());
        assert!(two_binding_layout().validate().is_ok());
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(VertexElementFormat::Float3.size(), 12);
        assert_eq!(VertexElementFormat::Unorm8x4.size(), 4);
        assert_eq!(VertexElementFormat::Half4.size(), 8);
    }
}
