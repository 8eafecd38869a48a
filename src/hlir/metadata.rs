/*! Module metadata and the typed views over it.

Metadata arrives from the bitcode reader as bare nodes: ordered operand
lists of integers, strings, nulls, and references to other nodes. The typed
views in this module do the operand extraction once, validating presence and
operand kinds, so the lowering code never walks raw operand indices.
*/

use crate::arena::{Arena, BadHandle, Handle};

/// One metadata node: an ordered list of operands.
#[derive(Clone, Debug, Default)]
pub struct MetadataNode {
    pub operands: Vec<MetadataOperand>,
}

#[derive(Clone, Debug)]
pub enum MetadataOperand {
    Null,
    Integer(u64),
    String(String),
    Node(Handle<MetadataNode>),
}

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum MetadataError {
    #[error("metadata node is missing operand {0}")]
    MissingOperand(usize),
    #[error("metadata operand {0} is not an integer")]
    ExpectedInteger(usize),
    #[error("metadata operand {0} is not a string")]
    ExpectedString(usize),
    #[error("metadata operand {0} is not a node")]
    ExpectedNode(usize),
    #[error("unknown component type {0}")]
    UnknownComponentType(u32),
    #[error("unknown system value semantic {0}")]
    UnknownSemantic(u32),
    #[error("unknown resource kind {0}")]
    UnknownResourceKind(u32),
    #[error(transparent)]
    BadHandle(#[from] BadHandle),
}

/// A borrowed, bounds-checked view of one metadata node.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    arena: &'a Arena<MetadataNode>,
    node: &'a MetadataNode,
}

impl<'a> NodeView<'a> {
    pub fn new(
        arena: &'a Arena<MetadataNode>,
        node: Handle<MetadataNode>,
    ) -> Result<Self, MetadataError> {
        Ok(Self {
            arena,
            node: arena.try_get(node)?,
        })
    }

    pub fn len(&self) -> usize {
        self.node.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.operands.is_empty()
    }

    fn operand(&self, index: usize) -> Result<&'a MetadataOperand, MetadataError> {
        self.node
            .operands
            .get(index)
            .ok_or(MetadataError::MissingOperand(index))
    }

    pub fn int(&self, index: usize) -> Result<u64, MetadataError> {
        match *self.operand(index)? {
            MetadataOperand::Integer(value) => Ok(value),
            _ => Err(MetadataError::ExpectedInteger(index)),
        }
    }

    pub fn int_u32(&self, index: usize) -> Result<u32, MetadataError> {
        Ok(self.int(index)? as u32)
    }

    pub fn string(&self, index: usize) -> Result<&'a str, MetadataError> {
        match *self.operand(index)? {
            MetadataOperand::String(ref value) => Ok(value),
            _ => Err(MetadataError::ExpectedString(index)),
        }
    }

    pub fn node(&self, index: usize) -> Result<Handle<MetadataNode>, MetadataError> {
        match *self.operand(index)? {
            MetadataOperand::Node(handle) => Ok(handle),
            _ => Err(MetadataError::ExpectedNode(index)),
        }
    }

    /// A node operand that is allowed to be null or absent.
    pub fn opt_node(&self, index: usize) -> Result<Option<Handle<MetadataNode>>, MetadataError> {
        match self.node.operands.get(index) {
            None | Some(&MetadataOperand::Null) => Ok(None),
            Some(&MetadataOperand::Node(handle)) => Ok(Some(handle)),
            Some(_) => Err(MetadataError::ExpectedNode(index)),
        }
    }

    /// View of the node stored at `index`.
    pub fn subview(&self, index: usize) -> Result<NodeView<'a>, MetadataError> {
        NodeView::new(self.arena, self.node(index)?)
    }
}

/// Component type of a signature element or typed resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentType {
    I1,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
}

impl ComponentType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::I1,
            2 => Self::I16,
            3 => Self::U16,
            4 => Self::I32,
            5 => Self::U32,
            6 => Self::I64,
            7 => Self::U64,
            8 => Self::F16,
            9 => Self::F32,
            10 => Self::F64,
            _ => return None,
        })
    }
}

/// System value semantic of a signature element. `User` covers arbitrary
/// user-defined semantics; everything else names a pipeline builtin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Semantic {
    User,
    VertexId,
    InstanceId,
    Position,
    RenderTargetArrayIndex,
    ViewportArrayIndex,
    ClipDistance,
    CullDistance,
    OutputControlPointId,
    DomainLocation,
    PrimitiveId,
    GsInstanceId,
    SampleIndex,
    IsFrontFace,
    Coverage,
    InnerCoverage,
    Target,
    Depth,
    DepthLessEqual,
    DepthGreaterEqual,
    StencilRef,
    DispatchThreadId,
    GroupId,
    GroupIndex,
    GroupThreadId,
    TessFactor,
    InsideTessFactor,
    ViewId,
    Barycentrics,
}

impl Semantic {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::User,
            1 => Self::VertexId,
            2 => Self::InstanceId,
            3 => Self::Position,
            4 => Self::RenderTargetArrayIndex,
            5 => Self::ViewportArrayIndex,
            6 => Self::ClipDistance,
            7 => Self::CullDistance,
            8 => Self::OutputControlPointId,
            9 => Self::DomainLocation,
            10 => Self::PrimitiveId,
            11 => Self::GsInstanceId,
            12 => Self::SampleIndex,
            13 => Self::IsFrontFace,
            14 => Self::Coverage,
            15 => Self::InnerCoverage,
            16 => Self::Target,
            17 => Self::Depth,
            18 => Self::DepthLessEqual,
            19 => Self::DepthGreaterEqual,
            20 => Self::StencilRef,
            21 => Self::DispatchThreadId,
            22 => Self::GroupId,
            23 => Self::GroupIndex,
            24 => Self::GroupThreadId,
            25 => Self::TessFactor,
            26 => Self::InsideTessFactor,
            27 => Self::ViewId,
            28 => Self::Barycentrics,
            _ => return None,
        })
    }
}

/// Shape of a shader-resource view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Texture1D,
    Texture2D,
    Texture2DMS,
    Texture3D,
    TextureCube,
    Texture1DArray,
    Texture2DArray,
    Texture2DMSArray,
    TextureCubeArray,
    TypedBuffer,
    RawBuffer,
    StructuredBuffer,
}

impl ResourceKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::Texture1D,
            2 => Self::Texture2D,
            3 => Self::Texture2DMS,
            4 => Self::Texture3D,
            5 => Self::TextureCube,
            6 => Self::Texture1DArray,
            7 => Self::Texture2DArray,
            8 => Self::Texture2DMSArray,
            9 => Self::TextureCubeArray,
            10 => Self::TypedBuffer,
            11 => Self::RawBuffer,
            12 => Self::StructuredBuffer,
            _ => return None,
        })
    }
}

/// Common head of every resource record:
/// `[index, _, name, bind_space, bind_register, range_size, ...]`.
fn resource_head(view: &NodeView) -> Result<(u32, String, u32, u32, u32), MetadataError> {
    Ok((
        view.int_u32(0)?,
        view.string(2)?.to_string(),
        view.int_u32(3)?,
        view.int_u32(4)?,
        view.int_u32(5)?,
    ))
}

/// A decoded shader-resource-view record.
#[derive(Clone, Debug)]
pub struct SrvEntry {
    pub index: u32,
    pub name: String,
    pub bind_space: u32,
    pub bind_register: u32,
    pub range_size: u32,
    pub kind: ResourceKind,
    /// Sampled-format views carry a component type in their element tag;
    /// structured and raw buffers do not.
    pub component: Option<ComponentType>,
}

impl SrvEntry {
    pub fn from_node(
        arena: &Arena<MetadataNode>,
        node: Handle<MetadataNode>,
    ) -> Result<Self, MetadataError> {
        let view = NodeView::new(arena, node)?;
        let (index, name, bind_space, bind_register, range_size) = resource_head(&view)?;
        let raw_kind = view.int_u32(6)?;
        let kind =
            ResourceKind::from_u32(raw_kind).ok_or(MetadataError::UnknownResourceKind(raw_kind))?;
        let tags = view.subview(8)?;
        let component = if tags.int(0)? == 0 {
            let raw = tags.int_u32(1)?;
            Some(ComponentType::from_u32(raw).ok_or(MetadataError::UnknownComponentType(raw))?)
        } else {
            // Tag 1 carries the structure stride, which only matters for a
            // storage-buffer path.
            None
        };
        Ok(SrvEntry {
            index,
            name,
            bind_space,
            bind_register,
            range_size,
            kind,
            component,
        })
    }
}

/// A decoded constant-buffer-view record.
#[derive(Clone, Debug)]
pub struct CbvEntry {
    pub index: u32,
    pub name: String,
    pub bind_space: u32,
    pub bind_register: u32,
    pub range_size: u32,
    pub size_bytes: u32,
}

impl CbvEntry {
    pub fn from_node(
        arena: &Arena<MetadataNode>,
        node: Handle<MetadataNode>,
    ) -> Result<Self, MetadataError> {
        let view = NodeView::new(arena, node)?;
        let (index, name, bind_space, bind_register, range_size) = resource_head(&view)?;
        Ok(CbvEntry {
            index,
            name,
            bind_space,
            bind_register,
            range_size,
            size_bytes: view.int_u32(6)?,
        })
    }
}

/// A decoded sampler record.
#[derive(Clone, Debug)]
pub struct SamplerEntry {
    pub index: u32,
    pub name: String,
    pub bind_space: u32,
    pub bind_register: u32,
    pub range_size: u32,
}

impl SamplerEntry {
    pub fn from_node(
        arena: &Arena<MetadataNode>,
        node: Handle<MetadataNode>,
    ) -> Result<Self, MetadataError> {
        let view = NodeView::new(arena, node)?;
        let (index, name, bind_space, bind_register, range_size) = resource_head(&view)?;
        Ok(SamplerEntry {
            index,
            name,
            bind_space,
            bind_register,
            range_size,
        })
    }
}

/// A decoded stage signature element:
/// `[id, name, component type, semantic, _, interpolation, rows, cols,
/// start row, start col]`. The start row doubles as the semantic index for
/// render-target outputs.
#[derive(Clone, Debug)]
pub struct SignatureElement {
    pub element_id: u32,
    pub semantic_name: String,
    pub component_type: ComponentType,
    pub semantic: Semantic,
    pub interpolation: u32,
    pub rows: u32,
    pub cols: u32,
    pub start_row: u32,
    pub start_col: u32,
}

impl SignatureElement {
    pub fn from_node(
        arena: &Arena<MetadataNode>,
        node: Handle<MetadataNode>,
    ) -> Result<Self, MetadataError> {
        let view = NodeView::new(arena, node)?;
        let raw_component = view.int_u32(2)?;
        let raw_semantic = view.int_u32(3)?;
        Ok(SignatureElement {
            element_id: view.int_u32(0)?,
            semantic_name: view.string(1)?.to_string(),
            component_type: ComponentType::from_u32(raw_component)
                .ok_or(MetadataError::UnknownComponentType(raw_component))?,
            semantic: Semantic::from_u32(raw_semantic)
                .ok_or(MetadataError::UnknownSemantic(raw_semantic))?,
            interpolation: view.int_u32(5)?,
            rows: view.int_u32(6)?,
            cols: view.int_u32(7)?,
            start_row: view.int_u32(8)?,
            start_col: view.int_u32(9)?,
        })
    }
}
