//! In-memory tree model for one AML definition block.
//!
//! Nodes live in an arena owned by [`AmlTree`] and are addressed by
//! [`NodeId`] handles. Each node stores a weak parent handle; child
//! ownership is expressed through the parent's fixed-argument slots and
//! ordered variable-argument list, so the structure is a strict tree.
//! Deleting a subtree recycles its arena slots through a free list, which
//! invalidates the deleted [`NodeId`]s; holding on to one past deletion is
//! a caller bug and surfaces as [`AmlError::InvalidParameter`].

use alloc::vec::Vec;

use crate::grammar::{ArgType, ByteEncoding};
use crate::name::{self, AmlName};
use crate::sdt::SdtHeader;
use crate::{AmlError, resource};

/// Maximum number of fixed-argument slots any opcode can have.
pub const MAX_FIXED_ARGS: usize = 6;

/// Handle to a node inside an [`AmlTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Discriminator describing what a data node's byte buffer holds.
///
/// Only the variants below can appear on a live data node; the grammar's
/// integer-width and object argument types collapse onto [`DataType::Uint`]
/// and "no data node" respectively via [`DataType::from_arg_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Little-endian unsigned integer, 1/2/4/8 bytes.
    Uint,
    /// AML-encoded NameString.
    NameString,
    /// ASCII text, null terminator included in the buffer.
    String,
    /// Opaque bytes (non-resource Buffer contents).
    Raw,
    /// One encoded resource data descriptor.
    ResourceData,
    /// Undecoded field-list bytes of a Field/IndexField/BankField.
    FieldElement,
}

impl DataType {
    /// Maps a grammar fixed-argument type onto the data-node discriminator
    /// a parsed value of that type carries.
    ///
    /// Returns `None` for [`ArgType::None`] and [`ArgType::Object`]: those
    /// argument positions never produce data nodes.
    #[must_use]
    pub fn from_arg_type(arg: ArgType) -> Option<Self> {
        match arg {
            ArgType::UInt8 | ArgType::UInt16 | ArgType::UInt32 | ArgType::UInt64 => {
                Some(Self::Uint)
            }
            ArgType::Name => Some(Self::NameString),
            ArgType::String => Some(Self::String),
            ArgType::None | ArgType::Object => None,
        }
    }

    /// Checks that `bytes` is a valid buffer for this discriminator.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] when the buffer is empty or
    /// inconsistent with the discriminator: a `Uint` must be 1/2/4/8 bytes
    /// wide, a `NameString` must decode to exactly the buffer length, a
    /// `String` must be null-terminated printable ASCII, and a
    /// `ResourceData` buffer must hold exactly one whole descriptor.
    pub fn validate(self, bytes: &[u8]) -> Result<(), AmlError> {
        if bytes.is_empty() {
            return Err(AmlError::InvalidParameter);
        }
        match self {
            Self::Uint => {
                if !matches!(bytes.len(), 1 | 2 | 4 | 8) {
                    return Err(AmlError::InvalidParameter);
                }
            }
            Self::NameString => {
                let size = name::aml_name_size(bytes).map_err(|_| AmlError::InvalidParameter)?;
                if size != bytes.len() {
                    return Err(AmlError::InvalidParameter);
                }
            }
            Self::String => {
                let (&last, content) =
                    bytes.split_last().ok_or(AmlError::InvalidParameter)?;
                if last != 0 || !content.iter().all(|&c| (0x01..=0x7F).contains(&c)) {
                    return Err(AmlError::InvalidParameter);
                }
            }
            Self::ResourceData => {
                let size = resource::element_size(bytes)
                    .map_err(|_| AmlError::InvalidParameter)?;
                if size != bytes.len() {
                    return Err(AmlError::InvalidParameter);
                }
            }
            Self::Raw | Self::FieldElement => {}
        }
        Ok(())
    }
}

/// Payload of one tree node.
#[derive(Debug)]
pub enum NodeKind {
    /// The definition block root, owning a copy of the table header.
    Root {
        /// The 36-byte system description table header.
        header: SdtHeader,
    },
    /// One AML statement.
    Object {
        /// Grammar entry for the statement's opcode.
        encoding: &'static ByteEncoding,
        /// Decoded PkgLength value; 0 when the opcode has none. The value
        /// counts the statement body including the PkgLength field itself
        /// but not the opcode bytes.
        pkg_len: u32,
    },
    /// A terminal value.
    Data {
        /// What the buffer holds.
        tag: DataType,
        /// The owned bytes, exactly as they appear on the wire.
        bytes: Vec<u8>,
    },
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) fixed: [Option<NodeId>; MAX_FIXED_ARGS],
    pub(crate) children: Vec<NodeId>,
}

/// The parsed tree of one DSDT/SSDT definition block.
#[derive(Debug)]
pub struct AmlTree {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    root: NodeId,
}

impl AmlTree {
    /// Creates a tree holding only a root node with a copy of `header`.
    #[must_use]
    pub fn new(header: SdtHeader) -> Self {
        let root = Node {
            parent: None,
            kind: NodeKind::Root { header },
            fixed: [None; MAX_FIXED_ARGS],
            children: Vec::new(),
        };
        Self {
            nodes: alloc::vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Returns the root node's id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, AmlError> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(AmlError::InvalidParameter)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, AmlError> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(AmlError::InvalidParameter)
    }

    fn alloc(&mut self, node: Node) -> Result<NodeId, AmlError> {
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = Some(node);
            Ok(NodeId(index))
        } else {
            let index = u32::try_from(self.nodes.len()).map_err(|_| AmlError::Overflow)?;
            self.nodes.push(Some(node));
            Ok(NodeId(index))
        }
    }

    /// Creates a detached object node for `encoding` with the given
    /// decoded PkgLength value.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `encoding` is a
    /// NameString character rather than a real opcode.
    pub fn new_object(
        &mut self,
        encoding: &'static ByteEncoding,
        pkg_len: u32,
    ) -> Result<NodeId, AmlError> {
        if encoding.is_name_char() {
            return Err(AmlError::InvalidParameter);
        }
        self.alloc(Node {
            parent: None,
            kind: NodeKind::Object { encoding, pkg_len },
            fixed: [None; MAX_FIXED_ARGS],
            children: Vec::new(),
        })
    }

    /// Creates a detached data node owning a copy of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `bytes` is empty or
    /// fails [`DataType::validate`] for `tag`.
    pub fn new_data(&mut self, tag: DataType, bytes: &[u8]) -> Result<NodeId, AmlError> {
        tag.validate(bytes)?;
        self.alloc(Node {
            parent: None,
            kind: NodeKind::Data {
                tag,
                bytes: bytes.to_vec(),
            },
            fixed: [None; MAX_FIXED_ARGS],
            children: Vec::new(),
        })
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    /// Returns the node's payload.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] for a stale id.
    pub fn kind(&self, id: NodeId) -> Result<&NodeKind, AmlError> {
        Ok(&self.node(id)?.kind)
    }

    /// Returns the node's parent, or `None` for the root and detached
    /// nodes.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] for a stale id.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, AmlError> {
        Ok(self.node(id)?.parent)
    }

    /// Returns the table header held by the root node.
    #[must_use]
    pub fn header(&self) -> &SdtHeader {
        // The root slot is never freed.
        match &self.nodes[self.root.index()].as_ref().unwrap().kind {
            NodeKind::Root { header } => header,
            _ => unreachable!("root node is always NodeKind::Root"),
        }
    }

    pub(crate) fn header_mut(&mut self) -> &mut SdtHeader {
        match &mut self.nodes[self.root.index()].as_mut().unwrap().kind {
            NodeKind::Root { header } => header,
            _ => unreachable!("root node is always NodeKind::Root"),
        }
    }

    /// Returns the grammar entry of an object node.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `id` is stale or not an
    /// object node.
    pub fn encoding(&self, id: NodeId) -> Result<&'static ByteEncoding, AmlError> {
        match self.node(id)?.kind {
            NodeKind::Object { encoding, .. } => Ok(encoding),
            _ => Err(AmlError::InvalidParameter),
        }
    }

    /// Returns the decoded PkgLength value of an object node (0 if its
    /// opcode has no PkgLength field).
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `id` is stale or not an
    /// object node.
    pub fn pkg_len(&self, id: NodeId) -> Result<u32, AmlError> {
        match self.node(id)?.kind {
            NodeKind::Object { pkg_len, .. } => Ok(pkg_len),
            _ => Err(AmlError::InvalidParameter),
        }
    }

    /// Returns a data node's discriminator and bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `id` is stale or not a
    /// data node.
    pub fn data(&self, id: NodeId) -> Result<(DataType, &[u8]), AmlError> {
        match &self.node(id)?.kind {
            NodeKind::Data { tag, bytes } => Ok((*tag, bytes)),
            _ => Err(AmlError::InvalidParameter),
        }
    }

    /// Returns the fixed-argument slot `index` of an object node.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `id` is stale, not an
    /// object node, or `index` is at or past the opcode's fixed-argument
    /// count.
    pub fn fixed_arg(&self, id: NodeId, index: usize) -> Result<Option<NodeId>, AmlError> {
        let node = self.node(id)?;
        let NodeKind::Object { encoding, .. } = node.kind else {
            return Err(AmlError::InvalidParameter);
        };
        if index >= encoding.fixed_args().len() {
            return Err(AmlError::InvalidParameter);
        }
        Ok(node.fixed[index])
    }

    pub(crate) fn fixed_slots(&self, id: NodeId) -> Result<&[Option<NodeId>], AmlError> {
        let node = self.node(id)?;
        match node.kind {
            NodeKind::Object { encoding, .. } => {
                Ok(&node.fixed[..encoding.fixed_args().len()])
            }
            NodeKind::Root { .. } => Ok(&[]),
            NodeKind::Data { .. } => Err(AmlError::InvalidParameter),
        }
    }

    /// Returns the ordered variable-argument list of a root or object
    /// node.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `id` is stale or a data
    /// node.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], AmlError> {
        let node = self.node(id)?;
        if matches!(node.kind, NodeKind::Data { .. }) {
            return Err(AmlError::InvalidParameter);
        }
        Ok(&node.children)
    }

    /// Returns the namespace name defined by an object node, decoded from
    /// the NameString data node in its first fixed argument.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if the node's opcode does
    /// not define a namespace entry or its name argument is missing or
    /// malformed.
    pub fn node_name(&self, id: NodeId) -> Result<AmlName, AmlError> {
        let encoding = self.encoding(id)?;
        if !encoding
            .attribute
            .contains(crate::grammar::OpAttribute::IN_NAMESPACE)
        {
            return Err(AmlError::InvalidParameter);
        }
        let name_arg = self.fixed_arg(id, 0)?.ok_or(AmlError::InvalidParameter)?;
        let (tag, bytes) = self.data(name_arg)?;
        if tag != DataType::NameString {
            return Err(AmlError::InvalidParameter);
        }
        name::decode_aml_name(bytes)
    }

    // ─── Raw attachment ─────────────────────────────────────────────────
    // Used by the parser, which reads sizes straight off the wire and so
    // bypasses the propagation machinery in `tree`.

    pub(crate) fn attach_child_raw(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), AmlError> {
        if self.node(child)?.parent.is_some() {
            return Err(AmlError::InvalidParameter);
        }
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub(crate) fn attach_fixed_raw(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), AmlError> {
        if self.node(child)?.parent.is_some() || index >= MAX_FIXED_ARGS {
            return Err(AmlError::InvalidParameter);
        }
        self.node_mut(parent)?.fixed[index] = Some(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    // ─── Deletion ───────────────────────────────────────────────────────

    /// Recursively frees a detached subtree, returning its arena slots to
    /// the free list. All ids inside the subtree become stale.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `id` is stale, is the
    /// root, or is still attached to a parent. Nothing is freed in those
    /// cases.
    pub fn delete_subtree(&mut self, id: NodeId) -> Result<(), AmlError> {
        if id == self.root || self.node(id)?.parent.is_some() {
            return Err(AmlError::InvalidParameter);
        }
        self.free_recursive(id);
        Ok(())
    }

    fn free_recursive(&mut self, id: NodeId) {
        let Some(node) = self.nodes[id.index()].take() else {
            return;
        };
        for child in node.fixed.into_iter().flatten() {
            self.free_recursive(child);
        }
        for child in node.children {
            self.free_recursive(child);
        }
        self.free.push(id.0);
    }

    /// Number of live nodes, root included. Exposed for tests and
    /// diagnostics.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }
}
