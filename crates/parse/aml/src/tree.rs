//! Tree mutation and size propagation.
//!
//! Every structural edit changes the serialized size of some subtree, and
//! that delta has to surface in three derived places: the length integer
//! of any enclosing `Buffer`, the PkgLength of every enclosing package
//! statement, and the table header's `Length`. `Package`/`VarPackage`
//! element counts are maintained the same way when children are inserted
//! or removed directly under them.
//!
//! All edits are all-or-nothing: the required field updates are planned
//! against the unmodified tree first, every ceiling (PkgLength 2^28,
//! header `Length` u32, Package count u8) is checked during planning, and
//! only a fully valid plan is applied. A failed edit leaves the tree
//! exactly as it was.

use alloc::vec::Vec;

use crate::grammar::{self, ArgType, ByteEncoding, OpAttribute, opcode};
use crate::node::{AmlTree, DataType, NodeId, NodeKind};
use crate::sdt::SdtHeader;
use crate::AmlError;

/// A single planned field update. Applying a full plan is infallible once
/// any new arena slots it needs have been allocated.
enum Change {
    PkgLen {
        id: NodeId,
        value: u32,
    },
    RootLength {
        value: u32,
    },
    /// Re-encode an integer object: swap its grammar entry and replace,
    /// create or drop its `Uint` data child.
    Integer {
        id: NodeId,
        encoding: &'static ByteEncoding,
        bytes: Option<Vec<u8>>,
    },
    PackageCount {
        id: NodeId,
        value: u8,
    },
}

/// Returns the minimal integer encoding for `value`: `ZeroOp`/`OneOp` for
/// 0/1, otherwise the narrowest Byte/Word/DWord/QWord prefix. `OnesOp` is
/// never chosen automatically.
fn integer_encoding(
    value: u64,
) -> Result<(&'static ByteEncoding, Option<Vec<u8>>), AmlError> {
    let (op, bytes): (u8, Option<Vec<u8>>) = match value {
        0 => (opcode::ZERO_OP, None),
        1 => (opcode::ONE_OP, None),
        2..=0xFF => (opcode::BYTE_PREFIX, Some((value as u8).to_le_bytes().to_vec())),
        0x100..=0xFFFF => (opcode::WORD_PREFIX, Some((value as u16).to_le_bytes().to_vec())),
        0x1_0000..=0xFFFF_FFFF => {
            (opcode::DWORD_PREFIX, Some((value as u32).to_le_bytes().to_vec()))
        }
        _ => (opcode::QWORD_PREFIX, Some(value.to_le_bytes().to_vec())),
    };
    let encoding = ByteEncoding::lookup(op, 0).ok_or(AmlError::UnknownOpcode)?;
    Ok((encoding, bytes))
}

/// Serialized size of an integer object with the given grammar entry
/// (opcode byte plus payload width).
fn integer_size(encoding: &ByteEncoding) -> Result<u64, AmlError> {
    Ok(match encoding.opcode {
        opcode::ZERO_OP | opcode::ONE_OP | opcode::ONES_OP => 1,
        opcode::BYTE_PREFIX => 2,
        opcode::WORD_PREFIX => 3,
        opcode::DWORD_PREFIX => 5,
        opcode::QWORD_PREFIX => 9,
        _ => return Err(AmlError::Unsupported),
    })
}

/// Finds the smallest PkgLength value whose encoding width plus `content`
/// bytes of body equals the value itself (the field counts itself).
fn solve_pkg_len(content: u64) -> Result<u32, AmlError> {
    for width in 1..=4u64 {
        let candidate = content + width;
        if candidate <= u64::from(grammar::MAX_PKG_LENGTH)
            && grammar::pkg_length_width(candidate as u32) == Some(width as usize)
        {
            return Ok(candidate as u32);
        }
    }
    Err(AmlError::Overflow)
}

impl AmlTree {
    // ─── Size accounting ────────────────────────────────────────────────

    /// Computes the exact serialized byte size of a subtree: opcode and
    /// PkgLength bytes plus all argument payloads. For the root this is
    /// the AML body size, header excluded.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] for a stale id and
    /// [`AmlError::InvalidPkgLength`] if an object's stored PkgLength is
    /// not encodable.
    pub fn subtree_size(&self, id: NodeId) -> Result<u64, AmlError> {
        let node = self.node(id)?;
        let mut size = match &node.kind {
            NodeKind::Root { .. } => 0,
            NodeKind::Data { bytes, .. } => bytes.len() as u64,
            NodeKind::Object { encoding, pkg_len } => {
                let mut own = u64::from(encoding.op_byte_count());
                if encoding.attribute.contains(OpAttribute::HAS_PKG_LENGTH) {
                    own += grammar::pkg_length_width(*pkg_len)
                        .ok_or(AmlError::InvalidPkgLength)? as u64;
                }
                own
            }
        };
        for child in node.fixed.iter().flatten() {
            size += self.subtree_size(*child)?;
        }
        for child in &node.children {
            size += self.subtree_size(*child)?;
        }
        Ok(size)
    }

    // ─── Integer objects ────────────────────────────────────────────────

    /// Reads the value of an integer object (`Zero`/`One`/`Ones` or a
    /// Byte/Word/DWord/QWord prefix with its data argument).
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::Unsupported`] if the node is not an integer
    /// object and [`AmlError::InvalidParameter`] if its data argument is
    /// missing or malformed.
    pub fn integer_value(&self, id: NodeId) -> Result<u64, AmlError> {
        let encoding = self.encoding(id)?;
        match encoding.opcode {
            opcode::ZERO_OP => Ok(0),
            opcode::ONE_OP => Ok(1),
            opcode::ONES_OP => Ok(u64::MAX),
            opcode::BYTE_PREFIX
            | opcode::WORD_PREFIX
            | opcode::DWORD_PREFIX
            | opcode::QWORD_PREFIX => {
                let data_id = self.node(id)?.fixed[0].ok_or(AmlError::InvalidParameter)?;
                let (tag, bytes) = self.data(data_id)?;
                if tag != DataType::Uint {
                    return Err(AmlError::InvalidParameter);
                }
                Ok(bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
            }
            _ => Err(AmlError::Unsupported),
        }
    }

    /// Rewrites an integer object to hold `value`, re-encoding it with
    /// the minimal opcode and propagating any width change upward.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::Unsupported`] if the node is not an integer
    /// object, or a propagation error if the width change overflows an
    /// enclosing size field; the tree is unchanged on error.
    pub fn set_integer(&mut self, id: NodeId, value: u64) -> Result<(), AmlError> {
        let mut changes = Vec::new();
        let delta = self.plan_integer(id, value, &mut changes)?;
        if delta != 0 {
            let node = self.node(id)?;
            let from_variable = self.came_from_variable(node.parent, id)?;
            self.plan_size_propagation(node.parent, from_variable, delta, &mut changes)?;
        }
        self.apply_changes(changes)
    }

    fn plan_integer(
        &self,
        id: NodeId,
        value: u64,
        changes: &mut Vec<Change>,
    ) -> Result<i64, AmlError> {
        // Reject non-integer objects up front.
        self.integer_value(id)?;
        let old_size = integer_size(self.encoding(id)?)?;
        let (encoding, bytes) = integer_encoding(value)?;
        let new_size = integer_size(encoding)?;
        changes.push(Change::Integer { id, encoding, bytes });
        Ok(new_size as i64 - old_size as i64)
    }

    // ─── Data node updates ──────────────────────────────────────────────

    /// Replaces a data node's buffer contents, validating the new bytes
    /// against the node's existing discriminator and propagating the size
    /// delta.
    ///
    /// A `Uint` must keep its exact width; a `NameString` must decode to
    /// exactly the new length; a `String` must stay null-terminated
    /// printable ASCII; a `ResourceData` buffer must hold exactly one
    /// whole descriptor. `Raw` and `FieldElement` accept any non-empty
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] on a validation failure, or
    /// a propagation error if the size delta overflows an enclosing size
    /// field; the tree is unchanged on error.
    pub fn update_data(&mut self, id: NodeId, bytes: &[u8]) -> Result<(), AmlError> {
        let (tag, old) = self.data(id)?;
        tag.validate(bytes)?;
        if tag == DataType::Uint && bytes.len() != old.len() {
            return Err(AmlError::InvalidParameter);
        }
        let delta = bytes.len() as i64 - old.len() as i64;

        let mut changes = Vec::new();
        if delta != 0 {
            let parent = self.node(id)?.parent;
            let from_variable = self.came_from_variable(parent, id)?;
            self.plan_size_propagation(parent, from_variable, delta, &mut changes)?;
        }
        self.apply_changes(changes)?;

        if let NodeKind::Data { bytes: buf, .. } = &mut self.node_mut(id)?.kind {
            buf.clear();
            buf.extend_from_slice(bytes);
        }
        Ok(())
    }

    // ─── Fixed arguments ────────────────────────────────────────────────

    /// Fills or replaces fixed-argument slot `index` of `parent` with the
    /// detached node `child`, returning the previous occupant (now
    /// detached) if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `child` is attached, the
    /// slot index is out of range, or `child`'s kind does not fit the
    /// slot's grammar type; or a propagation error on size-field
    /// overflow. The tree is unchanged on error.
    pub fn set_fixed_arg(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<Option<NodeId>, AmlError> {
        let encoding = self.encoding(parent)?;
        let arg = *encoding
            .fixed_args()
            .get(index)
            .ok_or(AmlError::InvalidParameter)?;
        if self.node(child)?.parent.is_some() || child == self.root() {
            return Err(AmlError::InvalidParameter);
        }
        self.check_fixed_compat(arg, child)?;

        let old = self.node(parent)?.fixed[index];
        let old_size = match old {
            Some(node) => self.subtree_size(node)? as i64,
            None => 0,
        };
        let delta = self.subtree_size(child)? as i64 - old_size;

        let mut changes = Vec::new();
        if delta != 0 {
            self.plan_size_propagation(Some(parent), false, delta, &mut changes)?;
        }
        self.apply_changes(changes)?;

        if let Some(node) = old {
            self.node_mut(node)?.parent = None;
        }
        self.node_mut(parent)?.fixed[index] = Some(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(old)
    }

    fn check_fixed_compat(&self, arg: ArgType, child: NodeId) -> Result<(), AmlError> {
        let kind = self.kind(child)?;
        let ok = match arg {
            ArgType::Object => match kind {
                NodeKind::Object { .. } => true,
                // A bare NameString (method invocation target) is a valid
                // object argument.
                NodeKind::Data { tag, .. } => *tag == DataType::NameString,
                NodeKind::Root { .. } => false,
            },
            ArgType::UInt8 | ArgType::UInt16 | ArgType::UInt32 | ArgType::UInt64 => {
                let width = match arg {
                    ArgType::UInt8 => 1,
                    ArgType::UInt16 => 2,
                    ArgType::UInt32 => 4,
                    _ => 8,
                };
                matches!(kind, NodeKind::Data { tag: DataType::Uint, bytes } if bytes.len() == width)
            }
            ArgType::Name => {
                matches!(kind, NodeKind::Data { tag: DataType::NameString, .. })
            }
            ArgType::String => matches!(kind, NodeKind::Data { tag: DataType::String, .. }),
            ArgType::None => false,
        };
        if ok { Ok(()) } else { Err(AmlError::InvalidParameter) }
    }

    // ─── Variable-argument list edits ───────────────────────────────────

    /// Appends the detached node `child` to the end of `parent`'s
    /// variable-argument list.
    ///
    /// # Errors
    ///
    /// See [`AmlTree::insert_child_at`].
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), AmlError> {
        let index = self.children(parent)?.len();
        self.insert_child_at(parent, index, child)
    }

    /// Inserts the detached node `child` at the front of `parent`'s
    /// variable-argument list.
    ///
    /// # Errors
    ///
    /// See [`AmlTree::insert_child_at`].
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), AmlError> {
        self.insert_child_at(parent, 0, child)
    }

    /// Inserts the detached node `child` immediately before `sibling` in
    /// its parent's variable-argument list.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `sibling` is not in a
    /// variable list; otherwise see [`AmlTree::insert_child_at`].
    pub fn insert_child_before(&mut self, sibling: NodeId, child: NodeId) -> Result<(), AmlError> {
        let (parent, index) = self.variable_position(sibling)?;
        self.insert_child_at(parent, index, child)
    }

    /// Inserts the detached node `child` immediately after `sibling` in
    /// its parent's variable-argument list.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `sibling` is not in a
    /// variable list; otherwise see [`AmlTree::insert_child_at`].
    pub fn insert_child_after(&mut self, sibling: NodeId, child: NodeId) -> Result<(), AmlError> {
        let (parent, index) = self.variable_position(sibling)?;
        self.insert_child_at(parent, index + 1, child)
    }

    /// Inserts the detached node `child` at `index` in `parent`'s
    /// variable-argument list, maintaining Package/VarPackage element
    /// counts and all enclosing size fields.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `parent` cannot carry a
    /// variable list, `child` is attached or of a kind the list cannot
    /// hold (a byte list takes only data nodes), or `index` is past the
    /// end; [`AmlError::Overflow`] if a Package count would exceed 255 or
    /// an enclosing size field would overflow. The tree is unchanged on
    /// error.
    pub fn insert_child_at(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
    ) -> Result<(), AmlError> {
        self.check_variable_parent(parent, child)?;
        if index > self.children(parent)?.len() {
            return Err(AmlError::InvalidParameter);
        }
        if self.node(child)?.parent.is_some() || child == self.root() {
            return Err(AmlError::InvalidParameter);
        }

        let mut changes = Vec::new();
        let new_count = self.children(parent)?.len() as u64 + 1;
        let count_delta = self.plan_count(parent, new_count, &mut changes)?;
        let delta = self.subtree_size(child)? as i64 + count_delta;
        self.plan_size_propagation(Some(parent), true, delta, &mut changes)?;
        self.apply_changes(changes)?;

        self.node_mut(parent)?.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detaches a node from its parent's variable-argument list, leaving
    /// it (and its subtree) alive but unattached. The caller either
    /// re-attaches it elsewhere or frees it with
    /// [`AmlTree::delete_subtree`].
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if the node is detached or
    /// occupies a fixed-argument slot, or a propagation error on
    /// size-field overflow. The tree is unchanged on error.
    pub fn remove_child(&mut self, id: NodeId) -> Result<(), AmlError> {
        let (parent, index) = self.variable_position(id)?;

        let mut changes = Vec::new();
        let new_count = self.children(parent)?.len() as u64 - 1;
        let count_delta = self.plan_count(parent, new_count, &mut changes)?;
        let delta = count_delta - self.subtree_size(id)? as i64;
        self.plan_size_propagation(Some(parent), true, delta, &mut changes)?;
        self.apply_changes(changes)?;

        self.node_mut(parent)?.children.remove(index);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Replaces an attached node with the detached node `new`, wherever
    /// `old` sits (fixed slot or variable list). `old` is left detached
    /// for the caller to reuse or free. Both nodes must be of the same
    /// general category (object for object, data for data).
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] on a category or position
    /// mismatch, or a propagation error on size-field overflow. The tree
    /// is unchanged on error.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<(), AmlError> {
        let parent = self.parent(old)?.ok_or(AmlError::InvalidParameter)?;
        if self.node(new)?.parent.is_some() || new == self.root() {
            return Err(AmlError::InvalidParameter);
        }
        let same_category = matches!(
            (self.kind(old)?, self.kind(new)?),
            (NodeKind::Object { .. }, NodeKind::Object { .. })
                | (NodeKind::Data { .. }, NodeKind::Data { .. })
        );
        if !same_category {
            return Err(AmlError::InvalidParameter);
        }

        let fixed_index = self
            .fixed_slots(parent)
            .ok()
            .and_then(|slots| slots.iter().position(|&slot| slot == Some(old)));
        let from_variable = fixed_index.is_none();
        if from_variable {
            // Must then be in the variable list.
            self.variable_position(old)?;
        } else if let Some(index) = fixed_index {
            let arg = *self
                .encoding(parent)?
                .fixed_args()
                .get(index)
                .ok_or(AmlError::InvalidParameter)?;
            self.check_fixed_compat(arg, new)?;
        }

        let delta = self.subtree_size(new)? as i64 - self.subtree_size(old)? as i64;
        let mut changes = Vec::new();
        if delta != 0 {
            self.plan_size_propagation(Some(parent), from_variable, delta, &mut changes)?;
        }
        self.apply_changes(changes)?;

        if let Some(index) = fixed_index {
            self.node_mut(parent)?.fixed[index] = Some(new);
        } else {
            let (_, index) = self.variable_position(old)?;
            self.node_mut(parent)?.children[index] = new;
        }
        self.node_mut(new)?.parent = Some(parent);
        self.node_mut(old)?.parent = None;
        Ok(())
    }

    /// Replaces the root's table header. The stored `length` field is
    /// preserved, since it is derived from the tree and kept current by
    /// this module; the incoming header's `length` and `checksum` are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] unless the new signature is
    /// `SSDT` or `DSDT`.
    pub fn update_header(&mut self, header: &SdtHeader) -> Result<(), AmlError> {
        if !matches!(&header.signature, b"SSDT" | b"DSDT") {
            return Err(AmlError::InvalidParameter);
        }
        let current = self.header_mut();
        let length = current.length;
        *current = *header;
        current.length = length;
        Ok(())
    }

    // ─── Propagation internals ──────────────────────────────────────────

    fn variable_position(&self, id: NodeId) -> Result<(NodeId, usize), AmlError> {
        let parent = self.parent(id)?.ok_or(AmlError::InvalidParameter)?;
        let index = self
            .children(parent)?
            .iter()
            .position(|&child| child == id)
            .ok_or(AmlError::InvalidParameter)?;
        Ok((parent, index))
    }

    fn came_from_variable(
        &self,
        parent: Option<NodeId>,
        id: NodeId,
    ) -> Result<bool, AmlError> {
        match parent {
            Some(parent) => Ok(self.node(parent)?.children.contains(&id)),
            None => Ok(false),
        }
    }

    fn check_variable_parent(&self, parent: NodeId, child: NodeId) -> Result<(), AmlError> {
        match self.kind(parent)? {
            NodeKind::Root { .. } => Ok(()),
            NodeKind::Object { encoding, .. } => {
                if encoding.attribute.contains(OpAttribute::HAS_CHILD_OBJ) {
                    Ok(())
                } else if encoding.attribute.contains(OpAttribute::HAS_BYTE_LIST) {
                    // Byte lists hold data nodes only.
                    match self.kind(child)? {
                        NodeKind::Data { .. } => Ok(()),
                        _ => Err(AmlError::InvalidParameter),
                    }
                } else {
                    Err(AmlError::InvalidParameter)
                }
            }
            NodeKind::Data { .. } => Err(AmlError::InvalidParameter),
        }
    }

    /// Plans the element-count update of a Package/VarPackage parent.
    /// Returns the size delta the count re-encoding itself contributes
    /// (always 0 for Package's fixed one-byte count).
    fn plan_count(
        &self,
        parent: NodeId,
        new_count: u64,
        changes: &mut Vec<Change>,
    ) -> Result<i64, AmlError> {
        let NodeKind::Object { encoding, .. } = self.kind(parent)? else {
            return Ok(0);
        };
        match encoding.opcode {
            opcode::PACKAGE_OP => {
                let value = u8::try_from(new_count).map_err(|_| AmlError::Overflow)?;
                let count_id = self.node(parent)?.fixed[0].ok_or(AmlError::InvalidParameter)?;
                let (tag, bytes) = self.data(count_id)?;
                if tag != DataType::Uint || bytes.len() != 1 {
                    return Err(AmlError::InvalidParameter);
                }
                changes.push(Change::PackageCount { id: count_id, value });
                Ok(0)
            }
            opcode::VAR_PACKAGE_OP => {
                let count_id = self.node(parent)?.fixed[0].ok_or(AmlError::InvalidParameter)?;
                self.plan_integer(count_id, new_count, changes)
            }
            _ => Ok(0),
        }
    }

    /// Walks the ancestor chain from `ancestor` to the root, planning the
    /// field updates a body-size change of `delta` bytes requires. The
    /// chain stops early at a detached subtree's top. `from_variable`
    /// says whether the change came up through the first ancestor's
    /// variable list (a `Buffer`'s declared-length integer only tracks
    /// its byte list, not its fixed arguments).
    fn plan_size_propagation(
        &self,
        mut ancestor: Option<NodeId>,
        mut from_variable: bool,
        mut delta: i64,
        changes: &mut Vec<Change>,
    ) -> Result<(), AmlError> {
        while let Some(id) = ancestor {
            if delta == 0 {
                return Ok(());
            }
            let node = self.node(id)?;
            match &node.kind {
                NodeKind::Root { header } => {
                    let new_length = i64::from(header.length)
                        .checked_add(delta)
                        .ok_or(AmlError::Overflow)?;
                    let new_length =
                        u32::try_from(new_length).map_err(|_| AmlError::Overflow)?;
                    if (new_length as usize) < SdtHeader::SIZE {
                        return Err(AmlError::Overflow);
                    }
                    changes.push(Change::RootLength { value: new_length });
                    return Ok(());
                }
                NodeKind::Object { encoding, pkg_len } => {
                    let mut body_delta = delta;
                    if encoding.opcode == opcode::BUFFER_OP && from_variable {
                        // The byte list changed; the declared buffer
                        // length integer follows it, and its own width
                        // change feeds back into the body size.
                        let int_id =
                            node.fixed[0].ok_or(AmlError::InvalidParameter)?;
                        let old_value = self.integer_value(int_id)?;
                        let new_value = i128::from(old_value) + i128::from(delta);
                        let new_value =
                            u64::try_from(new_value).map_err(|_| AmlError::Overflow)?;
                        body_delta += self.plan_integer(int_id, new_value, changes)?;
                    }

                    if encoding.attribute.contains(OpAttribute::HAS_PKG_LENGTH) {
                        let old_pkg = *pkg_len;
                        let old_width = grammar::pkg_length_width(old_pkg)
                            .ok_or(AmlError::InvalidPkgLength)?
                            as i64;
                        let content = i64::from(old_pkg) - old_width + body_delta;
                        let content =
                            u64::try_from(content).map_err(|_| AmlError::InvalidParameter)?;
                        let new_pkg = solve_pkg_len(content)?;
                        changes.push(Change::PkgLen { id, value: new_pkg });
                        delta = i64::from(new_pkg) - i64::from(old_pkg);
                    } else {
                        delta = body_delta;
                    }

                    from_variable = self.came_from_variable(node.parent, id)?;
                    ancestor = node.parent;
                }
                NodeKind::Data { .. } => return Err(AmlError::InvalidParameter),
            }
        }
        Ok(())
    }

    /// Applies a validated plan. New arena slots (integer data children
    /// appearing on a Zero/One to prefix promotion) are allocated first,
    /// so an allocation failure still leaves the tree unchanged.
    fn apply_changes(&mut self, changes: Vec<Change>) -> Result<(), AmlError> {
        let mut created: Vec<(NodeId, NodeId)> = Vec::new();
        for change in &changes {
            if let Change::Integer { id, bytes: Some(bytes), .. } = change {
                if self.node(*id)?.fixed[0].is_none() {
                    match self.new_data(DataType::Uint, bytes) {
                        Ok(data_id) => created.push((*id, data_id)),
                        Err(err) => {
                            for (_, data_id) in created {
                                let _ = self.delete_subtree(data_id);
                            }
                            return Err(err);
                        }
                    }
                }
            }
        }

        for change in changes {
            match change {
                Change::PkgLen { id, value } => {
                    if let NodeKind::Object { pkg_len, .. } = &mut self.node_mut(id)?.kind {
                        *pkg_len = value;
                    }
                }
                Change::RootLength { value } => {
                    self.header_mut().length = value;
                }
                Change::PackageCount { id, value } => {
                    if let NodeKind::Data { bytes, .. } = &mut self.node_mut(id)?.kind {
                        bytes[0] = value;
                    }
                }
                Change::Integer { id, encoding: new_encoding, bytes } => {
                    self.apply_integer(id, new_encoding, bytes, &created)?;
                }
            }
        }
        Ok(())
    }

    fn apply_integer(
        &mut self,
        id: NodeId,
        new_encoding: &'static ByteEncoding,
        bytes: Option<Vec<u8>>,
        created: &[(NodeId, NodeId)],
    ) -> Result<(), AmlError> {
        let existing = self.node(id)?.fixed[0];
        match (bytes, existing) {
            (Some(new_bytes), Some(data_id)) => {
                if let NodeKind::Data { bytes: buf, .. } = &mut self.node_mut(data_id)?.kind {
                    buf.clear();
                    buf.extend_from_slice(&new_bytes);
                }
            }
            (Some(_), None) => {
                let data_id = created
                    .iter()
                    .find(|(object, _)| *object == id)
                    .map(|(_, data)| *data)
                    .ok_or(AmlError::InvalidParameter)?;
                self.node_mut(data_id)?.parent = Some(id);
                self.node_mut(id)?.fixed[0] = Some(data_id);
            }
            (None, Some(data_id)) => {
                self.node_mut(id)?.fixed[0] = None;
                self.node_mut(data_id)?.parent = None;
                self.delete_subtree(data_id)?;
            }
            (None, None) => {}
        }
        if let NodeKind::Object { encoding, .. } = &mut self.node_mut(id)?.kind {
            *encoding = new_encoding;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use alloc::vec::Vec;

    use super::*;
    use crate::resource;

    fn empty_tree() -> AmlTree {
        AmlTree::new(SdtHeader {
            signature: *b"SSDT",
            length: SdtHeader::SIZE as u32,
            revision: 2,
            checksum: 0,
            oem_id: *b"OEMID ",
            oem_table_id: *b"TESTTEST",
            oem_revision: 1,
            creator_id: 0,
            creator_revision: 0,
        })
    }

    fn new_integer(tree: &mut AmlTree, value: u64) -> NodeId {
        let (encoding, bytes) = integer_encoding(value).unwrap();
        let id = tree.new_object(encoding, 0).unwrap();
        if let Some(bytes) = bytes {
            let data = tree.new_data(DataType::Uint, &bytes).unwrap();
            tree.set_fixed_arg(id, 0, data).unwrap();
        }
        id
    }

    /// Builds `Name(NAM0, Buffer(len) { bytes... })` under the root and
    /// returns (name, buffer, length-integer, content-data) ids.
    ///
    /// The buffer starts empty (pkg_len 1 covers only the PkgLength byte
    /// itself) and is filled through the mutation API, which maintains
    /// the length integer and every enclosing size field.
    fn build_name_buffer(tree: &mut AmlTree, content: &[u8]) -> (NodeId, NodeId, NodeId, NodeId) {
        let name_op = ByteEncoding::lookup(opcode::NAME_OP, 0).unwrap();
        let buffer_op = ByteEncoding::lookup(opcode::BUFFER_OP, 0).unwrap();

        let name = tree.new_object(name_op, 0).unwrap();
        let name_str = tree.new_data(DataType::NameString, b"NAM0").unwrap();
        tree.set_fixed_arg(name, 0, name_str).unwrap();

        let buffer = tree.new_object(buffer_op, 1).unwrap();
        let length = new_integer(tree, 0);
        tree.set_fixed_arg(buffer, 0, length).unwrap();
        let data = tree.new_data(DataType::Raw, content).unwrap();
        tree.append_child(buffer, data).unwrap();

        tree.set_fixed_arg(name, 1, buffer).unwrap();
        let root = tree.root();
        tree.append_child(root, name).unwrap();
        (name, buffer, length, data)
    }

    #[test]
    fn solve_pkg_len_fixed_point() {
        assert_eq!(solve_pkg_len(0), Ok(1));
        assert_eq!(solve_pkg_len(62), Ok(63)); // 62 + 1 fits one byte
        assert_eq!(solve_pkg_len(63), Ok(65)); // needs the two-byte form
        assert_eq!(solve_pkg_len(0xFFD), Ok(0xFFF));
        assert_eq!(solve_pkg_len(0xFFE), Ok(0x1001));
        assert_eq!(
            solve_pkg_len(u64::from(grammar::MAX_PKG_LENGTH)),
            Err(AmlError::Overflow)
        );
    }

    #[test]
    fn integer_encoding_is_minimal() {
        for (value, op, width) in [
            (0u64, opcode::ZERO_OP, 0usize),
            (1, opcode::ONE_OP, 0),
            (2, opcode::BYTE_PREFIX, 1),
            (0xFF, opcode::BYTE_PREFIX, 1),
            (0x100, opcode::WORD_PREFIX, 2),
            (0xFFFF, opcode::WORD_PREFIX, 2),
            (0x1_0000, opcode::DWORD_PREFIX, 4),
            (u64::from(u32::MAX), opcode::DWORD_PREFIX, 4),
            (1 << 32, opcode::QWORD_PREFIX, 8),
            (u64::MAX, opcode::QWORD_PREFIX, 8),
        ] {
            let (encoding, bytes) = integer_encoding(value).unwrap();
            assert_eq!(encoding.opcode, op, "{value:#x}");
            assert_eq!(bytes.map_or(0, |b| b.len()), width, "{value:#x}");
        }
    }

    #[test]
    fn integer_round_trip_through_tree() {
        let mut tree = empty_tree();
        for value in [0u64, 1, 0x7F, 0x1234, 0xDEAD_BEEF, u64::MAX] {
            let id = new_integer(&mut tree, value);
            assert_eq!(tree.integer_value(id), Ok(value));
        }
    }

    #[test]
    fn set_integer_promotes_and_demotes() {
        let mut tree = empty_tree();
        let id = new_integer(&mut tree, 5);
        assert_eq!(tree.subtree_size(id), Ok(2));

        tree.set_integer(id, 0x1234).unwrap();
        assert_eq!(tree.encoding(id).unwrap().opcode, opcode::WORD_PREFIX);
        assert_eq!(tree.integer_value(id), Ok(0x1234));
        assert_eq!(tree.subtree_size(id), Ok(3));

        tree.set_integer(id, 0).unwrap();
        assert_eq!(tree.encoding(id).unwrap().opcode, opcode::ZERO_OP);
        assert_eq!(tree.subtree_size(id), Ok(1));
        // ZeroOp has no fixed-arg slots and the dropped data child must
        // not linger in the arena: only the root and the object remain.
        assert!(tree.fixed_slots(id).unwrap().is_empty());
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn buffer_grows_through_byte_list_update() {
        let mut tree = empty_tree();
        let (_, buffer, length, data) = build_name_buffer(&mut tree, &[0u8; 4]);
        let pkg_before = tree.pkg_len(buffer).unwrap();
        let table_before = tree.header().length;

        // Grow the content by 3 bytes.
        tree.update_data(data, &[1u8; 7]).unwrap();
        assert_eq!(tree.integer_value(length), Ok(7));
        assert_eq!(tree.pkg_len(buffer).unwrap(), pkg_before + 3);
        assert_eq!(tree.header().length, table_before + 3);
    }

    #[test]
    fn width_promotion_cascades_at_255_boundary() {
        let mut tree = empty_tree();
        let (_, buffer, length, data) = build_name_buffer(&mut tree, &[0u8; 255]);
        assert_eq!(
            tree.encoding(length).unwrap().opcode,
            opcode::BYTE_PREFIX
        );
        let pkg_before = tree.pkg_len(buffer).unwrap();
        let table_before = tree.header().length;

        // 255 -> 256 content bytes: +1 content byte, +1 integer width.
        tree.update_data(data, &[0u8; 256]).unwrap();
        assert_eq!(
            tree.encoding(length).unwrap().opcode,
            opcode::WORD_PREFIX
        );
        assert_eq!(tree.integer_value(length), Ok(256));
        assert_eq!(tree.pkg_len(buffer).unwrap(), pkg_before + 2);
        assert_eq!(tree.header().length, table_before + 2);

        // The invariant holds structurally, not just by bookkeeping.
        let body = tree.subtree_size(tree.root()).unwrap();
        assert_eq!(
            tree.header().length,
            SdtHeader::SIZE as u32 + u32::try_from(body).unwrap()
        );
    }

    #[test]
    fn uint_update_must_keep_width() {
        let mut tree = empty_tree();
        let data = tree.new_data(DataType::Uint, &[0x12, 0x34]).unwrap();
        assert_eq!(
            tree.update_data(data, &[0x12, 0x34, 0x56, 0x78]),
            Err(AmlError::InvalidParameter)
        );
        tree.update_data(data, &[0xAB, 0xCD]).unwrap();
        assert_eq!(tree.data(data).unwrap().1, &[0xAB, 0xCD]);
    }

    #[test]
    fn package_count_follows_inserts_and_removals() {
        let mut tree = empty_tree();
        let package_op = ByteEncoding::lookup(opcode::PACKAGE_OP, 0).unwrap();
        let package = tree.new_object(package_op, 1).unwrap();
        let count = tree.new_data(DataType::Uint, &[0]).unwrap();
        tree.set_fixed_arg(package, 0, count).unwrap();
        tree.append_child(tree.root(), package).unwrap();

        let a = new_integer(&mut tree, 2);
        let b = new_integer(&mut tree, 3);
        tree.append_child(package, a).unwrap();
        tree.append_child(package, b).unwrap();
        assert_eq!(tree.data(count).unwrap().1, &[2]);

        tree.remove_child(a).unwrap();
        assert_eq!(tree.data(count).unwrap().1, &[1]);
        tree.delete_subtree(a).unwrap();
    }

    #[test]
    fn package_count_overflow_is_rejected_atomically() {
        let mut tree = empty_tree();
        let package_op = ByteEncoding::lookup(opcode::PACKAGE_OP, 0).unwrap();
        let package = tree.new_object(package_op, 1).unwrap();
        let count = tree.new_data(DataType::Uint, &[0]).unwrap();
        tree.set_fixed_arg(package, 0, count).unwrap();
        tree.append_child(tree.root(), package).unwrap();

        for _ in 0..255 {
            let element = new_integer(&mut tree, 0);
            tree.append_child(package, element).unwrap();
        }
        let table_before = tree.header().length;
        let pkg_before = tree.pkg_len(package).unwrap();

        let overflowing = new_integer(&mut tree, 0);
        assert_eq!(
            tree.append_child(package, overflowing),
            Err(AmlError::Overflow)
        );
        // Nothing moved: counts, sizes and attachment are untouched.
        assert_eq!(tree.children(package).unwrap().len(), 255);
        assert_eq!(tree.data(count).unwrap().1, &[255]);
        assert_eq!(tree.header().length, table_before);
        assert_eq!(tree.pkg_len(package), Ok(pkg_before));
        assert_eq!(tree.parent(overflowing), Ok(None));
    }

    #[test]
    fn var_package_count_integer_resizes() {
        let mut tree = empty_tree();
        let var_package_op = ByteEncoding::lookup(opcode::VAR_PACKAGE_OP, 0).unwrap();
        let package = tree.new_object(var_package_op, 1).unwrap();
        let count = new_integer(&mut tree, 0);
        tree.set_fixed_arg(package, 0, count).unwrap();
        tree.append_child(tree.root(), package).unwrap();
        let table_before = tree.header().length;

        // First insert promotes the count from ZeroOp to OneOp (no width
        // change); the second to BytePrefix (one extra byte).
        let first = new_integer(&mut tree, 7);
        tree.append_child(package, first).unwrap();
        assert_eq!(tree.integer_value(count), Ok(1));
        assert_eq!(tree.header().length, table_before + 2);

        let second = new_integer(&mut tree, 8);
        tree.append_child(package, second).unwrap();
        assert_eq!(tree.integer_value(count), Ok(2));
        assert_eq!(tree.encoding(count).unwrap().opcode, opcode::BYTE_PREFIX);
        assert_eq!(tree.header().length, table_before + 2 + 2 + 1);
    }

    #[test]
    fn replace_swaps_in_place() {
        let mut tree = empty_tree();
        let (_, buffer, _, data) = build_name_buffer(&mut tree, &[0u8; 4]);

        let replacement = tree
            .new_data(DataType::ResourceData, &resource::END_TAG_BYTES)
            .unwrap();
        tree.replace_node(data, replacement).unwrap();
        assert_eq!(tree.children(buffer).unwrap(), &[replacement]);
        assert_eq!(tree.parent(data), Ok(None));
        // 4 raw bytes -> 2 end-tag bytes.
        assert_eq!(tree.integer_value(tree.fixed_arg(buffer, 0).unwrap().unwrap()), Ok(2));
        tree.delete_subtree(data).unwrap();
    }

    #[test]
    fn byte_list_rejects_object_children() {
        let mut tree = empty_tree();
        let (_, buffer, _, _) = build_name_buffer(&mut tree, &[0u8; 2]);
        let stray = new_integer(&mut tree, 9);
        assert_eq!(
            tree.append_child(buffer, stray),
            Err(AmlError::InvalidParameter)
        );
    }

    #[test]
    fn attached_nodes_cannot_be_inserted_twice() {
        let mut tree = empty_tree();
        let (name, _, _, _) = build_name_buffer(&mut tree, &[0u8; 2]);
        let root = tree.root();
        assert_eq!(
            tree.append_child(root, name),
            Err(AmlError::InvalidParameter)
        );
    }

    #[test]
    fn remove_rejects_fixed_slot_occupants() {
        let mut tree = empty_tree();
        let (_, _, length, _) = build_name_buffer(&mut tree, &[0u8; 2]);
        assert_eq!(tree.remove_child(length), Err(AmlError::InvalidParameter));
    }

    #[test]
    fn update_header_keeps_derived_length() {
        let mut tree = empty_tree();
        build_name_buffer(&mut tree, &[0u8; 2]);
        let maintained = tree.header().length;

        let mut header = *tree.header();
        header.signature = *b"DSDT";
        header.oem_table_id = *b"PATCHED ";
        header.length = 9999;
        tree.update_header(&header).unwrap();
        assert_eq!(tree.header().signature, *b"DSDT");
        assert_eq!(tree.header().oem_table_id, *b"PATCHED ");
        assert_eq!(tree.header().length, maintained);

        header.signature = *b"FACP";
        assert_eq!(tree.update_header(&header), Err(AmlError::InvalidParameter));
    }

    #[test]
    fn subtree_sizes_add_up() {
        let mut tree = empty_tree();
        let (name, buffer, length, data) = build_name_buffer(&mut tree, &[0u8; 4]);
        // NameOp(1) + "NAM0"(4) + buffer
        let buffer_size = tree.subtree_size(buffer).unwrap();
        assert_eq!(tree.subtree_size(name), Ok(5 + buffer_size));
        // BufferOp(1) + pkg(1) + BytePrefix integer(2) + content(4)
        assert_eq!(buffer_size, 8);
        assert_eq!(tree.subtree_size(length), Ok(2));
        assert_eq!(tree.subtree_size(data), Ok(4));
        assert_eq!(
            u64::from(tree.header().length),
            SdtHeader::SIZE as u64 + tree.subtree_size(tree.root()).unwrap()
        );
    }

    #[test]
    fn detached_subtree_edits_do_not_touch_the_table() {
        let mut tree = empty_tree();
        let table_before = tree.header().length;
        let detached = tree.new_data(DataType::Raw, &[1, 2, 3]).unwrap();
        tree.update_data(detached, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(tree.header().length, table_before);
    }

    #[test]
    fn insert_positions() {
        let mut tree = empty_tree();
        let root = tree.root();
        let a = new_integer(&mut tree, 2);
        let b = new_integer(&mut tree, 3);
        let c = new_integer(&mut tree, 4);
        let d = new_integer(&mut tree, 5);
        tree.append_child(root, a).unwrap();
        tree.prepend_child(root, b).unwrap();
        tree.insert_child_before(a, c).unwrap();
        tree.insert_child_after(b, d).unwrap();
        let order: Vec<u64> = tree
            .children(root)
            .unwrap()
            .iter()
            .map(|&id| tree.integer_value(id).unwrap())
            .collect();
        assert_eq!(order, [3, 5, 4, 2]);
    }
}
