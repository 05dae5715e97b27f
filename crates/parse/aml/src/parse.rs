//! Recursive-descent parser for AML definition blocks.
//!
//! The parser walks the byte stream with the grammar table: identify the
//! opcode, decode its PkgLength bound if it has one, read the fixed
//! arguments (recursing for nested objects), then consume the variable
//! child list or byte list the grammar announces. A bare NameString in
//! statement position (a method invocation target or named reference)
//! becomes a data node directly, with no object wrapper.
//!
//! Any inconsistency aborts the whole parse; the partially-built arena is
//! dropped with the tree, so no cleanup pass is needed.

use crate::grammar::{self, ArgType, ByteEncoding, EXT_OP_PREFIX, OpAttribute, opcode};
use crate::name;
use crate::node::{AmlTree, DataType, NodeId};
use crate::sdt::SdtHeader;
use crate::{AmlError, resource};

impl AmlTree {
    /// Parses a raw DSDT/SSDT table (header plus AML body) into a tree.
    ///
    /// The declared header `Length` bounds the parse; `table` may carry
    /// trailing bytes beyond it. The stored checksum is not verified,
    /// since a template table is often patched and re-checksummed anyway.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if the signature is not
    /// `SSDT`/`DSDT` or the declared length is inconsistent with the
    /// input, [`AmlError::UnexpectedEnd`] on truncation, and
    /// [`AmlError::UnknownOpcode`]/[`AmlError::InvalidPkgLength`]/
    /// [`AmlError::InvalidName`] on malformed bytecode.
    pub fn parse(table: &[u8]) -> Result<Self, AmlError> {
        let header = SdtHeader::parse(table).ok_or(AmlError::UnexpectedEnd)?;
        if !matches!(&header.signature, b"SSDT" | b"DSDT") {
            return Err(AmlError::InvalidParameter);
        }
        let length = header.length as usize;
        if length < SdtHeader::SIZE {
            return Err(AmlError::InvalidParameter);
        }
        if length > table.len() {
            return Err(AmlError::UnexpectedEnd);
        }

        let mut tree = Self::new(header);
        let body = &table[SdtHeader::SIZE..length];
        let root = tree.root();
        let mut pos = 0usize;
        while pos < body.len() {
            let (child, consumed) = tree.parse_statement(&body[pos..])?;
            tree.attach_child_raw(root, child)?;
            pos += consumed;
        }
        Ok(tree)
    }

    /// Parses one statement from the front of `data` (which the caller
    /// has already bounded), returning the new subtree and the number of
    /// bytes consumed.
    fn parse_statement(&mut self, data: &[u8]) -> Result<(NodeId, usize), AmlError> {
        let first = *data.first().ok_or(AmlError::UnexpectedEnd)?;

        // A bare NameString in statement position.
        if is_name_start(first) {
            return self.parse_bare_name(data);
        }

        if first == EXT_OP_PREFIX && data.len() < 2 {
            return Err(AmlError::UnexpectedEnd);
        }
        let encoding = ByteEncoding::from_op_bytes(data).ok_or(AmlError::UnknownOpcode)?;
        let mut pos = encoding.op_byte_count() as usize;

        // The PkgLength bound, when present, supersedes the caller's.
        let mut limit = data.len();
        let mut pkg_len = 0u32;
        if encoding.attribute.contains(OpAttribute::HAS_PKG_LENGTH) {
            let (value, width) =
                grammar::decode_pkg_length(&data[pos..]).ok_or(AmlError::UnexpectedEnd)?;
            if (value as usize) < width || pos + value as usize > data.len() {
                return Err(AmlError::InvalidPkgLength);
            }
            pkg_len = value;
            // The PkgLength value counts its own bytes, so the limit is
            // measured from the field's start; the cursor moves past it.
            limit = pos + value as usize;
            pos += width;
        }

        let object = self.new_object(encoding, pkg_len)?;

        for (index, &arg) in encoding.fixed_args().iter().enumerate() {
            let (child, consumed) = self.parse_fixed_arg(arg, &data[pos..limit])?;
            self.attach_fixed_raw(object, index, child)?;
            pos += consumed;
        }

        if encoding.attribute.contains(OpAttribute::HAS_CHILD_OBJ) {
            while pos < limit {
                let (child, consumed) = self.parse_statement(&data[pos..limit])?;
                self.attach_child_raw(object, child)?;
                pos += consumed;
            }
        }

        if encoding.attribute.contains(OpAttribute::HAS_BYTE_LIST) {
            self.parse_byte_list(object, encoding, &data[pos..limit])?;
            pos = limit;
        }

        Ok((object, pos))
    }

    fn parse_bare_name(&mut self, data: &[u8]) -> Result<(NodeId, usize), AmlError> {
        let size = name::aml_name_size(data)?;
        let node = self.new_data(DataType::NameString, &data[..size])?;
        Ok((node, size))
    }

    /// Determines a fixed argument's byte extent from its grammar type
    /// and builds the corresponding child node.
    fn parse_fixed_arg(
        &mut self,
        arg: ArgType,
        data: &[u8],
    ) -> Result<(NodeId, usize), AmlError> {
        match arg {
            ArgType::UInt8 | ArgType::UInt16 | ArgType::UInt32 | ArgType::UInt64 => {
                let width = match arg {
                    ArgType::UInt8 => 1,
                    ArgType::UInt16 => 2,
                    ArgType::UInt32 => 4,
                    _ => 8,
                };
                let bytes = data.get(..width).ok_or(AmlError::UnexpectedEnd)?;
                let node = self.new_data(DataType::Uint, bytes)?;
                Ok((node, width))
            }
            ArgType::Name => self.parse_bare_name(data),
            ArgType::String => {
                let nul = data
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(AmlError::UnexpectedEnd)?;
                let node = self.new_data(DataType::String, &data[..=nul])?;
                Ok((node, nul + 1))
            }
            // A nested object; a bare NameString is also accepted here
            // (the recursion handles both).
            ArgType::Object => self.parse_statement(data),
            ArgType::None => Err(AmlError::InvalidParameter),
        }
    }

    /// Consumes a byte list: resource data elements for a `Buffer` whose
    /// contents validate as a resource data list, one opaque raw node for
    /// any other non-empty `Buffer`, and one undecoded field-element node
    /// for the Field family (structural field-list decoding is not
    /// implemented).
    fn parse_byte_list(
        &mut self,
        object: NodeId,
        encoding: &'static ByteEncoding,
        data: &[u8],
    ) -> Result<(), AmlError> {
        if data.is_empty() {
            return Ok(());
        }
        if encoding.opcode == opcode::BUFFER_OP && resource::validate_list(data).is_ok() {
            for element in resource::elements(data) {
                let child = self.new_data(DataType::ResourceData, element)?;
                self.attach_child_raw(object, child)?;
            }
        } else {
            let tag = if encoding.opcode == opcode::BUFFER_OP {
                DataType::Raw
            } else {
                DataType::FieldElement
            };
            let child = self.new_data(tag, data)?;
            self.attach_child_raw(object, child)?;
        }
        Ok(())
    }
}

fn is_name_start(byte: u8) -> bool {
    ByteEncoding::lookup(byte, 0).is_some_and(ByteEncoding::is_name_char)
}

#[cfg(test)]
mod tests {
    extern crate std;
    use alloc::vec::Vec;

    use super::*;
    use crate::node::NodeKind;
    use crate::sdt;

    /// Wraps `body` in a well-formed SSDT.
    fn table(body: &[u8]) -> Vec<u8> {
        let header = SdtHeader {
            signature: *b"SSDT",
            length: (SdtHeader::SIZE + body.len()) as u32,
            revision: 2,
            checksum: 0,
            oem_id: *b"OEMID ",
            oem_table_id: *b"TESTTEST",
            oem_revision: 1,
            creator_id: 0,
            creator_revision: 0,
        };
        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(body);
        out[SdtHeader::CHECKSUM_OFFSET] = sdt::compute_checksum(&out);
        out
    }

    #[test]
    fn minimal_table_with_one_zero_op() {
        let table = table(&[0x00]);
        assert_eq!(table.len(), 37);
        let tree = AmlTree::parse(&table).unwrap();
        let children = tree.children(tree.root()).unwrap();
        assert_eq!(children.len(), 1);
        let encoding = tree.encoding(children[0]).unwrap();
        assert_eq!(encoding.opcode, opcode::ZERO_OP);
        assert_eq!(tree.children(children[0]).unwrap().len(), 0);
    }

    #[test]
    fn rejects_bad_signature_and_lengths() {
        let mut bad_sig = table(&[0x00]);
        bad_sig[..4].copy_from_slice(b"FACP");
        assert_eq!(
            AmlTree::parse(&bad_sig).unwrap_err(),
            AmlError::InvalidParameter
        );

        let truncated = table(&[0x00]);
        assert_eq!(
            AmlTree::parse(&truncated[..truncated.len() - 1]).unwrap_err(),
            AmlError::UnexpectedEnd
        );

        assert_eq!(
            AmlTree::parse(&[0u8; 10]).unwrap_err(),
            AmlError::UnexpectedEnd
        );
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        // 0x02 has no grammar entry.
        let plain = table(&[0x02]);
        assert_eq!(AmlTree::parse(&plain).unwrap_err(), AmlError::UnknownOpcode);

        // Unknown extended opcode.
        let extended = table(&[0x5B, 0x7F]);
        assert_eq!(
            AmlTree::parse(&extended).unwrap_err(),
            AmlError::UnknownOpcode
        );
    }

    #[test]
    fn name_op_with_integer() {
        // Name(ABCD, 0x1234)
        let mut body = Vec::new();
        body.push(opcode::NAME_OP);
        body.extend_from_slice(b"ABCD");
        body.push(opcode::WORD_PREFIX);
        body.extend_from_slice(&0x1234u16.to_le_bytes());
        let tree = AmlTree::parse(&table(&body)).unwrap();

        let name = tree.children(tree.root()).unwrap()[0];
        let name_str = tree.fixed_arg(name, 0).unwrap().unwrap();
        assert_eq!(tree.data(name_str).unwrap(), (DataType::NameString, &b"ABCD"[..]));

        let value = tree.fixed_arg(name, 1).unwrap().unwrap();
        assert_eq!(tree.integer_value(value), Ok(0x1234));
    }

    #[test]
    fn scope_with_device_and_method_invocation() {
        // Scope(\_SB_) { Device(DEV0) {} MTH0 }
        let mut device = Vec::new();
        device.extend_from_slice(&[0x5B, 0x82]);
        device.push(0); // pkg placeholder
        device.extend_from_slice(b"DEV0");
        device[2] = (device.len() - 2) as u8; // pkg covers itself + name

        let mut body = Vec::new();
        body.push(opcode::SCOPE_OP);
        body.push(0); // pkg placeholder
        body.extend_from_slice(b"\\_SB_");
        body.extend_from_slice(&device);
        body.extend_from_slice(b"MTH0");
        body[1] = (body.len() - 1) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        let scope = tree.children(tree.root()).unwrap()[0];
        assert_eq!(tree.encoding(scope).unwrap().opcode, opcode::SCOPE_OP);
        assert_eq!(tree.node_name(scope).unwrap().segments, [*b"_SB_"]);

        let children: Vec<NodeId> = tree.children(scope).unwrap().to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(tree.encoding(children[0]).unwrap().sub_opcode, 0x82);
        // The bare method invocation parses to a NameString data node.
        assert_eq!(
            tree.data(children[1]).unwrap(),
            (DataType::NameString, &b"MTH0"[..])
        );
    }

    #[test]
    fn buffer_with_resource_data_splits_into_elements() {
        // Buffer(0x0B) { IO(...), EndTag }
        let io_port = [0x47, 0x01, 0xF8, 0x00, 0xF8, 0x00, 0x01, 0x08];
        let mut content = Vec::new();
        content.extend_from_slice(&io_port);
        content.extend_from_slice(&resource::END_TAG_BYTES);

        let mut body = Vec::new();
        body.push(opcode::BUFFER_OP);
        body.push(0); // pkg placeholder
        body.push(opcode::BYTE_PREFIX);
        body.push(content.len() as u8);
        body.extend_from_slice(&content);
        body[1] = (body.len() - 1) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        let buffer = tree.children(tree.root()).unwrap()[0];
        assert_eq!(tree.pkg_len(buffer).unwrap(), body.len() as u32 - 1);

        let elements: Vec<NodeId> = tree.children(buffer).unwrap().to_vec();
        assert_eq!(elements.len(), 2);
        assert_eq!(
            tree.data(elements[0]).unwrap(),
            (DataType::ResourceData, &io_port[..])
        );
        assert_eq!(
            tree.data(elements[1]).unwrap(),
            (DataType::ResourceData, &resource::END_TAG_BYTES[..])
        );
    }

    #[test]
    fn pkg_length_byte_is_not_read_as_an_opcode() {
        // Buffer(0x0B) { Interrupt(...), EndTag }. The PkgLength byte is
        // 0x0E, which is also QWordPrefix; the fixed arguments must be
        // read from the byte after it.
        let interrupt = [0x89, 0x06, 0x00, 0x01, 0x01, 0x2A, 0x00, 0x00, 0x00];
        let mut content = Vec::new();
        content.extend_from_slice(&interrupt);
        content.extend_from_slice(&resource::END_TAG_BYTES);

        let mut body = Vec::new();
        body.push(opcode::BUFFER_OP);
        body.push(0); // pkg placeholder
        body.push(opcode::BYTE_PREFIX);
        body.push(content.len() as u8);
        body.extend_from_slice(&content);
        body[1] = (body.len() - 1) as u8;
        assert_eq!(body[1], 0x0E);

        let tree = AmlTree::parse(&table(&body)).unwrap();
        let buffer = tree.children(tree.root()).unwrap()[0];
        let length = tree.fixed_arg(buffer, 0).unwrap().unwrap();
        assert_eq!(tree.integer_value(length), Ok(11));
        let elements = tree.children(buffer).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(
            tree.data(elements[0]).unwrap(),
            (DataType::ResourceData, &interrupt[..])
        );
    }

    #[test]
    fn buffer_without_resource_data_stays_raw() {
        // Buffer(4) { 0xDE 0xAD 0xBE 0xEF }
        let mut body = Vec::new();
        body.push(opcode::BUFFER_OP);
        body.push(0);
        body.push(opcode::BYTE_PREFIX);
        body.push(4);
        body.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        body[1] = (body.len() - 1) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        let buffer = tree.children(tree.root()).unwrap()[0];
        let elements = tree.children(buffer).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(
            tree.data(elements[0]).unwrap(),
            (DataType::Raw, &[0xDE, 0xAD, 0xBE, 0xEF][..])
        );
    }

    #[test]
    fn field_list_is_kept_opaque() {
        // Field(REG0, AnyAcc, NoLock, Preserve) { FLD0, 32 }
        let mut body = Vec::new();
        body.extend_from_slice(&[0x5B, 0x81]);
        body.push(0); // pkg placeholder
        body.extend_from_slice(b"REG0");
        body.push(0x00); // field flags
        body.extend_from_slice(b"FLD0");
        body.push(0x20);
        body[2] = (body.len() - 2) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        let field = tree.children(tree.root()).unwrap()[0];
        let elements = tree.children(field).unwrap();
        assert_eq!(elements.len(), 1);
        let (tag, bytes) = tree.data(elements[0]).unwrap();
        assert_eq!(tag, DataType::FieldElement);
        assert_eq!(bytes.len(), 5);
    }

    #[test]
    fn method_with_control_flow_body() {
        // Method(MTH0, 1) { If (Arg0) { Return (One) } Return (Zero) }
        let mut if_stmt = Vec::new();
        if_stmt.push(0xA0); // IfOp
        if_stmt.push(0); // pkg placeholder
        if_stmt.push(0x68); // Arg0
        if_stmt.push(0xA4); // ReturnOp
        if_stmt.push(opcode::ONE_OP);
        if_stmt[1] = (if_stmt.len() - 1) as u8;

        let mut body = Vec::new();
        body.push(opcode::METHOD_OP);
        body.push(0); // pkg placeholder
        body.extend_from_slice(b"MTH0");
        body.push(0x01); // one argument
        body.extend_from_slice(&if_stmt);
        body.push(0xA4); // ReturnOp
        body.push(opcode::ZERO_OP);
        body[1] = (body.len() - 1) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        let method = tree.children(tree.root()).unwrap()[0];
        assert_eq!(tree.encoding(method).unwrap().opcode, opcode::METHOD_OP);
        let statements = tree.children(method).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(tree.encoding(statements[0]).unwrap().opcode, 0xA0);
        assert_eq!(tree.encoding(statements[1]).unwrap().opcode, 0xA4);
    }

    #[test]
    fn pkg_length_beyond_bounds_is_rejected() {
        // ScopeOp claiming 0x30 bytes of body in a 7-byte table body.
        let body = [opcode::SCOPE_OP, 0x30, b'\\', 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            AmlTree::parse(&table(&body)).unwrap_err(),
            AmlError::InvalidPkgLength
        );
    }

    #[test]
    fn truncated_fixed_argument_is_rejected() {
        // WordPrefix with only one payload byte.
        let body = [opcode::NAME_OP, b'A', b'B', b'C', b'D', opcode::WORD_PREFIX, 0x12];
        assert_eq!(
            AmlTree::parse(&table(&body)).unwrap_err(),
            AmlError::UnexpectedEnd
        );
    }

    #[test]
    fn parsed_sizes_match_the_wire() {
        let mut body = Vec::new();
        body.push(opcode::SCOPE_OP);
        body.push(0);
        body.extend_from_slice(b"\\_SB_");
        body.push(opcode::NAME_OP);
        body.extend_from_slice(b"VAL0");
        body.push(opcode::DWORD_PREFIX);
        body.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        body[1] = (body.len() - 1) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        assert_eq!(
            tree.subtree_size(tree.root()),
            Ok(body.len() as u64)
        );
        match tree.kind(tree.root()).unwrap() {
            NodeKind::Root { header } => {
                assert_eq!(header.length as usize, SdtHeader::SIZE + body.len());
            }
            _ => unreachable!(),
        }
    }
}
