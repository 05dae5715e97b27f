//! Namespace path lookup.
//!
//! Namespace-defining statements (`Scope`, `Device`, `Name`, `Method`,
//! ...) carry a NameString as their first fixed argument; resolving it
//! against the enclosing scope yields the absolute path the statement
//! defines. Lookup walks the tree depth-first, tracking the scope each
//! statement is resolved in, and matches against an absolute dotted ASL
//! path such as `\_SB_.CMN0._CRS`.

use alloc::vec::Vec;

use crate::grammar::OpAttribute;
use crate::name::AmlName;
use crate::node::{AmlTree, NodeId};
use crate::AmlError;

type Path = Vec<[u8; 4]>;

/// Resolves `name` against the scope path `scope`.
fn resolve(scope: &[[u8; 4]], name: &AmlName) -> Result<Path, AmlError> {
    if name.absolute {
        return Ok(name.segments.clone());
    }
    let levels = usize::from(name.parent_levels);
    let kept = scope.len().checked_sub(levels).ok_or(AmlError::InvalidName)?;
    let mut path = scope[..kept].to_vec();
    path.extend_from_slice(&name.segments);
    Ok(path)
}

impl AmlTree {
    /// Finds the node defining the absolute ASL path `path`
    /// (`\_SB_.CMN0._CRS`). The path `\` names the root node itself.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidName`] for a malformed or relative
    /// path and [`AmlError::NotFound`] if nothing defines it.
    pub fn find_node(&self, path: &str) -> Result<NodeId, AmlError> {
        let target = AmlName::from_asl(path)?;
        if !target.absolute {
            return Err(AmlError::InvalidName);
        }
        if target.segments.is_empty() {
            return Ok(self.root());
        }
        self.find_in(self.root(), &[], &target.segments)?
            .ok_or(AmlError::NotFound)
    }

    fn find_in(
        &self,
        id: NodeId,
        scope: &[[u8; 4]],
        target: &[[u8; 4]],
    ) -> Result<Option<NodeId>, AmlError> {
        for &child in self.children(id)? {
            // Bare-name data nodes in term lists define nothing.
            let Ok(encoding) = self.encoding(child) else {
                continue;
            };

            let mut child_scope: Option<Path> = None;
            if encoding.attribute.contains(OpAttribute::IN_NAMESPACE) {
                let name = self.node_name(child)?;
                let absolute = resolve(scope, &name)?;
                if absolute == target {
                    return Ok(Some(child));
                }
                child_scope = Some(absolute);
            }

            if encoding.attribute.contains(OpAttribute::HAS_CHILD_OBJ) {
                let next_scope = child_scope.as_deref().unwrap_or(scope);
                if let Some(found) = self.find_in(child, next_scope, target)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use alloc::vec::Vec;

    use super::*;
    use crate::grammar::opcode;
    use crate::sdt::{self, SdtHeader};

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

    /// Scope(\_SB_) { Device(CMN0) { Name(_UID, 0) Name(VAL0, 7) } }
    fn sample_tree() -> AmlTree {
        let mut device_body = Vec::new();
        device_body.extend_from_slice(b"CMN0");
        device_body.push(opcode::NAME_OP);
        device_body.extend_from_slice(b"_UID");
        device_body.push(opcode::ZERO_OP);
        device_body.push(opcode::NAME_OP);
        device_body.extend_from_slice(b"VAL0");
        device_body.push(opcode::BYTE_PREFIX);
        device_body.push(7);

        let mut body = Vec::new();
        body.push(opcode::SCOPE_OP);
        body.push(0);
        body.extend_from_slice(b"\\_SB_");
        body.extend_from_slice(&[0x5B, 0x82]);
        body.push((device_body.len() + 1) as u8);
        body.extend_from_slice(&device_body);
        body[1] = (body.len() - 1) as u8;
        AmlTree::parse(&table(&body)).unwrap()
    }

    #[test]
    fn finds_nested_definitions() {
        let tree = sample_tree();

        let scope = tree.find_node("\\_SB_").unwrap();
        assert_eq!(tree.encoding(scope).unwrap().opcode, opcode::SCOPE_OP);

        let device = tree.find_node("\\_SB_.CMN0").unwrap();
        assert_eq!(tree.encoding(device).unwrap().sub_opcode, 0x82);

        let uid = tree.find_node("\\_SB_.CMN0._UID").unwrap();
        assert_eq!(tree.encoding(uid).unwrap().opcode, opcode::NAME_OP);
        assert_eq!(tree.node_name(uid).unwrap().segments, [*b"_UID"]);

        // Case-insensitive input.
        assert_eq!(tree.find_node("\\_sb_.cmn0.val0"), tree.find_node("\\_SB_.CMN0.VAL0"));
    }

    #[test]
    fn root_path_is_the_root_node() {
        let tree = sample_tree();
        assert_eq!(tree.find_node("\\"), Ok(tree.root()));
    }

    #[test]
    fn missing_and_malformed_paths() {
        let tree = sample_tree();
        assert_eq!(tree.find_node("\\_SB_.NOPE"), Err(AmlError::NotFound));
        // The name exists, but not at the root scope.
        assert_eq!(tree.find_node("\\CMN0"), Err(AmlError::NotFound));
        // Relative paths are not resolvable without a current scope.
        assert_eq!(tree.find_node("_SB_.CMN0"), Err(AmlError::InvalidName));
        assert_eq!(tree.find_node("\\BAD!"), Err(AmlError::InvalidName));
    }

    #[test]
    fn multi_segment_scope_names_resolve() {
        // Scope(\_SB_.CMN0) { Name(VAL1, 1) } with a dual-name target.
        let mut body = Vec::new();
        body.push(opcode::SCOPE_OP);
        body.push(0);
        body.push(b'\\');
        body.push(0x2E);
        body.extend_from_slice(b"_SB_CMN0");
        body.push(opcode::NAME_OP);
        body.extend_from_slice(b"VAL1");
        body.push(opcode::ONE_OP);
        body[1] = (body.len() - 1) as u8;

        let tree = AmlTree::parse(&table(&body)).unwrap();
        assert!(tree.find_node("\\_SB_.CMN0.VAL1").is_ok());
    }
}
