//! Serialization of a tree back into a raw table.
//!
//! The writer follows the standard two-call pattern: ask
//! [`AmlTree::serialized_size`] first, then hand a large-enough buffer to
//! [`AmlTree::serialize_into`] (or let [`AmlTree::serialize`] allocate
//! one). The emitted header carries a freshly computed `Length` and
//! checksum, so the output is installable as-is.

use alloc::vec;
use alloc::vec::Vec;

use tessera_binparse::BinaryWriter;

use crate::grammar::{self, EXT_OP_PREFIX, OpAttribute};
use crate::node::{AmlTree, NodeId, NodeKind};
use crate::sdt::{self, SdtHeader};
use crate::AmlError;

impl AmlTree {
    /// Returns the exact number of bytes [`AmlTree::serialize_into`] will
    /// write: the 36-byte header plus the AML body.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::Overflow`] if the total exceeds the header's
    /// 32-bit `Length` field.
    pub fn serialized_size(&self) -> Result<usize, AmlError> {
        let body = self.subtree_size(self.root())?;
        let total = body
            .checked_add(SdtHeader::SIZE as u64)
            .ok_or(AmlError::Overflow)?;
        u32::try_from(total).map_err(|_| AmlError::Overflow)?;
        Ok(total as usize)
    }

    /// Serializes the tree into `buf`, returning the number of bytes
    /// written. The header `Length` is refreshed from the tree and the
    /// checksum byte is stored so the whole table sums to zero modulo
    /// 256. Bytes past the table are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::BufferTooSmall`] (without writing anything) if
    /// `buf` is shorter than [`AmlTree::serialized_size`].
    pub fn serialize_into(&self, buf: &mut [u8]) -> Result<usize, AmlError> {
        let size = self.serialized_size()?;
        if buf.len() < size {
            return Err(AmlError::BufferTooSmall);
        }
        let out = &mut buf[..size];

        {
            let mut writer = BinaryWriter::new(out);
            let mut header = *self.header();
            header.length = size as u32;
            header.checksum = 0;
            header.write_into(&mut writer)?;
            for &child in self.children(self.root())? {
                self.write_node(child, &mut writer)?;
            }
            // Every byte accounted for, or a size field is stale.
            if writer.len() != size {
                return Err(AmlError::InvalidParameter);
            }
        }

        out[SdtHeader::CHECKSUM_OFFSET] = sdt::compute_checksum(out);
        Ok(size)
    }

    /// Serializes the tree into a freshly allocated buffer.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AmlTree::serialize_into`], buffer size aside.
    pub fn serialize(&self) -> Result<Vec<u8>, AmlError> {
        let mut out = vec![0u8; self.serialized_size()?];
        self.serialize_into(&mut out)?;
        Ok(out)
    }

    /// Emits one subtree in bytestream order: opcode and PkgLength bytes,
    /// then fixed arguments by slot index, then the variable list.
    fn write_node(&self, id: NodeId, writer: &mut BinaryWriter<'_>) -> Result<(), AmlError> {
        let kind = self.kind(id)?;
        match kind {
            NodeKind::Root { .. } => return Err(AmlError::InvalidParameter),
            NodeKind::Data { bytes, .. } => {
                writer.write_bytes(bytes)?;
                return Ok(());
            }
            NodeKind::Object { encoding, pkg_len } => {
                if encoding.opcode == EXT_OP_PREFIX {
                    writer.write_u8(EXT_OP_PREFIX)?;
                    writer.write_u8(encoding.sub_opcode)?;
                } else {
                    writer.write_u8(encoding.opcode)?;
                }
                if encoding.attribute.contains(OpAttribute::HAS_PKG_LENGTH) {
                    let mut pkg = [0u8; 4];
                    let width = grammar::encode_pkg_length(*pkg_len, &mut pkg)
                        .ok_or(AmlError::InvalidPkgLength)?;
                    writer.write_bytes(&pkg[..width])?;
                }
            }
        }
        for child in self.fixed_slots(id)?.iter().flatten() {
            self.write_node(*child, writer)?;
        }
        for &child in self.children(id)? {
            self.write_node(child, writer)?;
        }
        Ok(())
    }
}
