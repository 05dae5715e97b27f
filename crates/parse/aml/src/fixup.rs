//! Resource template fix-up helpers.
//!
//! Boot firmware often ships an SSDT template whose `Name(_CRS,
//! ResourceTemplate { ... })` statements carry placeholder addresses and
//! interrupt numbers; the real values are only known at runtime. These
//! helpers navigate from such a `Name` statement to the resource data
//! elements inside its `Buffer` and patch or extend them, with all size
//! bookkeeping handled by the mutation engine.

use alloc::vec::Vec;

use crate::grammar::opcode;
use crate::node::{AmlTree, DataType, NodeId};
use crate::resource::{
    self, LARGE_EXTENDED_INTERRUPT, LARGE_QWORD_ADDRESS_SPACE, SMALL_END_TAG,
    extended_interrupt, qword_address_space,
};
use crate::AmlError;

impl AmlTree {
    /// Returns the `Buffer` object held by a `Name` statement's second
    /// argument.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `name_op` is not a
    /// `Name` statement or its value is not a `Buffer`.
    pub fn name_op_buffer(&self, name_op: NodeId) -> Result<NodeId, AmlError> {
        if self.encoding(name_op)?.opcode != opcode::NAME_OP {
            return Err(AmlError::InvalidParameter);
        }
        let buffer = self.fixed_arg(name_op, 1)?.ok_or(AmlError::InvalidParameter)?;
        if self.encoding(buffer)?.opcode != opcode::BUFFER_OP {
            return Err(AmlError::InvalidParameter);
        }
        Ok(buffer)
    }

    /// Returns the first resource data element of a
    /// `Name(..., ResourceTemplate { ... })` statement.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `name_op` does not hold
    /// a `Buffer` and [`AmlError::InvalidResourceData`] if the buffer's
    /// contents did not parse as a resource data list.
    pub fn name_op_first_resource(&self, name_op: NodeId) -> Result<NodeId, AmlError> {
        let buffer = self.name_op_buffer(name_op)?;
        let first = *self
            .children(buffer)?
            .first()
            .ok_or(AmlError::InvalidResourceData)?;
        let (tag, _) = self.data(first)?;
        if tag != DataType::ResourceData {
            return Err(AmlError::InvalidResourceData);
        }
        Ok(first)
    }

    /// Steps from one resource data element to the next, returning `None`
    /// at the End Tag (which is never a useful patch target).
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidParameter`] if `rd` is not a resource
    /// data element inside a buffer.
    pub fn next_resource(&self, rd: NodeId) -> Result<Option<NodeId>, AmlError> {
        let (tag, _) = self.data(rd)?;
        if tag != DataType::ResourceData {
            return Err(AmlError::InvalidParameter);
        }
        let parent = self.parent(rd)?.ok_or(AmlError::InvalidParameter)?;
        let siblings = self.children(parent)?;
        let index = siblings
            .iter()
            .position(|&id| id == rd)
            .ok_or(AmlError::InvalidParameter)?;
        let Some(&next) = siblings.get(index + 1) else {
            return Ok(None);
        };
        let (_, bytes) = self.data(next)?;
        if resource::descriptor_id(bytes[0]) == SMALL_END_TAG {
            return Ok(None);
        }
        Ok(Some(next))
    }

    /// Overwrites the address range of a QWord Address Space descriptor:
    /// range minimum, range maximum, translation offset and length.
    /// Granularity and the flag fields are left as the template encoded
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidResourceData`] if `rd` is not a QWord
    /// Address Space descriptor.
    pub fn set_qword_address_range(
        &mut self,
        rd: NodeId,
        min: u64,
        max: u64,
        translation: u64,
        length: u64,
    ) -> Result<(), AmlError> {
        let bytes = self.resource_bytes(rd, LARGE_QWORD_ADDRESS_SPACE)?;
        if bytes.len() < qword_address_space::SIZE {
            return Err(AmlError::InvalidResourceData);
        }
        let mut patched = bytes.to_vec();
        for (offset, value) in [
            (qword_address_space::MIN, min),
            (qword_address_space::MAX, max),
            (qword_address_space::TRANSLATION, translation),
            (qword_address_space::LENGTH, length),
        ] {
            patched[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        }
        self.update_data(rd, &patched)
    }

    /// Overwrites interrupt vector `index` of an Extended Interrupt
    /// descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidResourceData`] if `rd` is not an
    /// Extended Interrupt descriptor and [`AmlError::InvalidParameter`]
    /// if `index` is at or past the descriptor's vector count.
    pub fn set_interrupt_vector(
        &mut self,
        rd: NodeId,
        index: usize,
        vector: u32,
    ) -> Result<(), AmlError> {
        let bytes = self.resource_bytes(rd, LARGE_EXTENDED_INTERRUPT)?;
        let count = *bytes
            .get(extended_interrupt::COUNT)
            .ok_or(AmlError::InvalidResourceData)?;
        if index >= usize::from(count) {
            return Err(AmlError::InvalidParameter);
        }
        let offset = extended_interrupt::FIRST_VECTOR + 4 * index;
        if bytes.len() < offset + 4 {
            return Err(AmlError::InvalidResourceData);
        }
        let mut patched = bytes.to_vec();
        patched[offset..offset + 4].copy_from_slice(&vector.to_le_bytes());
        self.update_data(rd, &patched)
    }

    /// Appends an encoded resource descriptor as the last element before
    /// the End Tag of a `Name(..., ResourceTemplate { ... })` statement,
    /// growing the buffer length integer, every enclosing PkgLength and
    /// the table length. Returns the new element's node.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidResourceData`] if the buffer does not
    /// end in an End Tag or `descriptor` is not exactly one descriptor,
    /// or a propagation error if a size field would overflow. The tree
    /// is unchanged on error.
    pub fn append_resource(
        &mut self,
        name_op: NodeId,
        descriptor: &[u8],
    ) -> Result<NodeId, AmlError> {
        let buffer = self.name_op_buffer(name_op)?;
        let end_tag = *self
            .children(buffer)?
            .last()
            .ok_or(AmlError::InvalidResourceData)?;
        let (tag, bytes) = self.data(end_tag)?;
        if tag != DataType::ResourceData
            || resource::descriptor_id(bytes[0]) != SMALL_END_TAG
        {
            return Err(AmlError::InvalidResourceData);
        }

        let element = self.new_data(DataType::ResourceData, descriptor)?;
        match self.insert_child_before(end_tag, element) {
            Ok(()) => Ok(element),
            Err(err) => {
                // Roll the detached node back out of the arena.
                let _ = self.delete_subtree(element);
                Err(err)
            }
        }
    }

    fn resource_bytes(&self, rd: NodeId, id: u8) -> Result<&[u8], AmlError> {
        let (tag, bytes) = self.data(rd)?;
        if tag != DataType::ResourceData || resource::descriptor_id(bytes[0]) != id {
            return Err(AmlError::InvalidResourceData);
        }
        Ok(bytes)
    }
}

/// Builds the QWord memory address-space descriptor bytes used by tests
/// and template authors: all flag fields zero, granularity zero, and the
/// given range values.
#[must_use]
pub fn build_qword_memory(min: u64, max: u64, translation: u64, length: u64) -> Vec<u8> {
    let mut out = alloc::vec![0u8; qword_address_space::SIZE];
    out[0] = LARGE_QWORD_ADDRESS_SPACE;
    let payload = (qword_address_space::SIZE - 3) as u16;
    out[1..3].copy_from_slice(&payload.to_le_bytes());
    out[qword_address_space::RESOURCE_TYPE] = 0; // memory range
    for (offset, value) in [
        (qword_address_space::MIN, min),
        (qword_address_space::MAX, max),
        (qword_address_space::TRANSLATION, translation),
        (qword_address_space::LENGTH, length),
    ] {
        out[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
    out
}
