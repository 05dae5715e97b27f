//! `tessera-aml` --- a `no_std` + `alloc` AML definition-block tree library.
//!
//! This crate parses the AML bytecode body of a DSDT/SSDT table into a
//! mutable in-memory tree, lets callers edit that tree (patch integer
//! values, resize buffers, insert or remove statements and resource data
//! elements), and serializes it back to a byte-exact table with a valid
//! checksum.
//!
//! It is not an AML interpreter: no method is ever evaluated and no
//! control flow is executed. The tree mirrors the static structure of the
//! bytecode, which is exactly what boot-time "template fix-up" code needs
//! to overwrite addresses and interrupt numbers discovered at runtime.
//!
//! # Usage
//!
//! ```ignore
//! let mut tree = AmlTree::parse(table_bytes)?;
//! let crs = tree.find_node("\\_SB_.CMN0._CRS")?;
//! let rd = tree.name_op_first_resource(crs)?;
//! tree.set_qword_address_range(rd, base, base + size - 1, 0, size)?;
//! let table = tree.serialize()?;
//! ```
//!
//! All derived size fields (package lengths, buffer length integers, the
//! header `Length`) are kept consistent on every mutation; a mutation that
//! would overflow a size field fails without modifying the tree.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod fixup;
pub mod grammar;
pub mod iter;
pub mod name;
pub mod namespace;
pub mod node;
pub mod parse;
pub mod resource;
pub mod sdt;
pub mod serialize;
pub mod tree;

pub use grammar::{ArgType, ByteEncoding, OpAttribute};
pub use iter::{IterMode, TreeIterator};
pub use node::{AmlTree, DataType, NodeId, NodeKind};
pub use sdt::SdtHeader;

/// Errors reported by AML tree operations.
///
/// Parsing, mutation and serialization are all fallible; malformed input
/// tables are expected operational data, so every inconsistency surfaces
/// as an error rather than a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlError {
    /// An argument violated a structural precondition (null/empty data,
    /// attached node where a detached one is required, mismatched data
    /// type, index out of range).
    InvalidParameter,
    /// The bytecode ended before a complete construct could be read.
    UnexpectedEnd,
    /// An opcode or sub-opcode has no entry in the grammar table.
    UnknownOpcode,
    /// A PkgLength field was inconsistent with its enclosing bounds or
    /// exceeded the 2^28 encoding ceiling.
    InvalidPkgLength,
    /// A NameString or ASL name was malformed.
    InvalidName,
    /// A resource data buffer failed list validation.
    InvalidResourceData,
    /// A requested node, name or descriptor was not found.
    NotFound,
    /// A size or count field would overflow its encoding (table length,
    /// package element count, integer width in a fixed-width slot).
    Overflow,
    /// The operation is structurally impossible for this node (e.g.
    /// changing the width of a fixed-width integer argument).
    Unsupported,
    /// The caller-provided output buffer is too small for the serialized
    /// table.
    BufferTooSmall,
}

impl From<tessera_binparse::WriteOverflow> for AmlError {
    fn from(_: tessera_binparse::WriteOverflow) -> Self {
        Self::BufferTooSmall
    }
}
