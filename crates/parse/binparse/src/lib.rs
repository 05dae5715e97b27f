//! `tessera-binparse` --- bounded byte-stream cursors for binary parsers.
//!
//! Provides two cursors over externally-owned buffers:
//!
//! - [`BinaryReader`]: a forward read cursor with little-endian typed reads,
//!   peeking and skipping. Out-of-bounds reads return `None` instead of
//!   panicking, so truncated input is always a recoverable condition.
//! - [`BinaryWriter`]: a fixed-capacity append cursor. Writes are
//!   all-or-nothing; a write that does not fit fails without touching the
//!   buffer. There is no reallocation --- the caller sizes the buffer up
//!   front.

#![no_std]
#![warn(missing_docs)]

mod reader;
mod writer;

pub use reader::{BinaryReader, FromBytes};
pub use writer::{BinaryWriter, WriteOverflow};
