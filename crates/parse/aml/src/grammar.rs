//! AML byte encoding grammar table and PkgLength codec.
//!
//! Every AML statement starts with an opcode byte (optionally prefixed by
//! the extended-op escape `0x5B`), whose grammar entry describes the fixed
//! arguments that follow and whether the statement carries a PkgLength,
//! a variable child list, or a trailing byte list. The table below covers
//! the full statement grammar of ACPI 6.3 s20.2; it is consulted by the
//! parser, the serializer and the size-propagation engine.

use bitflags::bitflags;

/// Escape byte introducing a two-byte extended opcode.
pub const EXT_OP_PREFIX: u8 = 0x5B;

/// Named opcodes referenced outside the grammar table.
pub mod opcode {
    /// `ZeroOp`, the integer constant 0.
    pub const ZERO_OP: u8 = 0x00;
    /// `OneOp`, the integer constant 1.
    pub const ONE_OP: u8 = 0x01;
    /// `NameOp`, `Name(name, object)`.
    pub const NAME_OP: u8 = 0x08;
    /// `BytePrefix`, a `u8` constant.
    pub const BYTE_PREFIX: u8 = 0x0A;
    /// `WordPrefix`, a `u16` constant.
    pub const WORD_PREFIX: u8 = 0x0B;
    /// `DWordPrefix`, a `u32` constant.
    pub const DWORD_PREFIX: u8 = 0x0C;
    /// `StringPrefix`, a null-terminated ASCII string.
    pub const STRING_PREFIX: u8 = 0x0D;
    /// `QWordPrefix`, a `u64` constant.
    pub const QWORD_PREFIX: u8 = 0x0E;
    /// `ScopeOp`.
    pub const SCOPE_OP: u8 = 0x10;
    /// `BufferOp`.
    pub const BUFFER_OP: u8 = 0x11;
    /// `PackageOp` (u8 element count).
    pub const PACKAGE_OP: u8 = 0x12;
    /// `VarPackageOp` (integer element count).
    pub const VAR_PACKAGE_OP: u8 = 0x13;
    /// `MethodOp`.
    pub const METHOD_OP: u8 = 0x14;
    /// `OnesOp`, the all-ones integer constant.
    pub const ONES_OP: u8 = 0xFF;
}

/// Type tag of one fixed argument slot in a grammar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Slot unused.
    None,
    /// One byte, evaluated as a `u8`.
    UInt8,
    /// Two bytes, evaluated as a `u16`.
    UInt16,
    /// Four bytes, evaluated as a `u32`.
    UInt32,
    /// Eight bytes, evaluated as a `u64`.
    UInt64,
    /// An AML NameString (e.g. `\_SB_.DEV0`).
    Name,
    /// A null-terminated ASCII string.
    String,
    /// A nested AML object, starting with an opcode. A bare NameString is
    /// also accepted where an object is expected (method invocation).
    Object,
}

bitflags! {
    /// Attribute flags of a grammar entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpAttribute: u32 {
        /// A PkgLength field sits between the opcode and the first fixed
        /// argument.
        const HAS_PKG_LENGTH = 0x1;
        /// The "opcode" is actually a character of a NameString.
        const IS_NAME_CHAR = 0x2;
        /// A variable list of child objects follows the fixed arguments.
        const HAS_CHILD_OBJ = 0x4;
        /// A byte list follows the fixed arguments (Buffer, Field family).
        const HAS_BYTE_LIST = 0x8;
        /// The first fixed argument names an entry in the ACPI namespace.
        const IN_NAMESPACE = 0x10000;
    }
}

/// Grammar entry describing the encoding of one AML statement.
#[derive(Debug)]
pub struct ByteEncoding {
    /// Opcode byte.
    pub opcode: u8,
    /// Sub-opcode; only meaningful when `opcode` is [`EXT_OP_PREFIX`],
    /// zero otherwise.
    pub sub_opcode: u8,
    /// Number of meaningful entries in `args` (at most 6).
    pub arg_count: u8,
    /// Fixed argument types, in encoding order.
    pub args: [ArgType; 6],
    /// Attribute flags.
    pub attribute: OpAttribute,
}

impl ByteEncoding {
    /// Returns the meaningful fixed-argument slice.
    #[must_use]
    pub fn fixed_args(&self) -> &[ArgType] {
        &self.args[..self.arg_count as usize]
    }

    /// Returns the number of opcode bytes (2 for extended opcodes).
    #[must_use]
    pub fn op_byte_count(&self) -> u32 {
        if self.opcode == EXT_OP_PREFIX { 2 } else { 1 }
    }

    /// Returns `true` if this entry is a NameString character, not a real
    /// opcode.
    #[must_use]
    pub fn is_name_char(&self) -> bool {
        self.attribute.contains(OpAttribute::IS_NAME_CHAR)
    }

    /// Looks up the grammar entry for an opcode/sub-opcode pair.
    #[must_use]
    pub fn lookup(opcode: u8, sub_opcode: u8) -> Option<&'static Self> {
        AML_BYTE_ENCODINGS
            .iter()
            .find(|e| e.opcode == opcode && e.sub_opcode == sub_opcode)
    }

    /// Looks up the grammar entry for the opcode starting at `bytes[0]`,
    /// reading the sub-opcode byte when the first byte is the extended
    /// prefix.
    #[must_use]
    pub fn from_op_bytes(bytes: &[u8]) -> Option<&'static Self> {
        let opcode = *bytes.first()?;
        let sub_opcode = if opcode == EXT_OP_PREFIX {
            *bytes.get(1)?
        } else {
            0
        };
        Self::lookup(opcode, sub_opcode)
    }

    /// Returns `true` if the opcode/sub-opcode pair exists in the grammar.
    #[must_use]
    pub fn is_valid(opcode: u8, sub_opcode: u8) -> bool {
        Self::lookup(opcode, sub_opcode).is_some()
    }
}

const fn enc(opcode: u8, sub_opcode: u8, args: &[ArgType], attribute: u32) -> ByteEncoding {
    let mut fixed = [ArgType::None; 6];
    let mut i = 0;
    while i < args.len() {
        fixed[i] = args[i];
        i += 1;
    }
    ByteEncoding {
        opcode,
        sub_opcode,
        arg_count: args.len() as u8,
        args: fixed,
        attribute: OpAttribute::from_bits_retain(attribute),
    }
}

const PKG: u32 = OpAttribute::HAS_PKG_LENGTH.bits();
const CHR: u32 = OpAttribute::IS_NAME_CHAR.bits();
const KID: u32 = OpAttribute::HAS_CHILD_OBJ.bits();
const BYT: u32 = OpAttribute::HAS_BYTE_LIST.bits();
const NSP: u32 = OpAttribute::IN_NAMESPACE.bits();

use ArgType::String as Str;
use ArgType::{Name, Object, UInt8, UInt16, UInt32, UInt64};

/// The AML statement grammar, indexed by linear search on
/// (opcode, sub-opcode). Entries follow ACPI 6.3 s20.2.
#[rustfmt::skip]
pub static AML_BYTE_ENCODINGS: &[ByteEncoding] = &[
    /* ZeroOp - 0x00 */             enc(0x00, 0x00, &[], 0),
    /* OneOp - 0x01 */              enc(0x01, 0x00, &[], 0),
    /* AliasOp - 0x06 */            enc(0x06, 0x00, &[Name, Name], NSP),
    /* NameOp - 0x08 */             enc(0x08, 0x00, &[Name, Object], NSP),
    /* BytePrefix - 0x0A */         enc(0x0A, 0x00, &[UInt8], 0),
    /* WordPrefix - 0x0B */         enc(0x0B, 0x00, &[UInt16], 0),
    /* DWordPrefix - 0x0C */        enc(0x0C, 0x00, &[UInt32], 0),
    /* StringPrefix - 0x0D */       enc(0x0D, 0x00, &[Str], 0),
    /* QWordPrefix - 0x0E */        enc(0x0E, 0x00, &[UInt64], 0),
    /* ScopeOp - 0x10 */            enc(0x10, 0x00, &[Name], PKG | KID | NSP),
    /* BufferOp - 0x11 */           enc(0x11, 0x00, &[Object], PKG | BYT),
    /* PackageOp - 0x12 */          enc(0x12, 0x00, &[UInt8], PKG | KID),
    /* VarPackageOp - 0x13 */       enc(0x13, 0x00, &[Object], PKG | KID),
    /* MethodOp - 0x14 */           enc(0x14, 0x00, &[Name, UInt8], PKG | KID | NSP),
    /* ExternalOp - 0x15 */         enc(0x15, 0x00, &[Name, UInt8, UInt8], NSP),
    /* DualNamePrefix - 0x2E */     enc(0x2E, 0x00, &[], CHR),
    /* MultiNamePrefix - 0x2F */    enc(0x2F, 0x00, &[], CHR),
    /* NameChar - 0x41..0x5A */     enc(b'A', 0x00, &[], CHR),
    enc(b'B', 0x00, &[], CHR),
    enc(b'C', 0x00, &[], CHR),
    enc(b'D', 0x00, &[], CHR),
    enc(b'E', 0x00, &[], CHR),
    enc(b'F', 0x00, &[], CHR),
    enc(b'G', 0x00, &[], CHR),
    enc(b'H', 0x00, &[], CHR),
    enc(b'I', 0x00, &[], CHR),
    enc(b'J', 0x00, &[], CHR),
    enc(b'K', 0x00, &[], CHR),
    enc(b'L', 0x00, &[], CHR),
    enc(b'M', 0x00, &[], CHR),
    enc(b'N', 0x00, &[], CHR),
    enc(b'O', 0x00, &[], CHR),
    enc(b'P', 0x00, &[], CHR),
    enc(b'Q', 0x00, &[], CHR),
    enc(b'R', 0x00, &[], CHR),
    enc(b'S', 0x00, &[], CHR),
    enc(b'T', 0x00, &[], CHR),
    enc(b'U', 0x00, &[], CHR),
    enc(b'V', 0x00, &[], CHR),
    enc(b'W', 0x00, &[], CHR),
    enc(b'X', 0x00, &[], CHR),
    enc(b'Y', 0x00, &[], CHR),
    enc(b'Z', 0x00, &[], CHR),
    /* MutexOp - 0x5B 0x01 */       enc(0x5B, 0x01, &[Name, UInt8], NSP),
    /* EventOp - 0x5B 0x02 */       enc(0x5B, 0x02, &[Name], NSP),
    /* CondRefOfOp - 0x5B 0x12 */   enc(0x5B, 0x12, &[Object, Object], 0),
    /* CreateFieldOp - 0x5B 0x13 */ enc(0x5B, 0x13, &[Object, Object, Object, Name], 0),
    /* LoadTableOp - 0x5B 0x1F */   enc(0x5B, 0x1F, &[Object, Object, Object, Object, Object, Object], 0),
    /* LoadOp - 0x5B 0x20 */        enc(0x5B, 0x20, &[Name, Object], 0),
    /* StallOp - 0x5B 0x21 */       enc(0x5B, 0x21, &[Object], 0),
    /* SleepOp - 0x5B 0x22 */       enc(0x5B, 0x22, &[Object], 0),
    /* AcquireOp - 0x5B 0x23 */     enc(0x5B, 0x23, &[Object, UInt16], 0),
    /* SignalOp - 0x5B 0x24 */      enc(0x5B, 0x24, &[Object], 0),
    /* WaitOp - 0x5B 0x25 */        enc(0x5B, 0x25, &[Object, Object], 0),
    /* ResetOp - 0x5B 0x26 */       enc(0x5B, 0x26, &[Object], 0),
    /* ReleaseOp - 0x5B 0x27 */     enc(0x5B, 0x27, &[Object], 0),
    /* FromBCDOp - 0x5B 0x28 */     enc(0x5B, 0x28, &[Object, Object], 0),
    /* ToBCDOp - 0x5B 0x29 */       enc(0x5B, 0x29, &[Object, Object], 0),
    /* UnloadOp - 0x5B 0x2A */      enc(0x5B, 0x2A, &[Object], 0),
    /* RevisionOp - 0x5B 0x30 */    enc(0x5B, 0x30, &[], 0),
    /* DebugOp - 0x5B 0x31 */       enc(0x5B, 0x31, &[], 0),
    /* FatalOp - 0x5B 0x32 */       enc(0x5B, 0x32, &[UInt8, UInt32, Object], 0),
    /* TimerOp - 0x5B 0x33 */       enc(0x5B, 0x33, &[], 0),
    /* OpRegionOp - 0x5B 0x80 */    enc(0x5B, 0x80, &[Name, UInt8, Object, Object], NSP),
    /* FieldOp - 0x5B 0x81 */       enc(0x5B, 0x81, &[Name, UInt8], PKG | BYT),
    /* DeviceOp - 0x5B 0x82 */      enc(0x5B, 0x82, &[Name], PKG | KID | NSP),
    /* ProcessorOp - 0x5B 0x83 */   enc(0x5B, 0x83, &[Name, UInt8, UInt32, UInt8], PKG | KID | NSP),
    /* PowerResOp - 0x5B 0x84 */    enc(0x5B, 0x84, &[Name, UInt8, UInt16], PKG | KID | NSP),
    /* ThermalZoneOp - 0x5B 0x85 */ enc(0x5B, 0x85, &[Name], PKG | KID | NSP),
    /* IndexFieldOp - 0x5B 0x86 */  enc(0x5B, 0x86, &[Name, Name, UInt8], PKG | BYT),
    /* BankFieldOp - 0x5B 0x87 */   enc(0x5B, 0x87, &[Name, Name, Object, UInt8], PKG | BYT),
    /* DataRegionOp - 0x5B 0x88 */  enc(0x5B, 0x88, &[Name, Object, Object, Object], NSP),
    /* RootChar - 0x5C */           enc(0x5C, 0x00, &[], CHR),
    /* ParentPrefixChar - 0x5E */   enc(0x5E, 0x00, &[], CHR),
    /* NameChar - 0x5F */           enc(b'_', 0x00, &[], CHR),
    /* Local0Op..Local7Op */        enc(0x60, 0x00, &[], 0),
    enc(0x61, 0x00, &[], 0),
    enc(0x62, 0x00, &[], 0),
    enc(0x63, 0x00, &[], 0),
    enc(0x64, 0x00, &[], 0),
    enc(0x65, 0x00, &[], 0),
    enc(0x66, 0x00, &[], 0),
    enc(0x67, 0x00, &[], 0),
    /* Arg0Op..Arg6Op */            enc(0x68, 0x00, &[], 0),
    enc(0x69, 0x00, &[], 0),
    enc(0x6A, 0x00, &[], 0),
    enc(0x6B, 0x00, &[], 0),
    enc(0x6C, 0x00, &[], 0),
    enc(0x6D, 0x00, &[], 0),
    enc(0x6E, 0x00, &[], 0),
    /* StoreOp - 0x70 */            enc(0x70, 0x00, &[Object, Object], 0),
    /* RefOfOp - 0x71 */            enc(0x71, 0x00, &[Object], 0),
    /* AddOp - 0x72 */              enc(0x72, 0x00, &[Object, Object, Object], 0),
    /* ConcatOp - 0x73 */           enc(0x73, 0x00, &[Object, Object, Object], 0),
    /* SubtractOp - 0x74 */         enc(0x74, 0x00, &[Object, Object, Object], 0),
    /* IncrementOp - 0x75 */        enc(0x75, 0x00, &[Object], 0),
    /* DecrementOp - 0x76 */        enc(0x76, 0x00, &[Object], 0),
    /* MultiplyOp - 0x77 */         enc(0x77, 0x00, &[Object, Object, Object], 0),
    /* DivideOp - 0x78 */           enc(0x78, 0x00, &[Object, Object, Object, Object], 0),
    /* ShiftLeftOp - 0x79 */        enc(0x79, 0x00, &[Object, Object, Object], 0),
    /* ShiftRightOp - 0x7A */       enc(0x7A, 0x00, &[Object, Object, Object], 0),
    /* AndOp - 0x7B */              enc(0x7B, 0x00, &[Object, Object, Object], 0),
    /* NAndOp - 0x7C */             enc(0x7C, 0x00, &[Object, Object, Object], 0),
    /* OrOp - 0x7D */               enc(0x7D, 0x00, &[Object, Object, Object], 0),
    /* NorOp - 0x7E */              enc(0x7E, 0x00, &[Object, Object, Object], 0),
    /* XOrOp - 0x7F */              enc(0x7F, 0x00, &[Object, Object, Object], 0),
    /* NotOp - 0x80 */              enc(0x80, 0x00, &[Object, Object], 0),
    /* FindSetLeftBitOp - 0x81 */   enc(0x81, 0x00, &[Object, Object], 0),
    /* FindSetRightBitOp - 0x82 */  enc(0x82, 0x00, &[Object, Object], 0),
    /* DerefOfOp - 0x83 */          enc(0x83, 0x00, &[Object], 0),
    /* ConcatResOp - 0x84 */        enc(0x84, 0x00, &[Object, Object, Object], 0),
    /* ModOp - 0x85 */              enc(0x85, 0x00, &[Object, Object, Object], 0),
    /* NotifyOp - 0x86 */           enc(0x86, 0x00, &[Object, Object], 0),
    /* SizeOfOp - 0x87 */           enc(0x87, 0x00, &[Object], 0),
    /* IndexOp - 0x88 */            enc(0x88, 0x00, &[Object, Object, Object], 0),
    /* MatchOp - 0x89 */            enc(0x89, 0x00, &[Object, UInt8, Object, UInt8, Object, Object], 0),
    /* CreateDWordFieldOp - 0x8A */ enc(0x8A, 0x00, &[Object, Object, Name], 0),
    /* CreateWordFieldOp - 0x8B */  enc(0x8B, 0x00, &[Object, Object, Name], 0),
    /* CreateByteFieldOp - 0x8C */  enc(0x8C, 0x00, &[Object, Object, Name], 0),
    /* CreateBitFieldOp - 0x8D */   enc(0x8D, 0x00, &[Object, Object, Name], 0),
    /* ObjectTypeOp - 0x8E */       enc(0x8E, 0x00, &[Object], 0),
    /* CreateQWordFieldOp - 0x8F */ enc(0x8F, 0x00, &[Object, Object, Name], 0),
    /* LAndOp - 0x90 */             enc(0x90, 0x00, &[Object, Object], 0),
    /* LOrOp - 0x91 */              enc(0x91, 0x00, &[Object, Object], 0),
    /* LNotOp - 0x92 */             enc(0x92, 0x00, &[Object], 0),
    /* LEqualOp - 0x93 */           enc(0x93, 0x00, &[Object, Object], 0),
    /* LGreaterOp - 0x94 */         enc(0x94, 0x00, &[Object, Object], 0),
    /* LLessOp - 0x95 */            enc(0x95, 0x00, &[Object, Object], 0),
    /* ToBufferOp - 0x96 */         enc(0x96, 0x00, &[Object, Object], 0),
    /* ToDecimalStringOp - 0x97 */  enc(0x97, 0x00, &[Object, Object], 0),
    /* ToHexStringOp - 0x98 */      enc(0x98, 0x00, &[Object, Object], 0),
    /* ToIntegerOp - 0x99 */        enc(0x99, 0x00, &[Object, Object], 0),
    /* ToStringOp - 0x9C */         enc(0x9C, 0x00, &[Object, Object, Object], 0),
    /* CopyObjectOp - 0x9D */       enc(0x9D, 0x00, &[Object, Object], 0),
    /* MidOp - 0x9E */              enc(0x9E, 0x00, &[Object, Object, Object], 0),
    /* ContinueOp - 0x9F */         enc(0x9F, 0x00, &[], 0),
    /* IfOp - 0xA0 */               enc(0xA0, 0x00, &[Object], PKG | KID),
    /* ElseOp - 0xA1 */             enc(0xA1, 0x00, &[], PKG | KID),
    /* WhileOp - 0xA2 */            enc(0xA2, 0x00, &[Object], PKG | KID),
    /* NoopOp - 0xA3 */             enc(0xA3, 0x00, &[], 0),
    /* ReturnOp - 0xA4 */           enc(0xA4, 0x00, &[Object], 0),
    /* BreakOp - 0xA5 */            enc(0xA5, 0x00, &[], 0),
    /* BreakPointOp - 0xCC */       enc(0xCC, 0x00, &[], 0),
    /* OnesOp - 0xFF */             enc(0xFF, 0x00, &[], 0),
];

// ─── PkgLength codec ────────────────────────────────────────────────────────

/// Largest value representable by the PkgLength encoding (2^28 − 1).
pub const MAX_PKG_LENGTH: u32 = (1 << 28) - 1;

/// Decodes an AML PkgLength field.
///
/// The top two bits of the lead byte give the number of follow bytes
/// (0-3). A lone lead byte holds a 6-bit value; in the multi-byte forms
/// the lead byte contributes its low nibble and each follow byte adds
/// eight more significant bits.
///
/// Returns `(value, bytes_consumed)`, or `None` if `data` is too short.
#[must_use]
pub fn decode_pkg_length(data: &[u8]) -> Option<(u32, usize)> {
    let lead = *data.first()?;
    let byte_count = usize::from((lead >> 6) & 0x03);

    if byte_count == 0 {
        return Some((u32::from(lead & 0x3F), 1));
    }

    let mut value: u32 = 0;
    for i in 0..byte_count {
        value |= u32::from(*data.get(1 + i)?) << (8 * i);
    }
    value = (value << 4) | u32::from(lead & 0x0F);
    Some((value, byte_count + 1))
}

/// Encodes `value` in the AML PkgLength form at the start of `buf`,
/// using the minimum number of bytes.
///
/// Returns the number of bytes written, or `None` if `value` exceeds
/// [`MAX_PKG_LENGTH`] or `buf` is too short.
#[must_use]
pub fn encode_pkg_length(value: u32, buf: &mut [u8]) -> Option<usize> {
    let width = pkg_length_width(value)?;
    if buf.len() < width {
        return None;
    }

    if width == 1 {
        buf[0] = value as u8;
        return Some(1);
    }

    // Multi-byte form: 2 bits of follow count + low nibble in the lead
    // byte, then 8 bits per follow byte.
    let follow = (width - 1) as u8;
    buf[0] = (follow << 6) | (value as u8 & 0x0F);
    let mut rest = value >> 4;
    for slot in buf.iter_mut().take(width).skip(1) {
        *slot = rest as u8;
        rest >>= 8;
    }
    Some(width)
}

/// Returns the number of bytes (1-4) needed to encode `value` as a
/// PkgLength, or `None` if it exceeds [`MAX_PKG_LENGTH`].
#[must_use]
pub fn pkg_length_width(value: u32) -> Option<usize> {
    if value & 0xF000_0000 != 0 {
        None
    } else if value & 0x0FF0_0000 != 0 {
        Some(4)
    } else if value & 0x000F_F000 != 0 {
        Some(3)
    } else if value & 0x0000_0FC0 != 0 {
        Some(2)
    } else {
        Some(1)
    }
}
