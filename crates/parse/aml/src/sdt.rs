//! ACPI system description table header.

use tessera_binparse::{BinaryReader, BinaryWriter, WriteOverflow};

/// The common 36-byte header shared by all system description tables
/// (ACPI 6.3 s5.2.6).
///
/// `length` counts the whole table including this header; `checksum` is
/// chosen so that all `length` bytes of the table sum to zero modulo 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdtHeader {
    /// Table signature, e.g. `b"DSDT"` or `b"SSDT"`.
    pub signature: [u8; 4],
    /// Total table size in bytes, header included.
    pub length: u32,
    /// Table format revision.
    pub revision: u8,
    /// Whole-table checksum byte.
    pub checksum: u8,
    /// OEM identifier.
    pub oem_id: [u8; 6],
    /// OEM table identifier.
    pub oem_table_id: [u8; 8],
    /// OEM revision number.
    pub oem_revision: u32,
    /// Vendor id of the utility that created the table.
    pub creator_id: u32,
    /// Revision of the utility that created the table.
    pub creator_revision: u32,
}

impl SdtHeader {
    /// Encoded header size in bytes.
    pub const SIZE: usize = 36;

    /// Byte offset of the `checksum` field within the header.
    pub const CHECKSUM_OFFSET: usize = 9;

    /// Decodes a header from the front of `data`.
    ///
    /// Returns `None` if fewer than [`Self::SIZE`] bytes are available.
    /// The `length` field is not validated against `data.len()`; callers
    /// decide how much trailing data belongs to the table.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut reader = BinaryReader::new(data);
        Some(Self {
            signature: reader.read()?,
            length: reader.read()?,
            revision: reader.read()?,
            checksum: reader.read()?,
            oem_id: reader.read()?,
            oem_table_id: reader.read()?,
            oem_revision: reader.read()?,
            creator_id: reader.read()?,
            creator_revision: reader.read()?,
        })
    }

    /// Appends the 36 encoded header bytes to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteOverflow`] if the writer has less than [`Self::SIZE`]
    /// bytes of capacity left.
    pub fn write_into(&self, writer: &mut BinaryWriter<'_>) -> Result<(), WriteOverflow> {
        writer.write_bytes(&self.signature)?;
        writer.write_u32(self.length)?;
        writer.write_u8(self.revision)?;
        writer.write_u8(self.checksum)?;
        writer.write_bytes(&self.oem_id)?;
        writer.write_bytes(&self.oem_table_id)?;
        writer.write_u32(self.oem_revision)?;
        writer.write_u32(self.creator_id)?;
        writer.write_u32(self.creator_revision)
    }

    /// Returns the encoded header bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        let mut writer = BinaryWriter::new(&mut bytes);
        // Cannot overflow: the buffer is exactly SIZE bytes.
        let _ = self.write_into(&mut writer);
        bytes
    }
}

/// Returns the checksum byte that makes `table` (with its checksum byte
/// treated as zero) sum to zero modulo 256.
#[must_use]
pub fn compute_checksum(table: &[u8]) -> u8 {
    let sum = table
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != SdtHeader::CHECKSUM_OFFSET)
        .fold(0u8, |acc, (_, &b)| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// Returns `true` if all bytes of `table` sum to zero modulo 256.
#[must_use]
pub fn verify_checksum(table: &[u8]) -> bool {
    table.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn sample_header() -> SdtHeader {
        SdtHeader {
            signature: *b"SSDT",
            length: 0x25,
            revision: 2,
            checksum: 0,
            oem_id: *b"OEMID ",
            oem_table_id: *b"TESSERA ",
            oem_revision: 1,
            creator_id: u32::from_le_bytes(*b"TSRA"),
            creator_revision: 0x0001_0000,
        }
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(SdtHeader::parse(&bytes), Some(header));
    }

    #[test]
    fn parse_rejects_short_input() {
        let bytes = sample_header().to_bytes();
        assert_eq!(SdtHeader::parse(&bytes[..SdtHeader::SIZE - 1]), None);
    }

    #[test]
    fn field_offsets() {
        let bytes = sample_header().to_bytes();
        assert_eq!(&bytes[0..4], b"SSDT");
        assert_eq!(&bytes[4..8], &0x25u32.to_le_bytes());
        assert_eq!(bytes[8], 2);
        assert_eq!(bytes[SdtHeader::CHECKSUM_OFFSET], 0);
        assert_eq!(&bytes[10..16], b"OEMID ");
        assert_eq!(&bytes[16..24], b"TESSERA ");
    }

    #[test]
    fn checksum_balances_table() {
        let mut table = sample_header().to_bytes().to_vec();
        table.push(0x00); // ZeroOp body
        let checksum = compute_checksum(&table);
        table[SdtHeader::CHECKSUM_OFFSET] = checksum;
        assert!(verify_checksum(&table));

        table[SdtHeader::CHECKSUM_OFFSET] = checksum.wrapping_add(1);
        assert!(!verify_checksum(&table));
    }

    #[test]
    fn checksum_ignores_stale_checksum_byte() {
        let mut table = sample_header().to_bytes().to_vec();
        table.push(0x5A);
        let fresh = compute_checksum(&table);
        table[SdtHeader::CHECKSUM_OFFSET] = 0xEE; // stale value
        assert_eq!(compute_checksum(&table), fresh);
    }
}
