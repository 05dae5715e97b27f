//! Resource data descriptor codec.
//!
//! Resource data is the compact binary sub-format embedded inside `Buffer`
//! objects by `ResourceTemplate()` (ACPI 6.3 s6.4). A descriptor is either
//! small (bit 7 of the first byte clear, payload length in the low three
//! bits) or large (bit 7 set, one id byte then an explicit little-endian
//! `u16` payload length). A well-formed list ends with exactly one End Tag
//! descriptor as its last element.

use alloc::vec::Vec;

use crate::AmlError;

/// Small descriptor id: Start Dependent Functions.
pub const SMALL_START_DEPENDENT_FN: u8 = 0x30;
/// Small descriptor id: End Dependent Functions.
pub const SMALL_END_DEPENDENT_FN: u8 = 0x38;
/// Small descriptor id: End Tag.
pub const SMALL_END_TAG: u8 = 0x78;
/// Large descriptor id: Extended Interrupt.
pub const LARGE_EXTENDED_INTERRUPT: u8 = 0x89;
/// Large descriptor id: QWord Address Space.
pub const LARGE_QWORD_ADDRESS_SPACE: u8 = 0x8A;

/// The two-byte End Tag descriptor. The second byte is a checksum field;
/// zero means "treat the checksum as valid" and is what compilers emit.
pub const END_TAG_BYTES: [u8; 2] = [0x79, 0x00];

/// Byte offsets within a QWord Address Space descriptor, counted from its
/// first (header) byte. Total encoded size is 46 bytes when no
/// ResourceSource string follows.
pub mod qword_address_space {
    /// Resource type (memory/IO/bus number).
    pub const RESOURCE_TYPE: usize = 3;
    /// General flags.
    pub const GENERAL_FLAGS: usize = 4;
    /// Type-specific flags.
    pub const TYPE_SPECIFIC_FLAGS: usize = 5;
    /// Address granularity (`u64`).
    pub const GRANULARITY: usize = 6;
    /// Address range minimum (`u64`).
    pub const MIN: usize = 14;
    /// Address range maximum (`u64`).
    pub const MAX: usize = 22;
    /// Translation offset (`u64`).
    pub const TRANSLATION: usize = 30;
    /// Address length (`u64`).
    pub const LENGTH: usize = 38;
    /// Minimum encoded descriptor size.
    pub const SIZE: usize = 46;
}

/// Byte offsets within an Extended Interrupt descriptor, counted from its
/// first (header) byte.
pub mod extended_interrupt {
    /// Interrupt vector flags.
    pub const FLAGS: usize = 3;
    /// Interrupt table length (vector count).
    pub const COUNT: usize = 4;
    /// First `u32` interrupt vector.
    pub const FIRST_VECTOR: usize = 5;
}

/// Returns `true` if `header` starts a large descriptor.
#[must_use]
pub fn is_large(header: u8) -> bool {
    header & 0x80 != 0
}

/// Returns the descriptor id of the element whose first byte is `header`.
///
/// For small descriptors the three payload-length bits are masked out, so
/// the id can be compared directly against the `SMALL_*` constants; a
/// large descriptor's id is the header byte itself.
#[must_use]
pub fn descriptor_id(header: u8) -> u8 {
    if is_large(header) { header } else { header & 0xF8 }
}

/// Returns the total on-wire size (header + payload) of the descriptor at
/// the front of `data`.
///
/// # Errors
///
/// Returns [`AmlError::UnexpectedEnd`] if `data` is too short to hold the
/// descriptor header.
pub fn element_size(data: &[u8]) -> Result<usize, AmlError> {
    let header = *data.first().ok_or(AmlError::UnexpectedEnd)?;
    if is_large(header) {
        let len = data.get(1..3).ok_or(AmlError::UnexpectedEnd)?;
        Ok(3 + usize::from(u16::from_le_bytes([len[0], len[1]])))
    } else {
        Ok(usize::from(header & 0x07) + 1)
    }
}

/// Validates that `data` is exactly one well-formed resource data list.
///
/// # Errors
///
/// Returns [`AmlError::InvalidResourceData`] if the list starts with an
/// End Tag, an element overruns the buffer, a Start Dependent Functions
/// descriptor is opened twice or closed without being open, one is still
/// open at the End Tag, or the End Tag does not consume the buffer
/// exactly.
pub fn validate_list(data: &[u8]) -> Result<(), AmlError> {
    if data.is_empty() || descriptor_id(data[0]) == SMALL_END_TAG {
        return Err(AmlError::InvalidResourceData);
    }

    let mut pos = 0usize;
    let mut in_dependent_fn = false;
    while pos < data.len() {
        let size = element_size(&data[pos..]).map_err(|_| AmlError::InvalidResourceData)?;
        let end = pos.checked_add(size).ok_or(AmlError::InvalidResourceData)?;
        if end > data.len() {
            return Err(AmlError::InvalidResourceData);
        }

        match descriptor_id(data[pos]) {
            SMALL_START_DEPENDENT_FN => {
                if in_dependent_fn {
                    return Err(AmlError::InvalidResourceData);
                }
                in_dependent_fn = true;
            }
            SMALL_END_DEPENDENT_FN => {
                if !in_dependent_fn {
                    return Err(AmlError::InvalidResourceData);
                }
                in_dependent_fn = false;
            }
            SMALL_END_TAG => {
                // Must be the last element and close the list exactly.
                if in_dependent_fn || end != data.len() {
                    return Err(AmlError::InvalidResourceData);
                }
                return Ok(());
            }
            _ => {}
        }
        pos = end;
    }

    // Ran off the end without seeing an End Tag.
    Err(AmlError::InvalidResourceData)
}

/// Iterates over the elements of a resource data list previously accepted
/// by [`validate_list`], yielding one byte slice per descriptor (End Tag
/// included).
pub fn elements(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut pos = 0usize;
    core::iter::from_fn(move || {
        if pos >= data.len() {
            return None;
        }
        let size = element_size(&data[pos..]).ok()?;
        let element = data.get(pos..pos + size)?;
        pos += size;
        Some(element)
    })
}

/// Builds an Extended Interrupt descriptor carrying `vectors`.
///
/// # Errors
///
/// Returns [`AmlError::InvalidParameter`] if `vectors` is empty or holds
/// more than 255 entries.
pub fn build_extended_interrupt(flags: u8, vectors: &[u32]) -> Result<Vec<u8>, AmlError> {
    if vectors.is_empty() || vectors.len() > 255 {
        return Err(AmlError::InvalidParameter);
    }

    let payload = 2 + 4 * vectors.len();
    let mut out = Vec::with_capacity(3 + payload);
    out.push(LARGE_EXTENDED_INTERRUPT);
    out.extend_from_slice(&(payload as u16).to_le_bytes());
    out.push(flags);
    out.push(vectors.len() as u8);
    for vector in vectors {
        out.extend_from_slice(&vector.to_le_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    extern crate std;
    use alloc::vec::Vec;

    use super::*;

    // IO port descriptor: small id 0x8, 7 payload bytes.
    const IO_PORT: [u8; 8] = [0x47, 0x01, 0xF8, 0x00, 0xF8, 0x00, 0x01, 0x08];

    fn interrupt(vector: u32) -> Vec<u8> {
        build_extended_interrupt(0x01, &[vector]).unwrap()
    }

    #[test]
    fn classification_and_sizes() {
        assert!(!is_large(IO_PORT[0]));
        assert_eq!(descriptor_id(IO_PORT[0]), 0x40);
        assert_eq!(element_size(&IO_PORT), Ok(8));

        let irq = interrupt(42);
        assert!(is_large(irq[0]));
        assert_eq!(descriptor_id(irq[0]), LARGE_EXTENDED_INTERRUPT);
        assert_eq!(element_size(&irq), Ok(9));

        assert_eq!(descriptor_id(END_TAG_BYTES[0]), SMALL_END_TAG);
        assert_eq!(element_size(&END_TAG_BYTES), Ok(2));
    }

    #[test]
    fn element_size_needs_full_header() {
        assert_eq!(element_size(&[]), Err(AmlError::UnexpectedEnd));
        // Large descriptor with a truncated length field.
        assert_eq!(
            element_size(&[LARGE_EXTENDED_INTERRUPT, 0x06]),
            Err(AmlError::UnexpectedEnd)
        );
    }

    #[test]
    fn accepts_well_formed_list() {
        let mut list = Vec::new();
        list.extend_from_slice(&IO_PORT);
        list.extend_from_slice(&interrupt(42));
        list.extend_from_slice(&END_TAG_BYTES);
        assert_eq!(validate_list(&list), Ok(()));

        let sizes: Vec<usize> = elements(&list).map(<[u8]>::len).collect();
        assert_eq!(sizes, [8, 9, 2]);
    }

    #[test]
    fn accepts_dependent_function_bracketing() {
        let mut list = Vec::new();
        list.push(0x31); // StartDependentFn, 1 priority byte
        list.push(0x05);
        list.extend_from_slice(&IO_PORT);
        list.push(0x38); // EndDependentFn
        list.extend_from_slice(&END_TAG_BYTES);
        assert_eq!(validate_list(&list), Ok(()));
    }

    #[test]
    fn rejects_malformed_lists() {
        // End Tag first.
        assert_eq!(
            validate_list(&END_TAG_BYTES),
            Err(AmlError::InvalidResourceData)
        );

        // Missing End Tag.
        assert_eq!(validate_list(&IO_PORT), Err(AmlError::InvalidResourceData));

        // Element overruns the buffer.
        let mut truncated = Vec::new();
        truncated.extend_from_slice(&IO_PORT);
        truncated.extend_from_slice(&END_TAG_BYTES);
        truncated.pop();
        assert_eq!(
            validate_list(&truncated),
            Err(AmlError::InvalidResourceData)
        );

        // Trailing bytes after the End Tag.
        let mut trailing = Vec::new();
        trailing.extend_from_slice(&IO_PORT);
        trailing.extend_from_slice(&END_TAG_BYTES);
        trailing.push(0x00);
        assert_eq!(validate_list(&trailing), Err(AmlError::InvalidResourceData));

        // EndDependentFn without a Start.
        let mut unmatched = Vec::new();
        unmatched.push(0x38);
        unmatched.extend_from_slice(&END_TAG_BYTES);
        assert_eq!(
            validate_list(&unmatched),
            Err(AmlError::InvalidResourceData)
        );

        // Re-entrant StartDependentFn.
        let mut reentrant = Vec::new();
        reentrant.push(0x30);
        reentrant.push(0x30);
        reentrant.push(0x38);
        reentrant.extend_from_slice(&END_TAG_BYTES);
        assert_eq!(
            validate_list(&reentrant),
            Err(AmlError::InvalidResourceData)
        );

        // Still inside a dependent function at the End Tag.
        let mut open = Vec::new();
        open.push(0x30);
        open.extend_from_slice(&END_TAG_BYTES);
        assert_eq!(validate_list(&open), Err(AmlError::InvalidResourceData));
    }

    #[test]
    fn extended_interrupt_layout() {
        let irq = build_extended_interrupt(0x05, &[33, 34]).unwrap();
        assert_eq!(irq.len(), 13);
        assert_eq!(irq[0], LARGE_EXTENDED_INTERRUPT);
        assert_eq!(u16::from_le_bytes([irq[1], irq[2]]), 10);
        assert_eq!(irq[extended_interrupt::FLAGS], 0x05);
        assert_eq!(irq[extended_interrupt::COUNT], 2);
        assert_eq!(
            &irq[extended_interrupt::FIRST_VECTOR..extended_interrupt::FIRST_VECTOR + 4],
            &33u32.to_le_bytes()
        );

        assert_eq!(
            build_extended_interrupt(0, &[]),
            Err(AmlError::InvalidParameter)
        );
    }
}
