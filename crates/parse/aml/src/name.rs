//! AML NameString codec.
//!
//! A NameString encodes a namespace path: either a root prefix `\`
//! (absolute) or zero-or-more `^` parent prefixes (relative), followed by
//! a name path holding 0, 1, 2 or up to 255 four-byte NameSegs (ACPI 6.3
//! s20.2.2). The human-readable ASL form is the dotted spelling
//! (`\_SB_.CMN0._CRS`), with segments shorter than four characters padded
//! on the right with `_`.

use alloc::vec::Vec;

use crate::AmlError;

/// Root prefix character, `\`.
pub const ROOT_CHAR: u8 = b'\\';
/// Parent prefix character, `^`.
pub const PARENT_PREFIX_CHAR: u8 = b'^';
/// Prefix byte introducing two NameSegs.
pub const DUAL_NAME_PREFIX: u8 = 0x2E;
/// Prefix byte introducing a counted list of NameSegs.
pub const MULTI_NAME_PREFIX: u8 = 0x2F;
/// Encoding of the empty name path.
pub const NULL_NAME: u8 = 0x00;

/// Returns `true` for a valid leading character of a NameSeg
/// (`A`-`Z` or `_`).
#[must_use]
pub fn is_lead_name_char(c: u8) -> bool {
    c.is_ascii_uppercase() || c == b'_'
}

/// Returns `true` for a valid non-leading character of a NameSeg
/// (`A`-`Z`, `0`-`9` or `_`).
#[must_use]
pub fn is_name_char(c: u8) -> bool {
    is_lead_name_char(c) || c.is_ascii_digit()
}

/// Returns `true` if `seg` is a valid four-byte NameSeg.
#[must_use]
pub fn is_name_seg(seg: &[u8; 4]) -> bool {
    is_lead_name_char(seg[0]) && seg[1..].iter().all(|&c| is_name_char(c))
}

/// A decoded AML NameString.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmlName {
    /// `true` if the name starts with the root prefix `\`.
    pub absolute: bool,
    /// Number of `^` parent prefixes (0 when `absolute`).
    pub parent_levels: u8,
    /// The NameSegs of the name path, in order. Empty for a null name
    /// path (e.g. `Scope(\)`).
    pub segments: Vec<[u8; 4]>,
}

impl AmlName {
    /// Returns the exact AML-encoded size of this name in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let prefix = usize::from(self.absolute) + usize::from(self.parent_levels);
        prefix
            + match self.segments.len() {
                0 => 1, // NullName byte
                1 => 4,
                2 => 1 + 8, // DualNamePrefix
                n => 2 + 4 * n, // MultiNamePrefix + SegCount
            }
    }

    /// Encodes this name into AML NameString bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidName`] if a segment contains invalid
    /// characters or there are more than 255 segments.
    pub fn encode(&self) -> Result<Vec<u8>, AmlError> {
        if self.segments.len() > 255 || self.segments.iter().any(|s| !is_name_seg(s)) {
            return Err(AmlError::InvalidName);
        }

        let mut out = Vec::with_capacity(self.encoded_size());
        if self.absolute {
            out.push(ROOT_CHAR);
        } else {
            out.extend(core::iter::repeat_n(
                PARENT_PREFIX_CHAR,
                usize::from(self.parent_levels),
            ));
        }
        match self.segments.len() {
            0 => out.push(NULL_NAME),
            1 => out.extend_from_slice(&self.segments[0]),
            2 => {
                out.push(DUAL_NAME_PREFIX);
                out.extend_from_slice(&self.segments[0]);
                out.extend_from_slice(&self.segments[1]);
            }
            n => {
                out.push(MULTI_NAME_PREFIX);
                out.push(n as u8);
                for seg in &self.segments {
                    out.extend_from_slice(seg);
                }
            }
        }
        Ok(out)
    }

    /// Parses the ASL dotted spelling of a name (`\_SB_.CMN0`, `^FOO`,
    /// `DEV0.BAR`). Input is case-insensitive; segments shorter than four
    /// characters are padded on the right with `_`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidName`] on empty or overlong segments,
    /// invalid characters, a `\` anywhere but the front, a `^` after the
    /// first segment, or more than 255 segments.
    pub fn from_asl(path: &str) -> Result<Self, AmlError> {
        let mut rest = path.as_bytes();

        let absolute = rest.first() == Some(&ROOT_CHAR);
        if absolute {
            rest = &rest[1..];
        }

        let mut parent_levels: u8 = 0;
        while rest.first() == Some(&PARENT_PREFIX_CHAR) {
            if absolute {
                return Err(AmlError::InvalidName);
            }
            parent_levels = parent_levels.checked_add(1).ok_or(AmlError::InvalidName)?;
            rest = &rest[1..];
        }

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split(|&c| c == b'.') {
                if part.is_empty() || part.len() > 4 {
                    return Err(AmlError::InvalidName);
                }
                let mut seg = [b'_'; 4];
                for (slot, &c) in seg.iter_mut().zip(part) {
                    *slot = c.to_ascii_uppercase();
                }
                if !is_name_seg(&seg) {
                    return Err(AmlError::InvalidName);
                }
                segments.push(seg);
            }
        }
        if segments.len() > 255 {
            return Err(AmlError::InvalidName);
        }

        Ok(Self {
            absolute,
            parent_levels,
            segments,
        })
    }
}

/// Decodes an AML NameString from the front of `data`.
///
/// # Errors
///
/// Returns [`AmlError::UnexpectedEnd`] if `data` ends mid-name and
/// [`AmlError::InvalidName`] on structurally invalid encodings (bad
/// segment characters, a zero multi-name segment count, a `^` after a
/// `\`).
pub fn decode_aml_name(data: &[u8]) -> Result<AmlName, AmlError> {
    let mut pos = 0usize;

    let absolute = data.first() == Some(&ROOT_CHAR);
    if absolute {
        pos += 1;
    }

    let mut parent_levels: u8 = 0;
    while data.get(pos) == Some(&PARENT_PREFIX_CHAR) {
        if absolute {
            return Err(AmlError::InvalidName);
        }
        parent_levels = parent_levels.checked_add(1).ok_or(AmlError::InvalidName)?;
        pos += 1;
    }

    let seg_count = match *data.get(pos).ok_or(AmlError::UnexpectedEnd)? {
        NULL_NAME => {
            pos += 1;
            0
        }
        DUAL_NAME_PREFIX => {
            pos += 1;
            2
        }
        MULTI_NAME_PREFIX => {
            pos += 1;
            let count = *data.get(pos).ok_or(AmlError::UnexpectedEnd)?;
            pos += 1;
            if count == 0 {
                return Err(AmlError::InvalidName);
            }
            usize::from(count)
        }
        c if is_lead_name_char(c) => 1,
        _ => return Err(AmlError::InvalidName),
    };

    let mut segments = Vec::with_capacity(seg_count);
    for _ in 0..seg_count {
        let bytes = data.get(pos..pos + 4).ok_or(AmlError::UnexpectedEnd)?;
        let seg: [u8; 4] = bytes.try_into().map_err(|_| AmlError::UnexpectedEnd)?;
        if !is_name_seg(&seg) {
            return Err(AmlError::InvalidName);
        }
        segments.push(seg);
        pos += 4;
    }

    Ok(AmlName {
        absolute,
        parent_levels,
        segments,
    })
}

/// Computes the exact encoded size of the AML NameString at the front of
/// `data`, validating it in the process.
///
/// # Errors
///
/// Same conditions as [`decode_aml_name`].
pub fn aml_name_size(data: &[u8]) -> Result<usize, AmlError> {
    decode_aml_name(data).map(|name| name.encoded_size())
}
