//! Fixed-capacity append cursor.

/// Error returned when a write does not fit in the remaining capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOverflow;

/// An append-only write cursor over an externally-owned buffer.
///
/// The capacity is fixed at construction. Every write either succeeds in
/// full or fails with [`WriteOverflow`] leaving the buffer and the written
/// length untouched --- there are no partial writes.
pub struct BinaryWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> BinaryWriter<'a> {
    /// Creates a writer over `buf` with nothing written yet.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Returns the fixed total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the remaining free capacity in bytes.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Appends `bytes` to the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`WriteOverflow`] if `bytes` is longer than the remaining
    /// capacity. Nothing is written in that case.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteOverflow> {
        if bytes.len() > self.remaining_capacity() {
            return Err(WriteOverflow);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Appends a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`WriteOverflow`] if the buffer is full.
    pub fn write_u8(&mut self, value: u8) -> Result<(), WriteOverflow> {
        self.write_bytes(&[value])
    }

    /// Appends a `u16` in little-endian order.
    ///
    /// # Errors
    ///
    /// Returns [`WriteOverflow`] if two bytes do not fit.
    pub fn write_u16(&mut self, value: u16) -> Result<(), WriteOverflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Appends a `u32` in little-endian order.
    ///
    /// # Errors
    ///
    /// Returns [`WriteOverflow`] if four bytes do not fit.
    pub fn write_u32(&mut self, value: u32) -> Result<(), WriteOverflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Appends a `u64` in little-endian order.
    ///
    /// # Errors
    ///
    /// Returns [`WriteOverflow`] if eight bytes do not fit.
    pub fn write_u64(&mut self, value: u64) -> Result<(), WriteOverflow> {
        self.write_bytes(&value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_append_in_order() {
        let mut buf = [0u8; 8];
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_u8(0x10).unwrap();
        writer.write_u16(0x1122).unwrap();
        writer.write_bytes(&[0xAA, 0xBB]).unwrap();
        assert_eq!(writer.len(), 5);
        assert_eq!(writer.written(), &[0x10, 0x22, 0x11, 0xAA, 0xBB]);
        assert_eq!(writer.remaining_capacity(), 3);
    }

    #[test]
    fn overflow_is_all_or_nothing() {
        let mut buf = [0u8; 3];
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_u16(0xFFFF).unwrap();
        assert_eq!(writer.write_u16(0x1234), Err(WriteOverflow));
        // Failed write must not consume capacity or modify the buffer.
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.written(), &[0xFF, 0xFF]);
        writer.write_u8(0x01).unwrap();
        assert_eq!(writer.remaining_capacity(), 0);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut buf = [0u8; 0];
        let mut writer = BinaryWriter::new(&mut buf);
        assert_eq!(writer.write_u8(0), Err(WriteOverflow));
        assert!(writer.write_bytes(&[]).is_ok());
    }
}
