//! Bounded forward read cursor.

/// Types that can be decoded from a fixed number of little-endian bytes.
///
/// Implemented for the unsigned integer types and fixed-size byte arrays.
pub trait FromBytes: Sized {
    /// Number of bytes consumed by one value.
    const SIZE: usize;

    /// Decode a value from the start of `data`.
    ///
    /// Returns `None` if `data` is shorter than [`Self::SIZE`].
    fn from_le_bytes(data: &[u8]) -> Option<Self>;
}

macro_rules! impl_from_bytes_int {
    ($($ty:ty),*) => {
        $(
            impl FromBytes for $ty {
                const SIZE: usize = size_of::<$ty>();

                fn from_le_bytes(data: &[u8]) -> Option<Self> {
                    let bytes = data.get(..Self::SIZE)?;
                    Some(<$ty>::from_le_bytes(bytes.try_into().ok()?))
                }
            }
        )*
    };
}

impl_from_bytes_int!(u8, u16, u32, u64);

impl<const N: usize> FromBytes for [u8; N] {
    const SIZE: usize = N;

    fn from_le_bytes(data: &[u8]) -> Option<Self> {
        let bytes = data.get(..N)?;
        bytes.try_into().ok()
    }
}

/// A bounded read cursor over a byte slice.
///
/// All typed reads are little-endian. Reads past the end of the underlying
/// slice return `None` and leave the cursor position unchanged.
#[derive(Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current cursor position in bytes from the start.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the total length of the underlying slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying slice is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the cursor has reached the end of the data.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the entire underlying slice, ignoring the cursor.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the bytes from the cursor to the end of the data.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or(&[])
    }

    /// Advances the cursor by `n` bytes, clamping at the end of the data.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    /// Decodes a value at the cursor without advancing.
    #[must_use]
    pub fn peek<T: FromBytes>(&self) -> Option<T> {
        T::from_le_bytes(self.remaining())
    }

    /// Decodes a value at the cursor and advances past it.
    ///
    /// Returns `None` without advancing if fewer than `T::SIZE` bytes remain.
    pub fn read<T: FromBytes>(&mut self) -> Option<T> {
        let value = T::from_le_bytes(self.remaining())?;
        self.pos += T::SIZE;
        Some(value)
    }

    /// Returns a sub-slice of `n` bytes at the cursor and advances past it.
    ///
    /// Returns `None` without advancing if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytes)
    }
}
