//! Bounds-checked little-endian reading and writing over raw image buffers.
//!
//! Every PE structure this crate touches is little-endian and lives at an offset computed
//! from other fields of the same file. Those offsets are attacker-controlled in the sense
//! that a damaged or hostile image can point anywhere, so no code in this crate indexes a
//! buffer with a computed offset directly. Instead all header and string accesses go through
//! the functions in this module, which check `offset + size_of::<T>()` against the buffer
//! length (with overflow checks) before touching memory.
//!
//! # Key Components
//!
//! - [`crate::file::io::PeIO`] - Trait mapping primitive integers to their byte arrays
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - Checked reads
//! - [`crate::file::io::write_le`] / [`crate::file::io::write_le_at`] - Checked writes
//! - [`crate::file::io::slice_at`] / [`crate::file::io::slice_at_mut`] - Checked sub-slices
//!
//! # Examples
//!
//! ```rust,ignore
//! use pepatch::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 8];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0x8664u16)?;
//! write_le_at(&mut data, &mut offset, 3u16)?;
//!
//! let mut offset = 0;
//! let machine: u16 = read_le_at(&data, &mut offset)?;
//! assert_eq!(machine, 0x8664);
//! # Ok::<(), pepatch::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] if the access would leave the buffer.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data reading and writing operations.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait PeIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_pe_io {
    ($($ty:ty),*) => {
        $(
            impl PeIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_pe_io!(u8, u16, u32, u64);

/// Returns `offset..offset + len` if that range lies entirely inside a buffer of `data_len` bytes.
fn checked_range(data_len: usize, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
    let Some(end) = offset.checked_add(len) else {
        return Err(OutOfBounds);
    };

    if end > data_len {
        return Err(OutOfBounds);
    }

    Ok(offset..end)
}

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: PeIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`.
///
/// The offset is advanced by the number of bytes read, so consecutive fields of a header
/// can be read without recomputing positions.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset position (will be advanced after reading)
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes. The offset is left
/// untouched in that case.
///
/// # Examples
///
/// ```rust,ignore
/// use pepatch::file::io::read_le_at;
///
/// let data = [0x4C, 0x01, 0x02, 0x00];
/// let mut offset = 0;
/// let machine: u16 = read_le_at(&data, &mut offset)?;
/// let sections: u16 = read_le_at(&data, &mut offset)?;
/// assert_eq!((machine, sections, offset), (0x014C, 2, 4));
/// # Ok::<(), pepatch::Error>(())
/// ```
pub fn read_le_at<T: PeIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let range = checked_range(data.len(), *offset, std::mem::size_of::<T>())?;

    let Ok(read) = data[range.clone()].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = range.end;

    Ok(T::from_le_bytes(read))
}

/// Safely writes a value of type `T` in little-endian byte order to the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_le<T: PeIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Safely writes a value of type `T` in little-endian byte order at `offset`.
///
/// The offset is advanced by the number of bytes written.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the write would leave the buffer. Nothing is
/// written in that case.
pub fn write_le_at<T: PeIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let range = checked_range(data.len(), *offset, std::mem::size_of::<T>())?;

    data[range.clone()].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = range.end;

    Ok(())
}

/// Returns `len` bytes starting at `offset`, or [`crate::Error::OutOfBounds`].
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let range = checked_range(data.len(), offset, len)?;
    Ok(&data[range])
}

/// Mutable counterpart of [`slice_at`].
pub fn slice_at_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let range = checked_range(data.len(), offset, len)?;
    Ok(&mut data[range])
}
