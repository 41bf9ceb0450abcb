//! Owned, mutable image buffer used for patching.

use std::{fs, path::Path};

use super::{io, Backend};
use crate::{Error::Empty, Result};

/// An owned, mutable byte buffer holding an entire PE image.
///
/// A `RawImage` is created once per file and exclusively owned by whoever is patching it.
/// All mutation goes through bounds-checked helpers; nothing ever grows or shrinks the
/// buffer, so every offset computed from the original headers stays valid after a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    data: Vec<u8>,
}

impl RawImage {
    /// Create a new image from an owned buffer
    ///
    /// ## Arguments
    /// * 'data' - The data buffer to consume
    pub fn new(data: Vec<u8>) -> RawImage {
        RawImage { data }
    }

    /// Read the complete file at `path` into a new image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(path: &Path) -> Result<RawImage> {
        let data = fs::read(path)?;
        if data.is_empty() {
            return Err(Empty);
        }

        Ok(RawImage { data })
    }

    /// Mutable access to the whole buffer.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    /// Overwrite `span` bytes at `offset` with `bytes`, zero-filling whatever `bytes` does
    /// not cover.
    ///
    /// The occupied span never changes size, which is what keeps every other offset in
    /// the image intact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the span leaves the buffer or `bytes` is
    /// longer than `span`. The buffer is unchanged in either case.
    pub fn overwrite_padded(&mut self, offset: usize, span: usize, bytes: &[u8]) -> Result<()> {
        if bytes.len() > span {
            return Err(crate::Error::OutOfBounds);
        }

        let target = io::slice_at_mut(&mut self.data, offset, span)?;
        let (head, tail) = target.split_at_mut(bytes.len());
        head.copy_from_slice(bytes);
        tail.fill(0);

        Ok(())
    }

    /// Consume the image and return the underlying buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Backend for RawImage {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        io::slice_at(&self.data, offset, len)
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
