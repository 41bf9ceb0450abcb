//! PE image access over interchangeable data sources.
//!
//! This module abstracts over where image bytes come from and provides read-only, validated
//! access to the structures the patcher cares about. Mutation never happens through
//! [`PeFile`]; patching works on an owned [`image::RawImage`] instead.
//!
//! # Key Components
//!
//! - [`crate::file::PeFile`] - Read-only PE view with header, section and import accessors
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//! - [`crate::file::image::RawImage`] - Owned, mutable image buffer
//! - [`crate::file::io`] - Bounds-checked little-endian reads and writes
//!
//! # Data Sources
//!
//! - **Physical files** - Memory-mapped, used for architecture detection and import listing
//! - **Memory buffers** - Owned bytes, used for patching and in-memory inspection
//!
//! # Examples
//!
//! ```rust,no_run
//! use pepatch::PeFile;
//! use std::path::Path;
//!
//! let file = PeFile::from_file(Path::new("app.exe"))?;
//! println!("{} image, {} sections", file.architecture(), file.sections().count());
//!
//! for import in file.imports()? {
//!     println!("{} ({} functions)", import.name, import.functions.len());
//! }
//! # Ok::<(), pepatch::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`Backend`] requires `Send + Sync`, so a [`PeFile`] can be shared across the worker
//! threads of a batch run.

pub mod image;
pub mod io;

mod physical;

use std::path::Path;

use crate::{
    pe::{
        header::{Architecture, HeaderInfo},
        imports::{parse_imports, ImportDirectory, ImportEntry, SearchWindow},
        sections::SectionTable,
    },
    Error::Empty,
    Result,
};
use image::RawImage;
use physical::Physical;

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of PE data, allowing for both in-memory and on-disk
/// representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A loaded PE image with validated headers.
///
/// Loading checks the DOS and PE signatures only. Everything else is decoded on demand, so
/// a `PeFile` can be created for images whose import table turns out to be unreadable.
pub struct PeFile {
    data: Box<dyn Backend>,
    header: HeaderInfo,
}

impl PeFile {
    /// Memory-map and load the image at `file`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] for an empty file, or [`crate::Error::MalformedImage`] if it
    /// is not a PE image.
    pub fn from_file(file: &Path) -> Result<PeFile> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Load an image from an owned buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for an empty buffer or
    /// [`crate::Error::MalformedImage`] if it is not a PE image.
    pub fn from_mem(data: Vec<u8>) -> Result<PeFile> {
        let input = RawImage::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<PeFile> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let header = HeaderInfo::parse(data.data())?;

        Ok(PeFile {
            data: Box::new(data),
            header,
        })
    }

    /// Returns the total size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the image has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The complete image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range leaves the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Header offsets and classification.
    #[must_use]
    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    /// Target CPU.
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.header.machine
    }

    /// Iterator over the section table in file order.
    #[must_use]
    pub fn sections(&self) -> SectionTable<'_> {
        SectionTable::new(self.data(), &self.header)
    }

    /// Converts a relative virtual address (RVA) to a file offset.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RvaNotMapped`] if no section covers `rva`.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.sections().rva_to_offset(rva)
    }

    /// Converts a file offset to a relative virtual address (RVA).
    ///
    /// Returns `None` for offsets outside every section's raw data.
    #[must_use]
    pub fn offset_to_rva(&self, offset: usize) -> Option<u32> {
        self.sections().offset_to_rva(offset)
    }

    /// The import data directory entry, if present.
    #[must_use]
    pub fn import_directory(&self) -> Option<ImportDirectory> {
        ImportDirectory::read(self.data(), &self.header)
    }

    /// First-pass search window for import name strings.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RvaNotMapped`] if the import directory RVA is not mapped.
    pub fn search_window(&self) -> Result<SearchWindow> {
        SearchWindow::locate(self.data(), &self.header)
    }

    /// Decode the import descriptor list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ImportParseFailed`] if the import table cannot be decoded.
    pub fn imports(&self) -> Result<Vec<ImportEntry>> {
        parse_imports(self.data())
    }
}
