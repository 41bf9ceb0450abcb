//! Import directory location and import list extraction.
//!
//! Two separate things live here:
//!
//! - [`ImportDirectory`] / [`SearchWindow`] read data directory entry 1 by hand and turn it
//!   into the file range the string patch engine searches first. The range is only a hint:
//!   toolchains put the name strings wherever they like, commonly right after the descriptor
//!   table, so the window extends [`SEARCH_EXPANSION`] bytes past the descriptors.
//! - [`parse_imports`] decodes the descriptor list itself through `goblin`'s import table
//!   parser, yielding one [`ImportEntry`] per descriptor in file order. No other data
//!   directory is read, so a bogus debug or resource entry cannot fail the parse.

use std::ops::Range;

use goblin::pe::{
    header::Header,
    import::{ImportData, SyntheticImportLookupTableEntry},
    options::ParseOptions,
};
use strum::Display;

use crate::{
    file::io::read_le_at,
    pe::{
        header::{HeaderInfo, OptionalHeaderMagic},
        sections::SectionTable,
    },
    Result,
};

/// Index of the import table in the data directory array.
pub const IMPORT_DIRECTORY_INDEX: usize = 1;
/// Margin added past the end of the descriptor table for the first search pass.
pub const SEARCH_EXPANSION: usize = 0x10000;

const DATA_DIRECTORY_SIZE: usize = 8;

/// The import data directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportDirectory {
    /// RVA of the first import descriptor
    pub rva: u32,
    /// Size of the descriptor table in bytes
    pub size: u32,
}

impl ImportDirectory {
    /// Read data directory entry 1.
    ///
    /// Returns `None` if the optional header variant is unknown, the directory array has
    /// fewer than two entries, the entry lies outside the buffer, or either its RVA or
    /// size is zero.
    #[must_use]
    pub fn read(data: &[u8], header: &HeaderInfo) -> Option<ImportDirectory> {
        let directories = header.optional_header_magic.data_directories_offset()?;
        let directories = header.optional_header_offset + directories;

        let mut count_offset = directories - 4;
        let count = read_le_at::<u32>(data, &mut count_offset).ok()?;
        if (count as usize) <= IMPORT_DIRECTORY_INDEX {
            return None;
        }

        let mut offset = directories + IMPORT_DIRECTORY_INDEX * DATA_DIRECTORY_SIZE;
        let rva = read_le_at::<u32>(data, &mut offset).ok()?;
        let size = read_le_at::<u32>(data, &mut offset).ok()?;

        if rva == 0 || size == 0 {
            return None;
        }

        Some(ImportDirectory { rva, size })
    }

    /// File offset range `[importTableStart, importTableEnd)` of the descriptor table.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RvaNotMapped`] if no section maps the directory RVA.
    pub fn file_range(&self, sections: SectionTable<'_>) -> Result<Range<usize>> {
        let start = sections.rva_to_offset(self.rva)?;
        Ok(start..start.saturating_add(self.size as usize))
    }
}

/// Which part of the file a search covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SearchScope {
    /// The import descriptor table plus [`SEARCH_EXPANSION`]
    #[strum(serialize = "import window")]
    ImportWindow,
    /// The whole buffer
    #[strum(serialize = "full file")]
    FullFile,
}

/// A byte range of the image to search for import name strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// First byte of the window
    pub start: usize,
    /// One past the last byte of the window
    pub end: usize,
    /// How the window was derived
    pub scope: SearchScope,
}

impl SearchWindow {
    /// A window covering the whole buffer.
    #[must_use]
    pub fn full_file(len: usize) -> Self {
        SearchWindow {
            start: 0,
            end: len,
            scope: SearchScope::FullFile,
        }
    }

    /// Derive the first-pass search window for an image.
    ///
    /// The window is `[importTableStart, importTableEnd + SEARCH_EXPANSION)`, clamped to the
    /// buffer. An absent import directory or an unknown optional header yields the whole
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RvaNotMapped`] if the directory RVA is not covered by any
    /// section. Callers degrade to [`SearchWindow::full_file`] in that case.
    pub fn locate(data: &[u8], header: &HeaderInfo) -> Result<SearchWindow> {
        let Some(directory) = ImportDirectory::read(data, header) else {
            return Ok(Self::full_file(data.len()));
        };

        let range = directory.file_range(SectionTable::new(data, header))?;
        let start = range.start.min(data.len());
        let end = range
            .end
            .saturating_add(SEARCH_EXPANSION)
            .min(data.len())
            .max(start);

        if start == 0 && end == data.len() {
            return Ok(Self::full_file(data.len()));
        }

        Ok(SearchWindow {
            start,
            end,
            scope: SearchScope::ImportWindow,
        })
    }

    /// `true` if the window spans the entire buffer of `len` bytes.
    #[must_use]
    pub fn covers(&self, len: usize) -> bool {
        self.start == 0 && self.end >= len
    }

    /// The window as a range.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// One import descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Library name exactly as stored in the image
    pub name: String,
    /// RVA of the name string
    pub name_rva: u32,
    /// File range of the name string including its terminator, if the RVA is mapped
    pub name_offset: Option<Range<usize>>,
    /// Functions imported from this library, by name or as `#ordinal`
    pub functions: Vec<String>,
}

/// Decode the import descriptor list.
///
/// Only the headers, the section table and the import directory are decoded. Damage in
/// other data directories (debug, resources, certificates) does not affect the result.
/// Returns an empty list for images without an import directory.
///
/// # Errors
///
/// Returns [`crate::Error::ImportParseFailed`] if `goblin` cannot decode the headers or the
/// import table, or [`crate::Error::MalformedImage`] if the headers are invalid.
pub fn parse_imports(data: &[u8]) -> Result<Vec<ImportEntry>> {
    let header = HeaderInfo::parse(data)?;
    let pe_header = Header::parse(data)?;

    let Some(optional_header) = pe_header.optional_header else {
        return Ok(Vec::new());
    };
    let Some(&directory) = optional_header.data_directories.get_import_table() else {
        return Ok(Vec::new());
    };

    let mut offset = header.section_table_offset;
    let sections = pe_header.coff_header.sections(data, &mut offset)?;
    let file_alignment = optional_header.windows_fields.file_alignment;
    let opts = ParseOptions::default();

    let import_data = if header.optional_header_magic == OptionalHeaderMagic::Pe32Plus {
        ImportData::parse_with_opts::<u64>(data, directory, &sections, file_alignment, &opts)?
    } else {
        ImportData::parse_with_opts::<u32>(data, directory, &sections, file_alignment, &opts)?
    };

    let entries = import_data
        .import_data
        .iter()
        .map(|descriptor| {
            let name_rva = descriptor.import_directory_entry.name_rva;
            let name_offset = SectionTable::new(data, &header)
                .rva_to_offset(name_rva)
                .ok()
                .map(|start| start..start + descriptor.name.len() + 1);

            let functions = descriptor
                .import_lookup_table
                .iter()
                .flatten()
                .map(|entry| match entry {
                    SyntheticImportLookupTableEntry::OrdinalNumber(ordinal) => {
                        format!("#{ordinal}")
                    }
                    SyntheticImportLookupTableEntry::HintNameTableRVA((_, hint)) => {
                        hint.name.to_string()
                    }
                })
                .collect();

            ImportEntry {
                name: descriptor.name.to_string(),
                name_rva,
                name_offset,
                functions,
            }
        })
        .collect();

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::ImageBuilder, Error};

    #[test]
    fn directory_entry() {
        let image = ImageBuilder::pe32()
            .import("kernel32.dll")
            .import("user32.dll")
            .build();
        let header = HeaderInfo::parse(&image.data).unwrap();

        let directory = ImportDirectory::read(&image.data, &header).unwrap();
        assert_eq!(directory.rva, 0x1000);
        assert_eq!(directory.size, 60);

        let range = directory
            .file_range(SectionTable::new(&image.data, &header))
            .unwrap();
        assert_eq!(range, image.import_table_offset..image.import_table_offset + 60);
    }

    #[test]
    fn window_is_clamped() {
        let image = ImageBuilder::pe32_plus().import("kernel32.dll").build();
        let header = HeaderInfo::parse(&image.data).unwrap();

        let window = SearchWindow::locate(&image.data, &header).unwrap();
        assert_eq!(window.scope, SearchScope::ImportWindow);
        assert_eq!(window.start, 0x200);
        assert_eq!(window.end, image.data.len());
        assert!(!window.covers(image.data.len()));
    }

    #[test]
    fn window_expands_past_descriptors() {
        let image = ImageBuilder::pe32()
            .import("kernel32.dll")
            .trailer(&vec![0u8; 3 * SEARCH_EXPANSION])
            .build();
        let header = HeaderInfo::parse(&image.data).unwrap();

        let window = SearchWindow::locate(&image.data, &header).unwrap();
        assert_eq!(window.start, image.import_table_offset);
        assert_eq!(
            window.end,
            image.import_table_offset + image.import_table_size + SEARCH_EXPANSION
        );
    }

    #[test]
    fn absent_directory_is_full_file() {
        let image = ImageBuilder::pe32()
            .import("kernel32.dll")
            .without_import_directory()
            .build();
        let header = HeaderInfo::parse(&image.data).unwrap();

        assert_eq!(ImportDirectory::read(&image.data, &header), None);
        let window = SearchWindow::locate(&image.data, &header).unwrap();
        assert_eq!(window, SearchWindow::full_file(image.data.len()));
        assert!(window.covers(image.data.len()));
    }

    #[test]
    fn unknown_magic_is_full_file() {
        let image = ImageBuilder::pe32().import("kernel32.dll").magic(0x107).build();
        let header = HeaderInfo::parse(&image.data).unwrap();

        let window = SearchWindow::locate(&image.data, &header).unwrap();
        assert_eq!(window.scope, SearchScope::FullFile);
    }

    #[test]
    fn unmapped_directory() {
        let mut data = ImageBuilder::pe32().import("kernel32.dll").build().data;
        // PE32 import directory RVA lives at optional header + 0x68
        data[0x98 + 0x68..0x98 + 0x6C].copy_from_slice(&0x9000u32.to_le_bytes());
        let header = HeaderInfo::parse(&data).unwrap();

        assert!(matches!(
            SearchWindow::locate(&data, &header),
            Err(Error::RvaNotMapped(0x9000))
        ));
    }

    #[test]
    fn parse_descriptor_names() {
        let image = ImageBuilder::pe32()
            .import("KERNEL32.dll")
            .import("legacy32.dll")
            .build();

        let imports = parse_imports(&image.data).unwrap();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].name, "KERNEL32.dll");
        assert_eq!(imports[1].name, "legacy32.dll");

        let offset = image.name_offsets[1];
        assert_eq!(imports[1].name_offset, Some(offset..offset + 13));
        assert_eq!(
            &image.data[offset..offset + 13],
            b"legacy32.dll\0".as_slice()
        );
        assert!(imports[1].functions.is_empty());
    }

    #[test]
    fn parse_pe32_plus() {
        let image = ImageBuilder::pe32_plus().import("shell32.dll").build();

        let imports = parse_imports(&image.data).unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].name, "shell32.dll");
    }

    #[test]
    fn parse_without_directory() {
        let image = ImageBuilder::pe32()
            .import("kernel32.dll")
            .without_import_directory()
            .build();

        assert!(parse_imports(&image.data).unwrap().is_empty());
    }

    #[test]
    fn damaged_unrelated_directories() {
        // Debug (6) and resource (2) entries pointing past every section
        for index in [2, 6] {
            let image = ImageBuilder::pe32()
                .import("legacy32.dll")
                .data_directory(index, 0x9000, 0x1c)
                .build();

            let imports = parse_imports(&image.data).unwrap();
            assert_eq!(imports.len(), 1);
            assert_eq!(imports[0].name, "legacy32.dll");
        }

        let image = ImageBuilder::pe32_plus()
            .import("kernel32.dll")
            .data_directory(6, 0xdead_0000, 0x1c)
            .data_directory(4, 0x7fff_0000, 0x100)
            .build();
        assert_eq!(parse_imports(&image.data).unwrap()[0].name, "kernel32.dll");
    }

    #[test]
    fn parse_failures() {
        let image = ImageBuilder::pe32().import("kernel32.dll").magic(0x107).build();
        assert!(matches!(
            parse_imports(&image.data),
            Err(Error::ImportParseFailed(_))
        ));

        assert!(matches!(
            parse_imports(b"not a PE image at all, just some bytes padded out to 64 bytes.."),
            Err(Error::MalformedImage { .. })
        ));
    }
}
