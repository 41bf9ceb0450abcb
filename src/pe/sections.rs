//! Section table walker and RVA translation.
//!
//! Sections are read straight from the section table in file order, without sorting or
//! validation beyond bounds checks. Enumeration stops at the first entry that would extend
//! past the end of the buffer, so a truncated table yields the entries that are complete.

use crate::{
    file::io::{read_le, slice_at},
    pe::header::HeaderInfo,
    Error::RvaNotMapped,
    Result,
};

/// Size of one `IMAGE_SECTION_HEADER`.
pub const SECTION_HEADER_SIZE: usize = 40;

/// The placement-relevant fields of one section table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Raw 8-byte section name, NUL padded
    pub name: [u8; 8],
    /// `VirtualAddress`
    pub virtual_address: u32,
    /// `SizeOfRawData`
    pub size_of_raw_data: u32,
    /// `PointerToRawData`
    pub pointer_to_raw_data: u32,
}

impl Section {
    fn read(entry: &[u8]) -> Result<Section> {
        let mut name = [0u8; 8];
        name.copy_from_slice(slice_at(entry, 0, 8)?);

        Ok(Section {
            name,
            virtual_address: read_le::<u32>(&entry[12..])?,
            size_of_raw_data: read_le::<u32>(&entry[16..])?,
            pointer_to_raw_data: read_le::<u32>(&entry[20..])?,
        })
    }

    /// The section name with trailing NULs removed, lossily decoded.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// `true` if `rva` falls inside `[VirtualAddress, VirtualAddress + SizeOfRawData)`.
    #[must_use]
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address
            && u64::from(rva) < u64::from(self.virtual_address) + u64::from(self.size_of_raw_data)
    }

    /// `true` if `offset` falls inside the section's raw data.
    #[must_use]
    pub fn contains_offset(&self, offset: usize) -> bool {
        let start = self.pointer_to_raw_data as usize;
        offset >= start && offset - start < self.size_of_raw_data as usize
    }
}

/// Iterator over the section table of an image.
#[derive(Debug, Clone)]
pub struct SectionTable<'a> {
    data: &'a [u8],
    next: usize,
    remaining: u16,
}

impl<'a> SectionTable<'a> {
    /// Start iterating the section table described by `header`.
    #[must_use]
    pub fn new(data: &'a [u8], header: &HeaderInfo) -> Self {
        SectionTable {
            data,
            next: header.section_table_offset,
            remaining: header.number_of_sections,
        }
    }

    /// Translate an RVA into a file offset using the first section that contains it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RvaNotMapped`] if no complete section table entry covers
    /// `rva`, or if the resulting offset would overflow.
    pub fn rva_to_offset(self, rva: u32) -> Result<usize> {
        for section in self {
            if !section.contains_rva(rva) {
                continue;
            }

            let delta = (rva - section.virtual_address) as usize;
            return (section.pointer_to_raw_data as usize)
                .checked_add(delta)
                .ok_or(RvaNotMapped(rva));
        }

        Err(RvaNotMapped(rva))
    }

    /// Translate a file offset back into an RVA using the first section whose raw data
    /// contains it. Returns `None` for header bytes and overlay data.
    #[must_use]
    pub fn offset_to_rva(self, offset: usize) -> Option<u32> {
        self.into_iter()
            .find(|section| section.contains_offset(offset))
            .and_then(|section| {
                let delta = u32::try_from(offset - section.pointer_to_raw_data as usize).ok()?;
                section.virtual_address.checked_add(delta)
            })
    }
}

impl Iterator for SectionTable<'_> {
    type Item = Section;

    fn next(&mut self) -> Option<Section> {
        if self.remaining == 0 {
            return None;
        }

        let section = slice_at(self.data, self.next, SECTION_HEADER_SIZE)
            .and_then(Section::read)
            .ok();

        match section {
            Some(section) => {
                self.remaining -= 1;
                self.next += SECTION_HEADER_SIZE;
                Some(section)
            }
            None => {
                self.remaining = 0;
                None
            }
        }
    }
}
