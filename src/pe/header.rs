//! DOS, COFF and optional header reader.
//!
//! [`HeaderInfo::parse`] validates the two signatures and derives the offsets every other
//! component works from. It never looks past the first two bytes of the optional header, so
//! an image whose optional header magic is unknown still yields a `HeaderInfo`; only the
//! consumers that depend on the optional header layout refuse to work with it.
//!
//! # Layout
//!
//! ```text
//! 0x00        DOS header ("MZ", e_lfanew at 0x3C)
//! e_lfanew    "PE\0\0"
//! +0x04       COFF file header (20 bytes): Machine, NumberOfSections, ..., SizeOfOptionalHeader
//! +0x18       Optional header (magic 0x10b / 0x20b)
//! +0x18+size  Section table
//! ```

use std::fmt;

use crate::{file::io::read_le, file::io::slice_at, Result};

/// Minimum size of the MS-DOS header.
pub const DOS_HEADER_SIZE: usize = 0x40;
/// Offset of `e_lfanew` within the DOS header.
pub const E_LFANEW_OFFSET: usize = 0x3C;
/// Size of the PE signature plus the COFF file header.
pub const NT_HEADERS_PREFIX: usize = 4 + 20;

const DOS_SIGNATURE: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";

/// Target CPU as declared by the COFF `Machine` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// `IMAGE_FILE_MACHINE_I386` (0x014c)
    X86,
    /// `IMAGE_FILE_MACHINE_AMD64` (0x8664)
    X86_64,
    /// Any other machine code
    Unknown(u16),
}

impl Architecture {
    /// Classify a raw COFF machine code.
    #[must_use]
    pub fn from_machine(machine: u16) -> Self {
        match machine {
            0x014c => Architecture::X86,
            0x8664 => Architecture::X86_64,
            other => Architecture::Unknown(other),
        }
    }

    /// The raw COFF machine code.
    #[must_use]
    pub fn machine(self) -> u16 {
        match self {
            Architecture::X86 => 0x014c,
            Architecture::X86_64 => 0x8664,
            Architecture::Unknown(code) => code,
        }
    }

    /// `true` for [`Architecture::X86`] and [`Architecture::X86_64`].
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Architecture::Unknown(_))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => f.write_str("x86"),
            Architecture::X86_64 => f.write_str("x86_64"),
            Architecture::Unknown(code) => write!(f, "unknown_0x{code:x}"),
        }
    }
}

/// Optional header variant, identified by its leading magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeaderMagic {
    /// `0x10b`
    Pe32,
    /// `0x20b`
    Pe32Plus,
    /// Anything else, including a magic truncated by the end of the file
    Unknown(u16),
}

impl OptionalHeaderMagic {
    /// Classify a raw optional header magic.
    #[must_use]
    pub fn from_raw(magic: u16) -> Self {
        match magic {
            0x10b => OptionalHeaderMagic::Pe32,
            0x20b => OptionalHeaderMagic::Pe32Plus,
            other => OptionalHeaderMagic::Unknown(other),
        }
    }

    /// `true` for PE32 and PE32+.
    #[must_use]
    pub fn is_supported(self) -> bool {
        !matches!(self, OptionalHeaderMagic::Unknown(_))
    }

    /// Offset of the data directory array, relative to the optional header start.
    ///
    /// The directory array is preceded by the 4-byte `NumberOfRvaAndSizes` field.
    #[must_use]
    pub fn data_directories_offset(self) -> Option<usize> {
        match self {
            OptionalHeaderMagic::Pe32 => Some(0x60),
            OptionalHeaderMagic::Pe32Plus => Some(0x70),
            OptionalHeaderMagic::Unknown(_) => None,
        }
    }
}

impl fmt::Display for OptionalHeaderMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionalHeaderMagic::Pe32 => f.write_str("PE32"),
            OptionalHeaderMagic::Pe32Plus => f.write_str("PE32+"),
            OptionalHeaderMagic::Unknown(magic) => write!(f, "unknown (0x{magic:x})"),
        }
    }
}

/// Read-only facts derived from the image headers.
///
/// Computed once per image. None of the patch operations touch the fields read here, so a
/// `HeaderInfo` stays valid for the patched buffer as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    /// File offset of the `PE\0\0` signature (`e_lfanew`)
    pub pe_offset: usize,
    /// Target CPU
    pub machine: Architecture,
    /// `NumberOfSections` from the COFF header
    pub number_of_sections: u16,
    /// `SizeOfOptionalHeader` from the COFF header
    pub size_of_optional_header: u16,
    /// File offset of the optional header
    pub optional_header_offset: usize,
    /// Optional header variant
    pub optional_header_magic: OptionalHeaderMagic,
    /// File offset of the first section table entry
    pub section_table_offset: usize,
}

impl HeaderInfo {
    /// Validate the DOS and PE signatures and derive the header offsets.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedImage`] if the buffer is shorter than a DOS header,
    /// lacks the `MZ` or `PE\0\0` signature, or `e_lfanew` points past the end of the buffer.
    pub fn parse(data: &[u8]) -> Result<HeaderInfo> {
        if data.len() < DOS_HEADER_SIZE {
            return Err(malformed_error!(
                "Buffer of {} bytes is smaller than a DOS header",
                data.len()
            ));
        }

        if &data[..2] != DOS_SIGNATURE {
            return Err(malformed_error!("Missing MZ signature"));
        }

        let pe_offset = read_le::<u32>(&data[E_LFANEW_OFFSET..])? as usize;
        match pe_offset.checked_add(NT_HEADERS_PREFIX) {
            Some(end) if end <= data.len() => {}
            _ => {
                return Err(malformed_error!(
                    "e_lfanew 0x{:x} points past the end of the buffer ({} bytes)",
                    pe_offset,
                    data.len()
                ))
            }
        }

        if slice_at(data, pe_offset, PE_SIGNATURE.len())? != PE_SIGNATURE {
            return Err(malformed_error!(
                "Missing PE signature at 0x{:x}",
                pe_offset
            ));
        }

        let coff = &data[pe_offset + 4..];
        let machine = Architecture::from_machine(read_le::<u16>(coff)?);
        let number_of_sections = read_le::<u16>(&coff[2..])?;
        let size_of_optional_header = read_le::<u16>(&coff[16..])?;

        let optional_header_offset = pe_offset + NT_HEADERS_PREFIX;
        let optional_header_magic = match slice_at(data, optional_header_offset, 2) {
            Ok(bytes) => OptionalHeaderMagic::from_raw(read_le::<u16>(bytes)?),
            Err(_) => OptionalHeaderMagic::Unknown(0),
        };

        Ok(HeaderInfo {
            pe_offset,
            machine,
            number_of_sections,
            size_of_optional_header,
            optional_header_offset,
            optional_header_magic,
            section_table_offset: optional_header_offset + usize::from(size_of_optional_header),
        })
    }
}

/// Determine the target CPU of a PE image.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedImage`] if the buffer is not a PE image.
///
/// # Examples
///
/// ```rust,no_run
/// use pepatch::{detect_architecture, Architecture};
///
/// let data = std::fs::read("app.exe")?;
/// if detect_architecture(&data)? == Architecture::X86_64 {
///     println!("64-bit image");
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn detect_architecture(data: &[u8]) -> Result<Architecture> {
    HeaderInfo::parse(data).map(|header| header.machine)
}
