//! Optional header OS / subsystem version normalisation.
//!
//! Both optional header variants keep the four version fields at the same offsets, so a
//! single table of offsets serves PE32 and PE32+. Every field is bounds checked before the
//! first write; a buffer too short for any of them is left untouched.

use log::debug;

use crate::{
    file::io::{read_le, slice_at_mut, write_le},
    pe::header::HeaderInfo,
    Error::UnsupportedOptionalHeader,
    Result,
};

/// The `(major, minor)` pair written into both version field pairs (Windows XP).
pub const VERSION_FLOOR: (u16, u16) = (5, 1);

const MAJOR_OS_VERSION: usize = 0x28;
const MINOR_OS_VERSION: usize = 0x2A;
const MAJOR_SUBSYSTEM_VERSION: usize = 0x30;
const MINOR_SUBSYSTEM_VERSION: usize = 0x32;

/// The four version fields of an optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionFields {
    /// `MajorOperatingSystemVersion`
    pub major_os: u16,
    /// `MinorOperatingSystemVersion`
    pub minor_os: u16,
    /// `MajorSubsystemVersion`
    pub major_subsystem: u16,
    /// `MinorSubsystemVersion`
    pub minor_subsystem: u16,
}

fn field_offsets(data: &[u8], header: &HeaderInfo) -> Result<[usize; 4]> {
    if !header.optional_header_magic.is_supported() {
        return Err(UnsupportedOptionalHeader(format!(
            "magic {}",
            header.optional_header_magic
        )));
    }

    let base = header.optional_header_offset;
    let offsets = [
        base + MAJOR_OS_VERSION,
        base + MINOR_OS_VERSION,
        base + MAJOR_SUBSYSTEM_VERSION,
        base + MINOR_SUBSYSTEM_VERSION,
    ];

    if offsets.iter().any(|offset| offset + 2 > data.len()) {
        return Err(UnsupportedOptionalHeader(format!(
            "version fields at 0x{:x} exceed the {}-byte image",
            base + MAJOR_OS_VERSION,
            data.len()
        )));
    }

    Ok(offsets)
}

/// Read the four version fields.
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedOptionalHeader`] for an unknown optional header
/// variant or a truncated header.
pub fn read_version_fields(data: &[u8], header: &HeaderInfo) -> Result<VersionFields> {
    let [major_os, minor_os, major_subsystem, minor_subsystem] = field_offsets(data, header)?;

    Ok(VersionFields {
        major_os: read_le(&data[major_os..])?,
        minor_os: read_le(&data[minor_os..])?,
        major_subsystem: read_le(&data[major_subsystem..])?,
        minor_subsystem: read_le(&data[minor_subsystem..])?,
    })
}

/// Overwrite the four version fields with [`VERSION_FLOOR`] in place.
///
/// Returns the values found before the write.
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedOptionalHeader`] for an unknown optional header
/// variant or a truncated header. `data` is unchanged in that case.
pub fn apply_version_floor(data: &mut [u8], header: &HeaderInfo) -> Result<VersionFields> {
    let previous = read_version_fields(data, header)?;
    let [major_os, minor_os, major_subsystem, minor_subsystem] = field_offsets(data, header)?;

    let (major, minor) = VERSION_FLOOR;
    for (offset, value) in [
        (major_os, major),
        (minor_os, minor),
        (major_subsystem, major),
        (minor_subsystem, minor),
    ] {
        write_le(slice_at_mut(data, offset, 2)?, value)?;
    }

    debug!(
        "Version fields before: os={}.{} subsystem={}.{}, after: os={major}.{minor} subsystem={major}.{minor}",
        previous.major_os, previous.minor_os, previous.major_subsystem, previous.minor_subsystem
    );

    Ok(previous)
}

/// Return a copy of `data` with the OS and subsystem versions set to [`VERSION_FLOOR`].
///
/// # Errors
///
/// Returns [`crate::Error::MalformedImage`] if `data` is not a PE image, or
/// [`crate::Error::UnsupportedOptionalHeader`] if the version fields cannot be patched.
///
/// # Examples
///
/// ```rust,no_run
/// let data = std::fs::read("app_patched.exe")?;
/// let patched = pepatch::patch_version_fields(&data)?;
/// assert_eq!(patched.len(), data.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn patch_version_fields(data: &[u8]) -> Result<Vec<u8>> {
    let header = HeaderInfo::parse(data)?;
    let mut patched = data.to_vec();
    apply_version_floor(&mut patched, &header)?;

    Ok(patched)
}
