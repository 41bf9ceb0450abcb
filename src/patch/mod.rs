//! Import name and version field patching.
//!
//! [`patch_image`] is the pure entry point: it copies the caller's buffer into a
//! [`RawImage`], rewrites the import names listed in a [`ReplacementMap`] and returns the new
//! bytes together with a [`PatchResult`]. The caller's buffer is never touched.
//!
//! # Key Components
//!
//! - [`mapping::ReplacementMap`] - Case-insensitive original-to-replacement table
//! - [`strings::rewrite_import_names`] - Dual-pass, length-preserving name rewriting
//! - [`version::patch_version_fields`] - OS/subsystem version floor
//!
//! # Examples
//!
//! ```rust,no_run
//! use pepatch::{patch_image, ReplacementMap};
//!
//! let map: ReplacementMap = [("kernel32.dll", "progwrp.dll")].into_iter().collect();
//! let data = std::fs::read("app.exe")?;
//!
//! let patched = patch_image(&data, &map)?;
//! for rename in &patched.result.renames {
//!     println!("{} -> {} at 0x{:x}", rename.original, rename.replacement, rename.offset);
//! }
//! for issue in &patched.result.issues {
//!     eprintln!("warning: {issue}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod mapping;
pub mod strings;
pub mod version;

use std::collections::BTreeSet;

use log::warn;

pub use mapping::ReplacementMap;

use crate::{
    file::{image::RawImage, Backend},
    pe::{
        header::HeaderInfo,
        imports::{parse_imports, ImportEntry, SearchScope, SearchWindow},
    },
    Error, Result,
};

/// A single successful rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    /// Import name as it was stored in the image
    pub original: String,
    /// Name written in its place
    pub replacement: String,
    /// File offset of the rewritten string
    pub offset: usize,
    /// RVA of the rewritten string, if it lies inside a section
    pub rva: Option<u32>,
    /// Which search pass found the string
    pub pass: SearchScope,
}

/// Outcome of rewriting the import names of one image.
#[derive(Debug, Default)]
pub struct PatchResult {
    /// `true` if at least one rename was written
    pub patched_any: bool,
    /// Lower-cased library names imported by the output, one per descriptor in file order
    pub imports_after_patch: Vec<String>,
    /// Every rename that was written
    pub renames: Vec<Rename>,
    /// Non-fatal conditions, one per skipped rename plus an unmapped import directory
    pub issues: Vec<Error>,
}

impl PatchResult {
    /// The distinct, lower-cased replacement names present in the output.
    ///
    /// These are the helper libraries the output needs next to it.
    #[must_use]
    pub fn deployed_names(&self) -> BTreeSet<String> {
        self.renames
            .iter()
            .map(|rename| rename.replacement.to_ascii_lowercase())
            .collect()
    }
}

/// The bytes and report produced by [`patch_image`].
#[derive(Debug)]
pub struct PatchedImage {
    /// The patched image, same length as the input
    pub data: Vec<u8>,
    /// What was renamed, what was skipped and why
    pub result: PatchResult,
}

/// Rewrite the import library names of a PE image.
///
/// Import names whose lower-cased form is a key of `map` are replaced by the mapped name,
/// NUL padded to the original length. The window derived from the import directory is
/// searched first and the whole file second; only the first match is rewritten. Renames
/// that cannot be applied are reported in [`PatchResult::issues`] and do not fail the call.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedImage`] if `data` is not a PE image, or
/// [`crate::Error::ImportParseFailed`] if its import table cannot be decoded.
pub fn patch_image(data: &[u8], map: &ReplacementMap) -> Result<PatchedImage> {
    let mut image = RawImage::new(data.to_vec());
    let result = patch_raw_image(&mut image, map)?;

    Ok(PatchedImage {
        data: image.into_inner(),
        result,
    })
}

/// In-place variant of [`patch_image`] for callers that already own the image buffer.
///
/// # Errors
///
/// Same as [`patch_image`]. The image is unchanged when an error is returned.
pub fn patch_raw_image(image: &mut RawImage, map: &ReplacementMap) -> Result<PatchResult> {
    let header = HeaderInfo::parse(image.data())?;
    let imports = parse_imports(image.data())?;

    Ok(rewrite_imports(image, &header, &imports, map))
}

/// Rewrite the import names of an image whose headers and descriptors are already decoded.
///
/// `header` and `imports` must describe `image`. An import directory that no section maps
/// is reported as an issue and the whole file is searched instead.
pub fn rewrite_imports(
    image: &mut RawImage,
    header: &HeaderInfo,
    imports: &[ImportEntry],
    map: &ReplacementMap,
) -> PatchResult {
    let mut issues = Vec::new();
    let window = match SearchWindow::locate(image.data(), header) {
        Ok(window) => window,
        Err(error) => {
            warn!("{error}, searching the entire file");
            issues.push(error);
            SearchWindow::full_file(image.len())
        }
    };

    let mut result = strings::rewrite_import_names(image, header, imports, &window, map);
    issues.append(&mut result.issues);
    result.issues = issues;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ImageBuilder;

    fn legacy_map() -> ReplacementMap {
        [("legacy32.dll", "shim32.dll")].into_iter().collect()
    }

    #[test]
    fn end_to_end_legacy32() {
        let image = ImageBuilder::pe32().import("legacy32.dll").build();

        let patched = patch_image(&image.data, &legacy_map()).unwrap();

        assert!(patched.result.patched_any);
        assert_eq!(patched.result.renames.len(), 1);
        assert!(patched.result.issues.is_empty());
        assert_eq!(patched.result.imports_after_patch, ["shim32.dll"]);
        assert_eq!(
            patched.result.deployed_names().into_iter().collect::<Vec<_>>(),
            ["shim32.dll"]
        );

        let offset = image.name_offsets[0];
        assert_eq!(patched.result.renames[0].offset, offset);
        assert_eq!(&patched.data[offset..offset + 12], b"shim32.dll\0\0");
        assert_eq!(&patched.data[offset + 12..offset + 13], b"\0");
    }

    #[test]
    fn input_buffer_untouched() {
        let image = ImageBuilder::pe32().import("legacy32.dll").build();
        let original = image.data.clone();

        let patched = patch_image(&image.data, &legacy_map()).unwrap();

        assert_eq!(image.data, original);
        assert_eq!(patched.data.len(), original.len());
        assert_ne!(patched.data, original);
    }

    #[test]
    fn surrounding_bytes_untouched() {
        let image = ImageBuilder::pe32_plus()
            .import("kernel32.dll")
            .import("legacy32.dll")
            .import("user32.dll")
            .build();

        let patched = patch_image(&image.data, &legacy_map()).unwrap();

        let target = image.name_offsets[1];
        for (offset, (before, after)) in image.data.iter().zip(&patched.data).enumerate() {
            if !(target..target + 13).contains(&offset) {
                assert_eq!(before, after, "byte 0x{offset:x} changed");
            }
        }
        assert!(patched.data[target + 10..target + 13].iter().all(|b| *b == 0));
    }

    #[test]
    fn idempotent() {
        let image = ImageBuilder::pe32().import("legacy32.dll").build();
        let first = patch_image(&image.data, &legacy_map()).unwrap();

        let second = patch_image(&first.data, &legacy_map()).unwrap();

        assert!(!second.result.patched_any);
        assert!(second.result.renames.is_empty());
        assert!(second.result.issues.is_empty());
        assert_eq!(second.data, first.data);
        assert_eq!(second.result.imports_after_patch, ["shim32.dll"]);
    }

    #[test]
    fn no_matching_imports() {
        let image = ImageBuilder::pe32().import("KERNEL32.dll").build();

        let patched = patch_image(&image.data, &legacy_map()).unwrap();

        assert!(!patched.result.patched_any);
        assert_eq!(patched.data, image.data);
        assert_eq!(patched.result.imports_after_patch, ["kernel32.dll"]);
    }

    #[test]
    fn damaged_debug_directory_still_patches() {
        let image = ImageBuilder::pe32()
            .import("legacy32.dll")
            .data_directory(6, 0x9000, 0x1c)
            .build();

        let patched = patch_image(&image.data, &legacy_map()).unwrap();

        assert!(patched.result.patched_any);
        assert!(patched.result.issues.is_empty());
        let offset = image.name_offsets[0];
        assert_eq!(&patched.data[offset..offset + 13], b"shim32.dll\0\0\0");
    }

    #[test]
    fn rewrite_uses_descriptors_decoded_beforehand() {
        let image = ImageBuilder::pe32_plus()
            .import("kernel32.dll")
            .import("legacy32.dll")
            .build();
        let mut raw = RawImage::new(image.data.clone());

        let header = HeaderInfo::parse(raw.data()).unwrap();
        let imports = parse_imports(raw.data()).unwrap();
        assert_eq!(raw.data(), &image.data[..]);
        assert_eq!(imports[1].name, "legacy32.dll");

        let result = rewrite_imports(&mut raw, &header, &imports, &legacy_map());

        assert!(result.patched_any);
        assert_eq!(result.imports_after_patch, ["kernel32.dll", "shim32.dll"]);
        let offset = image.name_offsets[1];
        assert_eq!(&raw.data()[offset..offset + 13], b"shim32.dll\0\0\0");
    }

    #[test]
    fn not_a_pe() {
        assert!(matches!(
            patch_image(&[0u8; 16], &legacy_map()),
            Err(Error::MalformedImage { .. })
        ));
    }

    #[test]
    fn unknown_magic_is_fatal_for_import_parsing() {
        let image = ImageBuilder::pe32().import("legacy32.dll").magic(0x107).build();
        assert!(matches!(
            patch_image(&image.data, &legacy_map()),
            Err(Error::ImportParseFailed(_))
        ));
    }
}
