//! In-place import name rewriting.
//!
//! For every import whose name is a key of the [`ReplacementMap`], the engine looks for the
//! NUL-terminated name in two passes: first inside the [`SearchWindow`] derived from the
//! import directory, then, only if that fails and the window is not already the whole
//! file, across the entire buffer. The first match is overwritten with the replacement name,
//! its terminator and zero padding out to the original span. Later occurrences are left
//! alone.
//!
//! Nothing in this module returns an error for a single skipped rename. Every skip is
//! recorded in [`PatchResult::issues`] and logged at `warn` level instead.

use log::{debug, info, log_enabled, warn, Level};

use crate::{
    file::{image::RawImage, Backend},
    patch::{PatchResult, Rename, ReplacementMap},
    pe::{
        header::HeaderInfo,
        imports::{ImportEntry, SearchScope, SearchWindow},
        sections::SectionTable,
    },
    Error,
};

/// Position of the first occurrence of `needle` in `haystack`.
#[must_use]
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|candidate| candidate == needle)
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
#[must_use]
pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    let mut count = 0;
    let mut rest = haystack;

    while let Some(position) = find(rest, needle) {
        count += 1;
        rest = &rest[position + needle.len()..];
    }

    count
}

/// Dual-pass search: the window first, then the whole buffer.
fn locate(data: &[u8], needle: &[u8], window: &SearchWindow) -> Option<(usize, SearchScope)> {
    let range = window.range();
    debug!(
        "Searching for {} in {} 0x{:x} - 0x{:x}",
        String::from_utf8_lossy(&needle[..needle.len() - 1]),
        window.scope,
        range.start,
        range.end
    );

    if let Some(position) = data.get(range.clone()).and_then(|region| find(region, needle)) {
        return Some((range.start + position, window.scope));
    }

    if window.covers(data.len()) {
        return None;
    }

    debug!("Not found in import window, trying full file search");
    find(data, needle).map(|position| (position, SearchScope::FullFile))
}

/// Rewrite the import names of `image` according to `map`.
///
/// `imports` must be the descriptor list of `image` in file order. The returned
/// [`PatchResult::imports_after_patch`] has exactly one lower-cased name per entry of
/// `imports`: the replacement for successful renames, the original otherwise.
pub fn rewrite_import_names(
    image: &mut RawImage,
    header: &HeaderInfo,
    imports: &[ImportEntry],
    window: &SearchWindow,
    map: &ReplacementMap,
) -> PatchResult {
    let mut result = PatchResult::default();

    for import in imports {
        let original_lower = import.name.to_ascii_lowercase();
        let Some(replacement) = map.get(&import.name) else {
            result.imports_after_patch.push(original_lower);
            continue;
        };

        info!("Patching import: {} -> {}", import.name, replacement);

        let mut needle = import.name.as_bytes().to_vec();
        needle.push(0);
        let mut bytes = replacement.as_bytes().to_vec();
        bytes.push(0);

        if bytes.len() > needle.len() {
            let issue = Error::ReplacementTooLong {
                original: import.name.clone(),
                replacement: replacement.to_string(),
            };
            warn!("{issue}");
            result.issues.push(issue);
            result.imports_after_patch.push(original_lower);
            continue;
        }

        if log_enabled!(Level::Debug) {
            debug!(
                "Found {} total occurrences of {} in file",
                count_occurrences(image.data(), &needle),
                import.name
            );
        }

        let Some((offset, pass)) = locate(image.data(), &needle, window) else {
            let covered = result
                .renames
                .iter()
                .any(|rename| rename.original == import.name);

            if covered {
                debug!(
                    "{} already renamed by an earlier descriptor sharing its name string",
                    import.name
                );
                result
                    .imports_after_patch
                    .push(replacement.to_ascii_lowercase());
            } else {
                let issue = Error::ImportStringNotFound(import.name.clone());
                warn!("{issue}");
                result.issues.push(issue);
                result.imports_after_patch.push(original_lower);
            }
            continue;
        };

        debug!("Found {} at offset 0x{:x} ({})", import.name, offset, pass);

        if let Err(error) = image.overwrite_padded(offset, needle.len(), &bytes) {
            warn!("Failed to rewrite {} at 0x{:x}: {}", import.name, offset, error);
            result.issues.push(error);
            result.imports_after_patch.push(original_lower);
            continue;
        }

        if log_enabled!(Level::Debug) {
            let written = &image.data()[offset..offset + needle.len()];
            let end = written.iter().position(|b| *b == 0).unwrap_or(written.len());
            debug!(
                "Verified replacement: {} -> {}",
                import.name,
                String::from_utf8_lossy(&written[..end])
            );
        }

        result.patched_any = true;
        result
            .imports_after_patch
            .push(replacement.to_ascii_lowercase());
        result.renames.push(Rename {
            original: import.name.clone(),
            replacement: replacement.to_string(),
            offset,
            rva: SectionTable::new(image.data(), header).offset_to_rva(offset),
            pass,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pe::imports::{parse_imports, SearchWindow},
        test::ImageBuilder,
    };

    fn run(data: Vec<u8>, map: &ReplacementMap) -> (Vec<u8>, PatchResult) {
        let header = HeaderInfo::parse(&data).unwrap();
        let imports = parse_imports(&data).unwrap();
        let window = SearchWindow::locate(&data, &header).unwrap();

        let mut image = RawImage::new(data);
        let result = rewrite_import_names(&mut image, &header, &imports, &window, map);
        (image.into_inner(), result)
    }

    #[test]
    fn search_helpers() {
        assert_eq!(find(b"abcabc", b"cab"), Some(2));
        assert_eq!(find(b"abc", b"abc"), Some(0));
        assert_eq!(find(b"ab", b"abc"), None);
        assert_eq!(find(b"abc", b""), None);
        assert_eq!(count_occurrences(b"a\0xa\0a\0", b"a\0"), 3);
        assert_eq!(count_occurrences(b"aaaa", b"aa"), 2);
    }

    #[test]
    fn window_match_preferred_over_earlier_decoy() {
        let image = ImageBuilder::pe32()
            .import("legacy32.dll")
            .header_decoy(b"legacy32.dll\0")
            .build();
        let map: ReplacementMap = [("legacy32.dll", "shim32.dll")].into_iter().collect();

        let (data, result) = run(image.data.clone(), &map);

        assert_eq!(result.renames.len(), 1);
        assert_eq!(result.renames[0].pass, SearchScope::ImportWindow);
        assert_eq!(result.renames[0].offset, image.name_offsets[0]);
        assert_eq!(
            &data[crate::test::HEADER_DECOY_OFFSET..crate::test::HEADER_DECOY_OFFSET + 13],
            b"legacy32.dll\0"
        );
    }

    #[test]
    fn falls_back_to_full_file() {
        let image = ImageBuilder::pe32()
            .import("legacy32.dll")
            .names_before_descriptors()
            .build();
        let map: ReplacementMap = [("legacy32.dll", "shim32.dll")].into_iter().collect();

        let (data, result) = run(image.data, &map);

        assert!(result.patched_any);
        assert!(result.issues.is_empty());
        assert_eq!(result.renames[0].pass, SearchScope::FullFile);
        let offset = image.name_offsets[0];
        assert_eq!(&data[offset..offset + 13], b"shim32.dll\0\0\0");
        assert_eq!(result.renames[0].rva, Some(0x1000 + (offset - 0x200) as u32));
    }

    #[test]
    fn only_first_occurrence() {
        let image = ImageBuilder::pe32()
            .import("legacy32.dll")
            .trailer(b"legacy32.dll\0")
            .build();
        let map: ReplacementMap = [("legacy32.dll", "shim32.dll")].into_iter().collect();

        let (data, result) = run(image.data.clone(), &map);

        assert_eq!(result.renames.len(), 1);
        assert_eq!(&data[data.len() - 13..], b"legacy32.dll\0");
    }

    #[test]
    fn too_long_is_skipped() {
        let image = ImageBuilder::pe32()
            .import("a.dll")
            .import("legacy32.dll")
            .build();
        let map: ReplacementMap = [("a.dll", "longer.dll"), ("legacy32.dll", "shim32.dll")]
            .into_iter()
            .collect();

        let (data, result) = run(image.data.clone(), &map);

        assert!(result.patched_any);
        assert_eq!(result.renames.len(), 1);
        assert_eq!(result.issues.len(), 1);
        assert!(matches!(
            &result.issues[0],
            Error::ReplacementTooLong { original, replacement }
                if original == "a.dll" && replacement == "longer.dll"
        ));
        assert_eq!(result.imports_after_patch, ["a.dll", "shim32.dll"]);
        let offset = image.name_offsets[0];
        assert_eq!(&data[offset..offset + 6], b"a.dll\0");
    }

    #[test]
    fn equal_length_fits_exactly() {
        let image = ImageBuilder::pe32().import("abc.dll").build();
        let map: ReplacementMap = [("abc.dll", "xyz.dll")].into_iter().collect();

        let (data, result) = run(image.data.clone(), &map);

        assert!(result.patched_any);
        let offset = image.name_offsets[0];
        assert_eq!(&data[offset..offset + 8], b"xyz.dll\0");
    }

    #[test]
    fn unmapped_names_pass_through_lowercased() {
        let image = ImageBuilder::pe32()
            .import("KERNEL32.dll")
            .import("Legacy32.DLL")
            .build();
        let map: ReplacementMap = [("legacy32.dll", "Shim32.dll")].into_iter().collect();

        let (_, result) = run(image.data, &map);

        assert_eq!(result.imports_after_patch, ["kernel32.dll", "shim32.dll"]);
        assert_eq!(result.renames[0].original, "Legacy32.DLL");
        assert_eq!(result.renames[0].replacement, "Shim32.dll");
    }

    #[test]
    fn shared_name_string_is_covered() {
        let image = ImageBuilder::pe32()
            .import("legacy32.dll")
            .import_reusing("legacy32.dll")
            .build();
        assert_eq!(image.name_offsets[0], image.name_offsets[1]);
        let map: ReplacementMap = [("legacy32.dll", "shim32.dll")].into_iter().collect();

        let (_, result) = run(image.data, &map);

        assert_eq!(result.renames.len(), 1);
        assert!(result.issues.is_empty());
        assert_eq!(result.imports_after_patch, ["shim32.dll", "shim32.dll"]);
    }

    #[test]
    fn distinct_copies_each_renamed() {
        let image = ImageBuilder::pe32()
            .import("legacy32.dll")
            .import("legacy32.dll")
            .build();
        let map: ReplacementMap = [("legacy32.dll", "shim32.dll")].into_iter().collect();

        let (data, result) = run(image.data.clone(), &map);

        assert_eq!(result.renames.len(), 2);
        for offset in &image.name_offsets {
            assert_eq!(&data[*offset..*offset + 13], b"shim32.dll\0\0\0");
        }
    }
}
