//! Case-insensitive import library replacement map.
//!
//! Keys are stored lower-cased; lookups lower-case the probe, so `KERNEL32.DLL` and
//! `kernel32.dll` hit the same entry. Replacement names keep the case they were configured
//! with, since they are written into the image verbatim.
//!
//! # Configuration format
//!
//! ```ini
//! ; one section per library to replace
//! [kernel32.dll]
//! ReplacementName=progwrp.dll
//!
//! [USER32.dll]
//! replacementname = progwrp.dll
//! ```
//!
//! Blank lines and lines starting with `#` or `;` are skipped. Key/value lines outside a
//! section and keys other than `ReplacementName` are ignored. A later section with the same
//! (case-folded) name overrides an earlier one.

use std::{
    collections::{btree_map, BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use crate::{Error, Result};

const REPLACEMENT_KEY: &str = "replacementname";

/// Mapping from lower-cased original library name to replacement library name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementMap {
    entries: BTreeMap<String, String>,
}

impl ReplacementMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a replacement map from INI text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for an unterminated section header or an empty
    /// `ReplacementName` value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pepatch::ReplacementMap;
    ///
    /// let map = ReplacementMap::from_ini_str("[Legacy32.dll]\nReplacementName=shim32.dll\n")?;
    /// assert_eq!(map.get("LEGACY32.DLL"), Some("shim32.dll"));
    /// # Ok::<(), pepatch::Error>(())
    /// ```
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let mut map = ReplacementMap::new();
        let mut section: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let Some(name) = header.strip_suffix(']') else {
                    return Err(Error::Config {
                        line: index + 1,
                        message: format!("unterminated section header '{line}'"),
                    });
                };

                let name = name.trim().to_ascii_lowercase();
                section = (!name.is_empty()).then_some(name);
                continue;
            }

            let (Some(current), Some((key, value))) = (section.as_ref(), line.split_once('='))
            else {
                continue;
            };

            if !key.trim().eq_ignore_ascii_case(REPLACEMENT_KEY) {
                continue;
            }

            let value = value.trim();
            if value.is_empty() {
                return Err(Error::Config {
                    line: index + 1,
                    message: format!("empty ReplacementName for [{current}]"),
                });
            }

            map.insert(current, value);
        }

        Ok(map)
    }

    /// Read and parse a replacement map INI file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or
    /// [`crate::Error::Config`] if it is invalid.
    pub fn from_ini_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ini_str(&text)
    }

    /// Add or replace a mapping. The original name is case-folded.
    pub fn insert(&mut self, original: &str, replacement: &str) -> Option<String> {
        self.entries
            .insert(original.to_ascii_lowercase(), replacement.to_string())
    }

    /// The replacement for `original`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries
            .get(&original.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of configured replacements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no replacement is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(lower-cased original, replacement)` pairs in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }

    /// The distinct, lower-cased replacement library names.
    #[must_use]
    pub fn replacement_names(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .map(|name| name.to_ascii_lowercase())
            .collect()
    }

    /// `true` if `name` is one of the replacement libraries, compared case-insensitively.
    #[must_use]
    pub fn is_replacement_name(&self, name: &str) -> bool {
        self.entries
            .values()
            .any(|replacement| replacement.eq_ignore_ascii_case(name))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for ReplacementMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ReplacementMap::new();
        for (original, replacement) in iter {
            map.insert(original.as_ref(), replacement.as_ref());
        }
        map
    }
}

impl<'a> IntoIterator for &'a ReplacementMap {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
