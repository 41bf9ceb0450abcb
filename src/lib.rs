// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # pepatch
//!
//! In-place import library renaming for Windows PE images.
//!
//! `pepatch` rewrites the names of imported DLLs inside PE32 and PE32+ executables without
//! moving a single byte: every replacement name must fit into the span of the name it
//! replaces and is NUL padded to that length. Afterwards the OS and subsystem version fields
//! of the optional header are lowered to 5.1, so the patched image loads on Windows XP once
//! the replacement libraries are placed next to it.
//!
//! ## Features
//!
//! - **Length-preserving renames** - No section, header or checksum is ever rebuilt
//! - **Dual-pass string search** - The import region first, the whole file as a fallback
//! - **Bounds-checked header access** - Damaged images produce errors, never panics
//! - **Per-rename reporting** - Every skipped rename is returned as an issue
//! - **Batch processing** - Optional parallel patching of many files via `rayon`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pepatch::prelude::*;
//!
//! let map = ReplacementMap::from_ini_file("progwrp.ini".as_ref())?;
//! let data = std::fs::read("app.exe")?;
//!
//! println!("architecture: {}", detect_architecture(&data)?);
//!
//! let patched = patch_image(&data, &map)?;
//! if patched.result.patched_any {
//!     let data = patch_version_fields(&patched.data)?;
//!     std::fs::write("app_patched.exe", data)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## File-level sessions
//!
//! [`PatchSession`] handles reading, output naming, the version patch and helper deployment
//! for one file; [`session::process_batch`] does the same for many.
//!
//! ```rust,no_run
//! use pepatch::{session::process_batch, BlobStore, ReplacementMap, SessionConfig};
//! use std::path::PathBuf;
//!
//! let map = ReplacementMap::from_ini_file("progwrp.ini".as_ref())?;
//! let config = SessionConfig { parallel: true, ..SessionConfig::default() };
//! let blobs = BlobStore::new("blobs");
//!
//! let files = vec![PathBuf::from("app.exe"), PathBuf::from("plugin.dll")];
//! for entry in process_batch(&files, &map, &config, Some(&blobs)) {
//!     match entry.outcome {
//!         Ok(outcome) => println!("{}: {:?}", entry.path.display(), outcome.state()),
//!         Err(error) => eprintln!("{}: {error}", entry.path.display()),
//!     }
//! }
//! # Ok::<(), pepatch::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Fatal conditions (not a PE image, unreadable import table, I/O failures) are returned as
//! [`Error`]. Conditions that only skip part of the work are collected in
//! [`PatchResult::issues`] and [`FileOutcome::issues`].

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and functions.
///
/// # Example
///
/// ```rust,no_run
/// use pepatch::prelude::*;
///
/// let file = PeFile::from_file("app.exe".as_ref())?;
/// println!("{}", file.architecture());
/// # Ok::<(), pepatch::Error>(())
/// ```
pub mod prelude;

/// Data sources and bounds-checked byte access.
pub mod file;

/// PE/COFF header, section table and import directory readers.
pub mod pe;

/// Import renaming, replacement maps and the version field patch.
pub mod patch;

/// Helper library deployment.
pub mod blobs;

/// Per-file orchestration and the batch driver.
pub mod session;

/// `pepatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `pepatch` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use pepatch::{patch_image, Error, ReplacementMap};
///
/// let data = std::fs::read("app.exe")?;
/// match patch_image(&data, &ReplacementMap::new()) {
///     Ok(patched) => println!("{} issues", patched.result.issues.len()),
///     Err(Error::MalformedImage { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// # Ok::<(), std::io::Error>(())
/// ```
pub use error::Error;

pub use blobs::{BlobDeployer, BlobStore};
pub use file::{image::RawImage, Backend, PeFile};
pub use patch::{
    patch_image, patch_raw_image, rewrite_imports,
    version::{patch_version_fields, VersionFields, VERSION_FLOOR},
    PatchResult, PatchedImage, Rename, ReplacementMap,
};
pub use pe::{
    header::{detect_architecture, Architecture, HeaderInfo, OptionalHeaderMagic},
    imports::{ImportEntry, SearchScope, SearchWindow},
};
pub use session::{BatchEntry, FileOutcome, PatchSession, SessionConfig, SessionState};
