//! Helper library deployment.
//!
//! A patched image imports replacement libraries that do not exist on the target system, so
//! each output directory needs a copy of them. Helper libraries are kept in a local store
//! with one sub-directory per architecture:
//!
//! ```text
//! blobs/
//! ├── x86/
//! │   └── progwrp.dll
//! └── x86_64/
//!     └── progwrp.dll
//! ```
//!
//! How the store gets populated is up to the caller; the `pepatch` command line tool
//! downloads release archives into it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use crate::{pe::header::Architecture, Error::BlobMissing, Result};

/// Copies helper libraries next to a patched image.
///
/// Implementations must be shareable across the worker threads of a parallel batch.
pub trait BlobDeployer: Send + Sync {
    /// Copy `library` for `arch` into `target_dir` and return the path of the copy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlobMissing`] if no helper with that name exists for
    /// `arch`, or [`crate::Error::FileError`] if the copy fails.
    fn deploy(&self, arch: Architecture, library: &str, target_dir: &Path) -> Result<PathBuf>;
}

/// A directory of helper libraries, one sub-directory per architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// A store rooted at `root`. The directory does not need to exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BlobStore { root: root.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the helpers for `arch`.
    #[must_use]
    pub fn arch_dir(&self, arch: Architecture) -> PathBuf {
        self.root.join(arch.to_string())
    }

    /// `true` if helpers for `arch` have been provisioned.
    #[must_use]
    pub fn has_architecture(&self, arch: Architecture) -> bool {
        self.arch_dir(arch).is_dir()
    }

    /// Path of the helper named `library` for `arch`.
    ///
    /// The exact name is tried first, then a case-insensitive match, since import names
    /// are compared case-insensitively on Windows but the store may live on a
    /// case-sensitive file system.
    #[must_use]
    pub fn find(&self, arch: Architecture, library: &str) -> Option<PathBuf> {
        let dir = self.arch_dir(arch);
        let exact = dir.join(library);
        if exact.is_file() {
            return Some(exact);
        }

        fs::read_dir(&dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.eq_ignore_ascii_case(library))
            })
    }
}

impl BlobDeployer for BlobStore {
    fn deploy(&self, arch: Architecture, library: &str, target_dir: &Path) -> Result<PathBuf> {
        let Some(source) = self.find(arch, library) else {
            return Err(BlobMissing(self.arch_dir(arch).join(library)));
        };

        let target = target_dir.join(library);
        fs::copy(&source, &target)?;
        info!("Deployed {} ({}) to {}", library, arch, target_dir.display());

        Ok(target)
    }
}
