//! Per-file patch orchestration and batch driver.
//!
//! A [`PatchSession`] takes one file through
//!
//! ```text
//! Loaded -> Parsed -> NoImportsMatched
//!                  -> RenamesSkipped
//!                  -> Patched -> VersionPatchAttempted -> Finalized
//! ```
//!
//! `Parsed` is reached before any byte is rewritten. The input file is only ever read. The
//! output is written to a new file next to the input (or into [`SessionConfig::output_dir`])
//! and only after at least one rename succeeded, so a file that fails to parse leaves nothing
//! behind. The version fields are patched on the
//! written output; a failure there is reported and does not undo the import patch.
//!
//! [`process_batch`] runs one session per file, optionally on the `rayon` thread pool.
//! A fatal error for one file never stops the batch. Inputs whose output path was already
//! claimed by an earlier input of the same batch fail with [`Error::OutputConflict`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use pepatch::{BlobStore, PatchSession, ReplacementMap, SessionConfig};
//! use std::path::Path;
//!
//! let map = ReplacementMap::from_ini_file(Path::new("progwrp.ini"))?;
//! let config = SessionConfig::default();
//! let blobs = BlobStore::new("blobs");
//!
//! let outcome = PatchSession::new("app.exe", &map, &config).run(Some(&blobs))?;
//! if let Some(output) = &outcome.output {
//!     println!("wrote {}", output.display());
//! }
//! # Ok::<(), pepatch::Error>(())
//! ```

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use rayon::prelude::*;
use strum::Display;

use crate::{
    blobs::BlobDeployer,
    file::{image::RawImage, Backend},
    patch::{
        rewrite_imports,
        version::{apply_version_floor, VersionFields},
        Rename, ReplacementMap,
    },
    pe::{
        header::{Architecture, HeaderInfo},
        imports::parse_imports,
    },
    Error, Result,
};

/// Default suffix inserted before the extension of output files.
pub const DEFAULT_SUFFIX: &str = "_patched";

/// Settings shared by every session of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Inserted between the file stem and the extension of the output name
    pub suffix: String,
    /// Directory for output files; `None` writes next to the input
    pub output_dir: Option<PathBuf>,
    /// Let [`process_batch`] patch files concurrently
    pub parallel: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            suffix: DEFAULT_SUFFIX.to_string(),
            output_dir: None,
            parallel: false,
        }
    }
}

/// Stages of a [`PatchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    /// The input bytes are in memory
    Loaded,
    /// Headers and import list decoded
    Parsed,
    /// No import is named in the replacement map; no output is written
    NoImportsMatched,
    /// Some imports are named in the replacement map but every rename was skipped;
    /// no output is written and the reasons are in [`FileOutcome::issues`]
    RenamesSkipped,
    /// At least one rename succeeded and the output file exists
    Patched,
    /// The version floor was applied to the output, successfully or not
    VersionPatchAttempted,
    /// Helper libraries were requested for the output
    Finalized,
}

/// Everything a session did to one file.
#[derive(Debug)]
pub struct FileOutcome {
    /// The input file
    pub input: PathBuf,
    /// The written output file, if any rename succeeded
    pub output: Option<PathBuf>,
    /// Target CPU of the input
    pub architecture: Architecture,
    /// States visited, in order
    pub states: Vec<SessionState>,
    /// Renames written to the output
    pub renames: Vec<Rename>,
    /// Lower-cased library names imported by the output
    pub imports_after_patch: Vec<String>,
    /// Version fields of the output before the floor was applied
    pub previous_versions: Option<VersionFields>,
    /// Helper libraries copied next to the output
    pub deployed: Vec<PathBuf>,
    /// Non-fatal conditions encountered along the way
    pub issues: Vec<Error>,
}

impl FileOutcome {
    fn new(input: PathBuf) -> Self {
        FileOutcome {
            input,
            output: None,
            architecture: Architecture::Unknown(0),
            states: Vec::new(),
            renames: Vec::new(),
            imports_after_patch: Vec::new(),
            previous_versions: None,
            deployed: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// The last state the session reached.
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        self.states.last().copied()
    }

    /// `true` if an output file was written.
    #[must_use]
    pub fn is_patched(&self) -> bool {
        self.output.is_some()
    }
}

/// Output file name for `input`: `<stem><suffix>.<ext>`, placed in `output_dir` or next to
/// the input.
#[must_use]
pub fn output_path(input: &Path, config: &SessionConfig) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = match input.extension() {
        Some(extension) => format!(
            "{stem}{}.{}",
            config.suffix,
            extension.to_string_lossy()
        ),
        None => format!("{stem}{}", config.suffix),
    };

    match &config.output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// `path` with its directory resolved, so differently spelled paths to one file compare
/// equal. The file itself does not need to exist; a missing directory leaves `path` as is.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(path) = fs::canonicalize(path) {
        return path;
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Apply the version floor to the image file at `path`, in place.
fn patch_version_file(path: &Path) -> Result<VersionFields> {
    let mut image = RawImage::from_file(path)?;
    let header = HeaderInfo::parse(image.data())?;
    let previous = apply_version_floor(image.data_mut(), &header)?;
    fs::write(path, image.data())?;

    Ok(previous)
}

/// Patches one file.
pub struct PatchSession<'a> {
    input: PathBuf,
    map: &'a ReplacementMap,
    config: &'a SessionConfig,
    outcome: FileOutcome,
}

impl<'a> PatchSession<'a> {
    /// Prepare a session for `input`. Nothing is read until [`PatchSession::run`].
    pub fn new(
        input: impl Into<PathBuf>,
        map: &'a ReplacementMap,
        config: &'a SessionConfig,
    ) -> Self {
        let input = input.into();
        PatchSession {
            outcome: FileOutcome::new(input.clone()),
            input,
            map,
            config,
        }
    }

    /// Where the output for this session's input goes.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        output_path(&self.input, self.config)
    }

    fn enter(&mut self, state: SessionState) {
        debug!("{}: {}", self.input.display(), state);
        self.outcome.states.push(state);
    }

    /// Run the session to completion.
    ///
    /// With a `deployer`, every distinct replacement library present in the output is
    /// copied next to it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the input cannot be read or the output cannot
    /// be written, and [`crate::Error::MalformedImage`] or
    /// [`crate::Error::ImportParseFailed`] if the input cannot be parsed. Everything else is
    /// reported in [`FileOutcome::issues`].
    pub fn run(mut self, deployer: Option<&dyn BlobDeployer>) -> Result<FileOutcome> {
        let mut image = RawImage::from_file(&self.input)?;
        self.enter(SessionState::Loaded);

        let header = HeaderInfo::parse(image.data())?;
        self.outcome.architecture = header.machine;
        let imports = parse_imports(image.data())?;
        self.enter(SessionState::Parsed);

        let mut result = rewrite_imports(&mut image, &header, &imports, self.map);
        self.outcome.issues.append(&mut result.issues);
        self.outcome.imports_after_patch = std::mem::take(&mut result.imports_after_patch);

        if !result.patched_any {
            if imports.iter().any(|import| self.map.get(&import.name).is_some()) {
                warn!("Every rename in {} was skipped", self.input.display());
                self.enter(SessionState::RenamesSkipped);
            } else {
                info!("No imports to patch in {}", self.input.display());
                self.enter(SessionState::NoImportsMatched);
            }
            return Ok(self.outcome);
        }

        let output = self.output_path();
        if let Some(dir) = &self.config.output_dir {
            fs::create_dir_all(dir)?;
        }
        if resolved(&output) == resolved(&self.input) {
            return Err(Error::FileError(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("refusing to overwrite input {}", self.input.display()),
            )));
        }
        fs::write(&output, image.data())?;
        drop(image);

        info!(
            "Successfully patched {} -> {}",
            self.input.display(),
            output.display()
        );
        let deployed_names = result.deployed_names();
        self.outcome.renames = result.renames;
        self.outcome.output = Some(output.clone());
        self.enter(SessionState::Patched);

        match patch_version_file(&output) {
            Ok(previous) => {
                info!("Patched subsystem/OS version of {} to 5.1", output.display());
                self.outcome.previous_versions = Some(previous);
            }
            Err(error) => {
                warn!("Failed to patch version fields of {}: {}", output.display(), error);
                self.outcome.issues.push(error);
            }
        }
        self.enter(SessionState::VersionPatchAttempted);

        if let Some(deployer) = deployer {
            let target_dir = output
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();

            for library in &deployed_names {
                match deployer.deploy(self.outcome.architecture, library, &target_dir) {
                    Ok(path) => self.outcome.deployed.push(path),
                    Err(error) => {
                        warn!(
                            "Failed to deploy {} for {}: {}",
                            library, self.outcome.architecture, error
                        );
                        self.outcome.issues.push(error);
                    }
                }
            }
        }
        self.enter(SessionState::Finalized);

        Ok(self.outcome)
    }
}

/// Result of one file in a batch.
#[derive(Debug)]
pub struct BatchEntry {
    /// The input file
    pub path: PathBuf,
    /// The session outcome, or the error that aborted it
    pub outcome: Result<FileOutcome>,
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Files attempted
    pub processed: usize,
    /// Files with an output written
    pub patched: usize,
    /// Files parsed but left without output
    pub unchanged: usize,
    /// Files aborted by a fatal error
    pub failed: usize,
}

impl BatchSummary {
    /// Tally a finished batch.
    #[must_use]
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        entries
            .iter()
            .fold(BatchSummary::default(), |mut summary, entry| {
                summary.processed += 1;
                match &entry.outcome {
                    Ok(outcome) if outcome.is_patched() => summary.patched += 1,
                    Ok(_) => summary.unchanged += 1,
                    Err(_) => summary.failed += 1,
                }
                summary
            })
    }
}

/// Patch every file in `paths`.
///
/// Runs the sessions on the `rayon` pool when [`SessionConfig::parallel`] is set. The
/// returned entries are in the same order as `paths` either way. An input whose output path
/// (after resolving its directory) equals that of an earlier input is not processed and
/// gets [`Error::OutputConflict`].
pub fn process_batch(
    paths: &[PathBuf],
    map: &ReplacementMap,
    config: &SessionConfig,
    deployer: Option<&dyn BlobDeployer>,
) -> Vec<BatchEntry> {
    // Claim output paths up front so sessions never race on one file
    let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let jobs: Vec<(&PathBuf, Option<Error>)> = paths
        .iter()
        .map(|path| {
            let output = resolved(&output_path(path, config));
            let conflict = claimed.get(&output).map(|first| Error::OutputConflict {
                output: output.clone(),
                first: (*first).clone(),
            });
            claimed.entry(output).or_insert(path);
            (path, conflict)
        })
        .collect();

    let run_one = |job: (&PathBuf, Option<Error>)| {
        let (path, conflict) = job;
        let outcome = match conflict {
            Some(conflict) => Err(conflict),
            None => PatchSession::new(path.clone(), map, config).run(deployer),
        };
        if let Err(error) = &outcome {
            warn!("Failed to patch {}: {}", path.display(), error);
        }

        BatchEntry {
            path: path.clone(),
            outcome,
        }
    };

    if config.parallel {
        jobs.into_par_iter().map(run_one).collect()
    } else {
        jobs.into_iter().map(run_one).collect()
    }
}
