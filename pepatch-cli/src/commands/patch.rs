use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::bail;
use log::{info, warn};
use pepatch::{
    session::{process_batch, BatchSummary},
    Architecture, BatchEntry, BlobDeployer, BlobStore, PeFile, ReplacementMap, SessionConfig,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::{
        common::{self, collect_images, file_display_name, load_map},
        fetch::Provisioner,
    },
    output::{print_output, write_report},
};

#[derive(Debug, Serialize)]
struct RenameReport {
    original: String,
    replacement: String,
    offset: usize,
    search: String,
}

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    output: Option<String>,
    architecture: Option<String>,
    state: Option<String>,
    renames: Vec<RenameReport>,
    imports_after_patch: Vec<String>,
    deployed: Vec<String>,
    issues: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SkippedFile {
    file: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct PatchReport {
    files: Vec<FileReport>,
    skipped: Vec<SkippedFile>,
    processed: usize,
    patched: usize,
    unchanged: usize,
    failed: usize,
}

pub struct PatchOptions<'a> {
    pub ini: &'a Path,
    pub repo: &'a str,
    pub recursive: bool,
    pub suffix: &'a str,
    pub output_dir: Option<&'a Path>,
    pub blobs_dir: Option<&'a Path>,
    pub offline: bool,
    pub no_deploy: bool,
    pub parallel: bool,
    pub report: Option<&'a Path>,
    pub global: &'a GlobalOptions,
}

impl PatchOptions<'_> {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            suffix: self.suffix.to_string(),
            output_dir: self.output_dir.map(Path::to_path_buf),
            parallel: self.parallel,
        }
    }
}

pub fn run(path: &Path, opts: &PatchOptions) -> anyhow::Result<()> {
    if !cfg!(windows) {
        info!("Patched files and their helper libraries must be copied to the Windows target to be used");
    }

    let map = load_map(opts.ini)?;
    let candidates = collect_images(path, opts.recursive)?;
    if candidates.is_empty() {
        bail!("no .exe or .dll files found in {}", path.display());
    }

    let mut skipped = Vec::new();
    let mut architectures = BTreeMap::new();
    for file in candidates {
        match select(&file, &map) {
            Ok(arch) => {
                architectures.insert(file, arch);
            }
            Err(reason) => {
                info!("Skipping {}: {}", file.display(), reason);
                skipped.push(SkippedFile {
                    file: file.display().to_string(),
                    reason,
                });
            }
        }
    }

    let store = BlobStore::new(common::blobs_dir(opts.blobs_dir)?);
    let deploy = !opts.no_deploy;
    if deploy && !opts.offline {
        let unavailable = provision(opts.repo, &store, &architectures);
        architectures.retain(|file, arch| {
            if !unavailable.contains(arch) {
                return true;
            }
            skipped.push(SkippedFile {
                file: file.display().to_string(),
                reason: format!("no helper libraries available for {arch}"),
            });
            false
        });
    }

    let paths: Vec<PathBuf> = architectures.into_keys().collect();
    let deployer: Option<&dyn BlobDeployer> = if deploy { Some(&store) } else { None };
    let entries = process_batch(&paths, &map, &opts.session_config(), deployer);

    let summary = BatchSummary::from_entries(&entries);
    let report = PatchReport {
        files: entries.iter().map(file_report).collect(),
        skipped,
        processed: summary.processed,
        patched: summary.patched,
        unchanged: summary.unchanged,
        failed: summary.failed,
    };

    if let Some(report_file) = opts.report {
        write_report(&report, report_file)?;
    }

    print_output(&report, opts.global, display_report)
}

/// Why `file` is not patched, or its architecture if it is.
fn select(file: &Path, map: &ReplacementMap) -> Result<Architecture, String> {
    if map.is_replacement_name(&file_display_name(file)) {
        return Err("helper library".to_string());
    }

    PeFile::from_file(file)
        .map(|image| image.architecture())
        .map_err(|error| format!("architecture detection failed: {error}"))
}

/// Provision every architecture once; returns the ones that could not be provisioned.
fn provision(
    repo: &str,
    store: &BlobStore,
    architectures: &BTreeMap<PathBuf, Architecture>,
) -> HashSet<Architecture> {
    let provisioner = Provisioner::new(repo, store.clone());
    let wanted: Vec<Architecture> = architectures
        .values()
        .copied()
        .fold(Vec::new(), |mut wanted, arch| {
            if !wanted.contains(&arch) {
                wanted.push(arch);
            }
            wanted
        });

    wanted
        .into_iter()
        .filter(|arch| match provisioner.ensure(*arch) {
            Ok(_) => false,
            Err(error) => {
                warn!("Error fetching {} blobs: {:#}", arch, error);
                true
            }
        })
        .collect()
}

fn file_report(entry: &BatchEntry) -> FileReport {
    let file = entry.path.display().to_string();
    match &entry.outcome {
        Ok(outcome) => FileReport {
            file,
            output: outcome.output.as_ref().map(|p| p.display().to_string()),
            architecture: Some(outcome.architecture.to_string()),
            state: outcome.state().map(|state| state.to_string()),
            renames: outcome
                .renames
                .iter()
                .map(|rename| RenameReport {
                    original: rename.original.clone(),
                    replacement: rename.replacement.clone(),
                    offset: rename.offset,
                    search: rename.pass.to_string(),
                })
                .collect(),
            imports_after_patch: outcome.imports_after_patch.clone(),
            deployed: outcome
                .deployed
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            issues: outcome.issues.iter().map(ToString::to_string).collect(),
            error: None,
        },
        Err(error) => FileReport {
            file,
            output: None,
            architecture: None,
            state: None,
            renames: Vec::new(),
            imports_after_patch: Vec::new(),
            deployed: Vec::new(),
            issues: Vec::new(),
            error: Some(error.to_string()),
        },
    }
}

fn display_report(report: &PatchReport) {
    for skipped in &report.skipped {
        println!("{}: skipped ({})", skipped.file, skipped.reason);
    }

    for file in &report.files {
        if let Some(error) = &file.error {
            println!("{}: failed: {}", file.file, error);
            continue;
        }

        match &file.output {
            Some(output) => println!(
                "{}: patched -> {} ({} renamed)",
                file.file,
                output,
                file.renames.len()
            ),
            None => println!("{}: no imports to patch", file.file),
        }
        for rename in &file.renames {
            println!(
                "  {} -> {} at 0x{:x} ({})",
                rename.original, rename.replacement, rename.offset, rename.search
            );
        }
        for issue in &file.issues {
            println!("  warning: {issue}");
        }
    }

    println!();
    println!(
        "Processed {} files: {} patched, {} unchanged, {} failed",
        report.processed, report.patched, report.unchanged, report.failed
    );
}
