use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use log::{debug, info};
use pepatch::{Architecture, BlobStore};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use zip::ZipArchive;

use crate::{
    app::{ArchArg, GlobalOptions},
    commands::common::{self, file_display_name},
    output::print_output,
};

#[derive(Debug, Serialize)]
struct FetchInfo {
    architecture: String,
    directory: String,
    downloaded: bool,
    files: Vec<String>,
}

/// Release asset holding the helper libraries for `arch`.
pub fn release_url(repo: &str, arch: Architecture) -> String {
    format!("https://github.com/{repo}/releases/latest/download/progwrp_blobs-{arch}.zip")
}

/// Makes sure a [`BlobStore`] holds the helper libraries for an architecture, downloading the
/// release archive when it does not.
pub struct Provisioner {
    http_client: HttpClient,
    repo: String,
    store: BlobStore,
}

impl Provisioner {
    pub fn new<S: Into<String>>(repo: S, store: BlobStore) -> Self {
        Self {
            http_client: HttpClient::new(),
            repo: repo.into(),
            store,
        }
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Returns `true` if an archive was downloaded, `false` if the store already had `arch`.
    pub fn ensure(&self, arch: Architecture) -> anyhow::Result<bool> {
        if self.store.has_architecture(arch) {
            debug!(
                "Blobs for {} already present in {}",
                arch,
                self.store.arch_dir(arch).display()
            );
            return Ok(false);
        }
        if !arch.is_known() {
            bail!("no helper libraries are published for {arch}");
        }

        info!("Fetching {} blobs from GitHub ({})", arch, self.repo);
        let url = release_url(&self.repo, arch);
        let response = self
            .http_client
            .get(&url)
            .send()
            .with_context(|| format!("failed to download {url}"))?;

        if !response.status().is_success() {
            bail!(
                "failed to download blobs for {}: {}",
                arch,
                response.status()
            );
        }

        let archive = response
            .bytes()
            .with_context(|| format!("failed to read {url}"))?;

        let target = self.store.arch_dir(arch);
        match extract_archive(&archive, &target) {
            Ok(count) => {
                info!("Extracted {} files to {}", count, target.display());
                Ok(true)
            }
            Err(error) => {
                // A half-extracted directory would count as provisioned next time
                let _ = fs::remove_dir_all(&target);
                Err(error)
            }
        }
    }
}

/// Unpack a zip archive held in memory into `target`, returning the number of entries.
pub fn extract_archive(archive: &[u8], target: &Path) -> anyhow::Result<usize> {
    let mut archive =
        ZipArchive::new(Cursor::new(archive)).context("blob archive is not a valid zip file")?;

    fs::create_dir_all(target)
        .with_context(|| format!("failed to create directory: {}", target.display()))?;
    archive
        .extract(target)
        .with_context(|| format!("failed to extract blobs to {}", target.display()))?;

    Ok(archive.len())
}

pub fn run(
    arch: ArchArg,
    repo: &str,
    blobs_dir: Option<&Path>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let arch = Architecture::from(arch);
    let provisioner = Provisioner::new(repo, BlobStore::new(common::blobs_dir(blobs_dir)?));
    let downloaded = provisioner.ensure(arch)?;

    let directory = provisioner.store().arch_dir(arch);
    let info = FetchInfo {
        architecture: arch.to_string(),
        directory: directory.display().to_string(),
        downloaded,
        files: list_files(&directory)?,
    };

    print_output(&info, opts, |info| {
        if info.downloaded {
            println!("Fetched {} blobs into {}", info.architecture, info.directory);
        } else {
            println!(
                "{} blobs already present in {}",
                info.architecture, info.directory
            );
        }
        for file in &info.files {
            println!("  {file}");
        }
    })
}

fn list_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    Ok(files.iter().map(|path| file_display_name(path)).collect())
}
