use std::path::{Path, PathBuf};

use anyhow::Context;
use pepatch::ReplacementMap;

/// Load the replacement map from an INI file.
pub fn load_map(ini: &Path) -> anyhow::Result<ReplacementMap> {
    let map = ReplacementMap::from_ini_file(ini)
        .with_context(|| format!("failed to load replacement map: {}", ini.display()))?;
    log::debug!("Loaded {} mappings from {}", map.len(), ini.display());
    Ok(map)
}

/// Collect `.exe` and `.dll` files from `path`.
///
/// A file is returned as-is when it has a PE extension. A directory is scanned, descending
/// into sub-directories only when `recursive` is set.
pub fn collect_images(path: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(if is_image_file(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    collect_images_in(path, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_images_in(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_images_in(&path, recursive, files)?;
            }
        } else if is_image_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Returns true if the path has an `.exe` or `.dll` extension, in any case.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exe") || e.eq_ignore_ascii_case("dll"))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

/// The helper library store: `blobs_dir` if given, else `blobs/` next to the executable.
pub fn blobs_dir(blobs_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = blobs_dir {
        return Ok(dir.to_path_buf());
    }

    let exe = std::env::current_exe().context("failed to locate the pepatch executable")?;
    Ok(exe
        .parent()
        .map_or_else(|| PathBuf::from("blobs"), |dir| dir.join("blobs")))
}
