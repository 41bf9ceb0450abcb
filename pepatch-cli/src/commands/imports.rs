use std::path::Path;

use anyhow::Context;
use pepatch::{PeFile, ReplacementMap};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_map},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct LibraryInfo {
    name: String,
    functions: usize,
    name_offset: Option<usize>,
    replacement: Option<String>,
    fits: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ImportsInfo {
    file: String,
    architecture: String,
    libraries: Vec<LibraryInfo>,
}

pub fn run(path: &Path, ini: Option<&Path>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let map = ini.map(load_map).transpose()?;
    let image = PeFile::from_file(path)
        .with_context(|| format!("failed to load PE image: {}", path.display()))?;
    let imports = image
        .imports()
        .with_context(|| format!("failed to parse imports: {}", path.display()))?;

    let info = ImportsInfo {
        file: file_display_name(path),
        architecture: image.architecture().to_string(),
        libraries: imports
            .into_iter()
            .map(|entry| {
                let replacement = map
                    .as_ref()
                    .and_then(|map| map.get(&entry.name))
                    .map(str::to_string);
                LibraryInfo {
                    fits: replacement.as_deref().map(|r| fits(&entry.name, r)),
                    functions: entry.functions.len(),
                    name_offset: entry.name_offset.map(|range| range.start),
                    name: entry.name,
                    replacement,
                }
            })
            .collect(),
    };

    print_output(&info, opts, |info| display_imports(info, map.as_ref()))
}

/// A replacement fits if it is no longer than the name it overwrites.
fn fits(original: &str, replacement: &str) -> bool {
    replacement.len() <= original.len()
}

fn display_imports(info: &ImportsInfo, map: Option<&ReplacementMap>) {
    println!("{} ({})", info.file, info.architecture);
    if info.libraries.is_empty() {
        println!("  no imports");
        return;
    }

    let mut columns = vec![
        ("LIBRARY", Align::Left),
        ("FUNCTIONS", Align::Right),
        ("OFFSET", Align::Right),
    ];
    if map.is_some() {
        columns.push(("REPLACEMENT", Align::Left));
        columns.push(("FITS", Align::Left));
    }

    let mut table = TabWriter::new(&columns).indent("  ");
    for library in &info.libraries {
        let mut row = vec![
            library.name.clone(),
            library.functions.to_string(),
            library
                .name_offset
                .map_or_else(|| "-".to_string(), |offset| format!("0x{offset:x}")),
        ];
        if map.is_some() {
            row.push(library.replacement.clone().unwrap_or_else(|| "-".to_string()));
            row.push(match library.fits {
                Some(true) => "yes".to_string(),
                Some(false) => "too long".to_string(),
                None => "-".to_string(),
            });
        }
        table.row(row);
    }
    table.print();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_fit() {
        assert!(fits("kernel32.dll", "progwrp.dll"));
        assert!(fits("user32.dll", "shim32.dll"));
        assert!(!fits("ws2_32.dll", "progwrp.dll"));
    }
}
