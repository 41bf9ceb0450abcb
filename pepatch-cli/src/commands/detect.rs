use std::path::{Path, PathBuf};

use anyhow::Context;
use pepatch::{patch::version::read_version_fields, PeFile};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::file_display_name,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct DetectInfo {
    file: String,
    architecture: String,
    machine: u16,
    optional_header: String,
    os_version: Option<String>,
    subsystem_version: Option<String>,
}

pub fn run(paths: &[PathBuf], opts: &GlobalOptions) -> anyhow::Result<()> {
    let infos = paths
        .iter()
        .map(|path| detect_file(path))
        .collect::<anyhow::Result<Vec<_>>>()?;

    print_output(&infos, opts, |infos| {
        let mut table = TabWriter::new(&[
            ("FILE", Align::Left),
            ("ARCH", Align::Left),
            ("MACHINE", Align::Right),
            ("HEADER", Align::Left),
            ("OS", Align::Right),
            ("SUBSYSTEM", Align::Right),
        ]);
        for info in infos {
            table.row(vec![
                info.file.clone(),
                info.architecture.clone(),
                format!("0x{:04x}", info.machine),
                info.optional_header.clone(),
                info.os_version.clone().unwrap_or_else(|| "-".to_string()),
                info.subsystem_version
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        table.print();
    })
}

fn detect_file(path: &Path) -> anyhow::Result<DetectInfo> {
    let image = PeFile::from_file(path)
        .with_context(|| format!("failed to load PE image: {}", path.display()))?;
    let header = image.header();

    // Only PE32 and PE32+ have the version fields
    let versions = read_version_fields(image.data(), header).ok();

    Ok(DetectInfo {
        file: file_display_name(path),
        architecture: header.machine.to_string(),
        machine: header.machine.machine(),
        optional_header: header.optional_header_magic.to_string(),
        os_version: versions.map(|v| format!("{}.{}", v.major_os, v.minor_os)),
        subsystem_version: versions
            .map(|v| format!("{}.{}", v.major_subsystem, v.minor_subsystem)),
    })
}
