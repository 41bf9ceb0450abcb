//! Shared fixtures for the integration tests.

#![allow(dead_code)]

#[path = "../../src/test/image.rs"]
mod image;

pub use image::*;

use std::{fs, path::Path};

use pepatch::{Architecture, BlobStore, ReplacementMap};

pub const PROGWRP_INI: &str = "\
; libraries redirected to the XP helpers
[KERNEL32.dll]
ReplacementName=progwrp.dll

[user32.dll]
replacementname = shim32.dll

[ws2_32.dll]
ReplacementName=progwrp_ws.dll
";

/// Replacement map loaded through the INI reader.
pub fn progwrp_map(dir: &Path) -> ReplacementMap {
    let ini = dir.join("progwrp.ini");
    fs::write(&ini, PROGWRP_INI).unwrap();
    ReplacementMap::from_ini_file(&ini).unwrap()
}

/// A store holding `progwrp.dll` and `shim32.dll` for both architectures.
pub fn helper_store(dir: &Path) -> BlobStore {
    let store = BlobStore::new(dir);
    for arch in [Architecture::X86, Architecture::X86_64] {
        let arch_dir = store.arch_dir(arch);
        fs::create_dir_all(&arch_dir).unwrap();
        for helper in ["progwrp.dll", "shim32.dll"] {
            fs::write(arch_dir.join(helper), format!("{arch} {helper}")).unwrap();
        }
    }
    store
}
