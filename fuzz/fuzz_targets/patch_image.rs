#![no_main]

use libfuzzer_sys::fuzz_target;
use pepatch::{patch_image, patch_version_fields, PeFile, ReplacementMap};

fuzz_target!(|data: &[u8]| {
    let map: ReplacementMap = [("kernel32.dll", "progwrp.dll"), ("user32.dll", "shim32.dll")]
        .into_iter()
        .collect();

    let _ = patch_image(data, &map);
    let _ = patch_version_fields(data);
    if let Ok(file) = PeFile::from_mem(data.to_vec()) {
        let _ = file.imports();
        let _ = file.search_window();
    }
});
