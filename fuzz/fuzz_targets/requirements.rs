#![no_main]

use libfuzzer_sys::fuzz_target;
use vulnwatch_scanner::{ManifestFormat, parse_manifest};

fuzz_target!(|data: &[u8]| {
    let _ = parse_manifest(data, ManifestFormat::Requirements);
});
