#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vulnwatch_scanner::{ManifestFormat, parse_manifest};

#[derive(Debug, Arbitrary)]
struct Upload<'a> {
    file_name: &'a str,
    hint: Option<&'a str>,
    body: &'a [u8],
}

fuzz_target!(|upload: Upload<'_>| {
    if let Ok(format) = ManifestFormat::detect(upload.file_name, upload.hint) {
        if let Ok(records) = parse_manifest(upload.body, format) {
            // 중복 제거 후에는 (name, ecosystem)이 유일해야 한다
            let mut keys: Vec<_> = records.iter().map(|r| (&r.name, r.ecosystem)).collect();
            let before = keys.len();
            keys.sort();
            keys.dedup();
            assert_eq!(before, keys.len());
        }
    }
});
