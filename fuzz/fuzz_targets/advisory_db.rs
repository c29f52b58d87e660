#![no_main]

use libfuzzer_sys::fuzz_target;
use vulnwatch_core::types::{DependencyRecord, Ecosystem};
use vulnwatch_scanner::LocalDbSource;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(db) = LocalDbSource::from_json("fuzz", json) {
        // 버전 비교가 임의 범위 문자열에서 패닉하지 않아야 한다
        for version in ["0.0.1", "1.2.3", "2.0.0-rc.1", "not-a-version", ""] {
            let _ = db.lookup(&DependencyRecord::new("lodash", version, Ecosystem::Npm));
        }
    }
});
