//! Cargo `Cargo.lock` 파서
//!
//! `[[package]]` 항목 중 `source`가 있는 것(레지스트리/git 의존성)만 수집합니다.
//! `source`가 없는 항목은 워크스페이스 자신의 크레이트입니다.

use serde::Deserialize;

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser};

/// `Cargo.lock` 파서
pub struct CargoLockParser;

#[derive(Deserialize)]
struct CargoLock {
    #[serde(default, rename = "package")]
    packages: Vec<LockedPackage>,
}

#[derive(Deserialize)]
struct LockedPackage {
    name: String,
    version: String,
    #[serde(default)]
    source: Option<String>,
}

impl ManifestParser for CargoLockParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::CargoLock
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Crates
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let lock: CargoLock = toml::from_str(content)
            .map_err(|e| ParseError::malformed("Cargo.lock", e.message().to_owned()))?;

        Ok(lock
            .packages
            .into_iter()
            .filter(|p| p.source.is_some())
            .map(|p| DependencyRecord::new(p.name, p.version, Ecosystem::Crates))
            .collect())
    }
}
