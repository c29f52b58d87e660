//! Composer `composer.json` / `composer.lock` 파서
//!
//! 플랫폼 요구사항(`php`, `ext-*`, `lib-*`, `composer-*`)은 패키지가 아니므로 건너뜁니다.

use std::collections::BTreeMap;

use serde::Deserialize;

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser, strip_range_prefix};

/// `composer.json` 파서 (`require` + `require-dev`)
pub struct ComposerJsonParser;

/// `composer.lock` 파서 (`packages` + `packages-dev`)
pub struct ComposerLockParser;

#[derive(Deserialize)]
struct ComposerJson {
    #[serde(default)]
    require: BTreeMap<String, String>,
    #[serde(default, rename = "require-dev")]
    require_dev: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ComposerLock {
    packages: Vec<LockedPackage>,
    #[serde(default, rename = "packages-dev")]
    packages_dev: Vec<LockedPackage>,
}

#[derive(Deserialize)]
struct LockedPackage {
    name: String,
    version: String,
}

fn is_platform_package(name: &str) -> bool {
    name == "php"
        || name.starts_with("php-")
        || name.starts_with("ext-")
        || name.starts_with("lib-")
        || name.starts_with("composer-")
        || !name.contains('/')
}

impl ManifestParser for ComposerJsonParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::ComposerJson
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Packagist
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let manifest: ComposerJson = serde_json::from_str(content)
            .map_err(|e| ParseError::malformed("composer.json", e.to_string()))?;

        Ok(manifest
            .require
            .iter()
            .chain(manifest.require_dev.iter())
            .filter(|(name, _)| !is_platform_package(name))
            .map(|(name, constraint)| {
                // "^5.4 || ^6.0" 같은 OR 제약은 첫 번째 대안을 기준으로 삼는다
                let first = constraint.split("||").next().unwrap_or(constraint);
                DependencyRecord::new(
                    name.to_lowercase(),
                    strip_range_prefix(first),
                    Ecosystem::Packagist,
                )
            })
            .collect())
    }
}

impl ManifestParser for ComposerLockParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::ComposerLock
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Packagist
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let lock: ComposerLock = serde_json::from_str(content)
            .map_err(|e| ParseError::malformed("composer.lock", e.to_string()))?;

        Ok(lock
            .packages
            .into_iter()
            .chain(lock.packages_dev)
            .map(|p| {
                let version = p
                    .version
                    .strip_prefix('v')
                    .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
                    .map(str::to_owned)
                    .unwrap_or(p.version);
                DependencyRecord::new(p.name.to_lowercase(), version, Ecosystem::Packagist)
            })
            .collect())
    }
}
