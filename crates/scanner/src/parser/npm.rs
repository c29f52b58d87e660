//! npm 계열 매니페스트 파서 -- package.json, package-lock.json, yarn.lock
//!
//! # package-lock.json v3 형식 예시
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "lockfileVersion": 3,
//!   "packages": {
//!     "": { "name": "my-app", "version": "1.0.0" },
//!     "node_modules/lodash": { "version": "4.17.21", "resolved": "...", "integrity": "sha512-..." }
//!   }
//! }
//! ```
//!
//! v1 lockfile은 `packages` 대신 중첩된 `dependencies` 맵을 사용합니다.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser, strip_range_prefix};

/// `package.json` 파서 (`dependencies` + `devDependencies`)
pub struct PackageJsonParser;

/// `package-lock.json` 파서 (v1 ~ v3)
pub struct PackageLockParser;

/// `yarn.lock` 파서 (classic v1, berry)
pub struct YarnLockParser;

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

impl ManifestParser for PackageJsonParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::PackageJson
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let manifest: PackageJson = serde_json::from_str(content)
            .map_err(|e| ParseError::malformed("package.json", e.to_string()))?;

        let mut records = Vec::new();
        for (name, spec) in manifest
            .dependencies
            .iter()
            .chain(manifest.dev_dependencies.iter())
        {
            let Some(spec) = spec.as_str() else {
                return Err(ParseError::malformed(
                    "package.json",
                    format!("version of '{name}' must be a string"),
                ));
            };
            records.push(DependencyRecord::new(
                name.trim(),
                strip_range_prefix(spec),
                Ecosystem::Npm,
            ));
        }
        Ok(records)
    }
}

#[derive(Deserialize)]
struct PackageLock {
    #[serde(default)]
    packages: Option<BTreeMap<String, LockPackage>>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, LockDependencyV1>>,
}

#[derive(Deserialize)]
struct LockPackage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    link: bool,
}

#[derive(Deserialize)]
struct LockDependencyV1 {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, LockDependencyV1>>,
}

impl ManifestParser for PackageLockParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::PackageLock
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let lock: PackageLock = serde_json::from_str(content)
            .map_err(|e| ParseError::malformed("package-lock.json", e.to_string()))?;

        let mut records = Vec::new();
        if let Some(packages) = lock.packages {
            for (key, entry) in packages {
                // 루트 패키지는 키가 빈 문자열
                if key.is_empty() || entry.link {
                    continue;
                }
                let Some(version) = entry.version else {
                    debug!(key = %key, "lock entry without version, skipping");
                    continue;
                };
                let name = entry.name.unwrap_or_else(|| extract_package_name(&key));
                records.push(DependencyRecord::new(name, version, Ecosystem::Npm));
            }
        } else if let Some(dependencies) = lock.dependencies {
            collect_v1(&dependencies, &mut records);
        } else {
            return Err(ParseError::malformed(
                "package-lock.json",
                "neither 'packages' nor 'dependencies' present",
            ));
        }
        Ok(records)
    }
}

fn collect_v1(deps: &BTreeMap<String, LockDependencyV1>, out: &mut Vec<DependencyRecord>) {
    for (name, dep) in deps {
        if let Some(version) = &dep.version {
            out.push(DependencyRecord::new(name, version, Ecosystem::Npm));
        }
        if let Some(nested) = &dep.dependencies {
            collect_v1(nested, out);
        }
    }
}

/// "node_modules/@scope/name" 또는 "a/node_modules/name" 에서 패키지명 추출
fn extract_package_name(key: &str) -> String {
    match key.rfind("node_modules/") {
        Some(pos) => key[pos + "node_modules/".len()..].to_owned(),
        None => key.to_owned(),
    }
}

impl ManifestParser for YarnLockParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::YarnLock
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let mut records = Vec::new();
        let mut current: Option<String> = None;

        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }

            if !line.starts_with(' ') {
                let header = line.trim_end();
                let Some(header) = header.strip_suffix(':') else {
                    return Err(ParseError::malformed(
                        "yarn.lock",
                        format!("line {}: expected entry header", lineno + 1),
                    ));
                };
                current = yarn_entry_name(header);
                continue;
            }

            let Some(name) = &current else { continue };
            let field = line.trim();
            let version = field
                .strip_prefix("version ")
                .or_else(|| field.strip_prefix("version: "));
            if let Some(version) = version {
                let version = version.trim().trim_matches('"');
                records.push(DependencyRecord::new(name.as_str(), version, Ecosystem::Npm));
                current = None;
            }
        }
        Ok(records)
    }
}

/// `"@babel/core@^7.0.0", "@babel/core@^7.1.0"` -> `@babel/core`
///
/// berry의 `__metadata` 블록과 이름을 추출할 수 없는 헤더는 `None`입니다.
fn yarn_entry_name(header: &str) -> Option<String> {
    let first = header.split(',').next()?.trim().trim_matches('"');
    if first == "__metadata" {
        return None;
    }
    // scoped 패키지는 맨 앞 '@'를 건너뛰고 구분자를 찾는다
    let (at, _) = first.char_indices().skip(1).find(|(_, c)| *c == '@')?;
    let name = &first[..at];
    if name.is_empty() { None } else { Some(name.to_owned()) }
}
