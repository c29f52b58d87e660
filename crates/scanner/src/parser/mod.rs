//! 매니페스트 파서 -- package.json, requirements.txt, pom.xml, go.mod 등
//!
//! [`ManifestFormat`]은 지원 형식의 닫힌 집합이며, 각 변형은 상태 없는 파서 하나를
//! [`ManifestParser`] 인터페이스로 노출합니다. 파싱은 I/O 없는 순수 함수입니다.
//!
//! # 지원 형식
//!
//! | 형식 | 파일 | 에코시스템 |
//! |---|---|---|
//! | `PackageJson` / `PackageLock` / `YarnLock` | `package.json`, `package-lock.json`, `yarn.lock` | npm |
//! | `Requirements` | `requirements.txt` | PyPI |
//! | `Pom` | `pom.xml` | Maven |
//! | `CargoLock` | `Cargo.lock` | crates.io |
//! | `GoMod` | `go.mod` | Go |
//! | `ComposerJson` / `ComposerLock` | `composer.json`, `composer.lock` | Packagist |
//! | `Gemfile` | `Gemfile` | RubyGems |
//!
//! # 중복 제거
//!
//! 결과는 (name, ecosystem) 기준으로 중복 제거되며, 같은 이름이 여러 번 나오면
//! 마지막 항목의 버전이 이기고 순서는 처음 등장한 위치를 따릅니다.

pub mod cargo;
pub mod composer;
pub mod go;
pub mod maven;
pub mod npm;
pub mod python;
pub mod ruby;

use std::collections::HashMap;
use std::fmt;

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;

/// 매니페스트 파서 인터페이스
pub trait ManifestParser: Send + Sync {
    /// 담당 형식
    fn format(&self) -> ManifestFormat;

    /// 결과 레코드의 에코시스템
    fn ecosystem(&self) -> Ecosystem;

    /// 매니페스트 텍스트에서 (name, version) 레코드를 추출합니다.
    ///
    /// 중복 제거 전의 원시 순서를 반환합니다.
    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError>;
}

/// 지원 매니페스트 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestFormat {
    /// npm `package.json`
    PackageJson,
    /// npm `package-lock.json` (v1 ~ v3)
    PackageLock,
    /// Yarn classic/berry `yarn.lock`
    YarnLock,
    /// pip `requirements.txt`
    Requirements,
    /// Maven `pom.xml`
    Pom,
    /// Cargo `Cargo.lock`
    CargoLock,
    /// Go `go.mod`
    GoMod,
    /// Composer `composer.json`
    ComposerJson,
    /// Composer `composer.lock`
    ComposerLock,
    /// Bundler `Gemfile`
    Gemfile,
}

impl ManifestFormat {
    /// 모든 형식
    pub const ALL: [ManifestFormat; 10] = [
        Self::PackageJson,
        Self::PackageLock,
        Self::YarnLock,
        Self::Requirements,
        Self::Pom,
        Self::CargoLock,
        Self::GoMod,
        Self::ComposerJson,
        Self::ComposerLock,
        Self::Gemfile,
    ];

    /// 정규 파일 이름 (형식 식별자로도 사용)
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::PackageJson => "package.json",
            Self::PackageLock => "package-lock.json",
            Self::YarnLock => "yarn.lock",
            Self::Requirements => "requirements.txt",
            Self::Pom => "pom.xml",
            Self::CargoLock => "Cargo.lock",
            Self::GoMod => "go.mod",
            Self::ComposerJson => "composer.json",
            Self::ComposerLock => "composer.lock",
            Self::Gemfile => "Gemfile",
        }
    }

    /// 파일 이름으로 형식을 판별합니다.
    ///
    /// 경로가 포함되어 있으면 마지막 구성요소만 봅니다.
    /// `requirements-dev.txt`처럼 `requirements`로 시작하는 `.txt`도 인식합니다.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
        if let Some(format) = Self::ALL.iter().find(|f| f.file_name() == base) {
            return Some(*format);
        }
        let lower = base.to_lowercase();
        if lower.starts_with("requirements") && lower.ends_with(".txt") {
            return Some(Self::Requirements);
        }
        None
    }

    /// 명시적 형식 힌트를 해석합니다 (파일 이름 또는 짧은 별칭).
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim();
        if let Some(format) = Self::from_file_name(hint) {
            return Some(format);
        }
        match hint.to_lowercase().as_str() {
            "npm" | "package-json" => Some(Self::PackageJson),
            "npm-lock" | "package-lock" => Some(Self::PackageLock),
            "yarn" | "yarn-lock" => Some(Self::YarnLock),
            "pip" | "requirements" | "pypi" => Some(Self::Requirements),
            "maven" | "pom" => Some(Self::Pom),
            "cargo" | "cargo-lock" => Some(Self::CargoLock),
            "go" | "gomod" | "go-mod" => Some(Self::GoMod),
            "composer" | "composer-json" => Some(Self::ComposerJson),
            "composer-lock" => Some(Self::ComposerLock),
            "gemfile" | "bundler" => Some(Self::Gemfile),
            _ => None,
        }
    }

    /// 힌트가 있으면 힌트를, 없으면 파일 이름을 기준으로 형식을 결정합니다.
    pub fn detect(file_name: &str, hint: Option<&str>) -> Result<Self, ParseError> {
        match hint.filter(|h| !h.trim().is_empty()) {
            Some(h) => Self::from_hint(h).ok_or_else(|| ParseError::UnsupportedFormat(h.to_owned())),
            None => Self::from_file_name(file_name)
                .ok_or_else(|| ParseError::UnsupportedFormat(file_name.to_owned())),
        }
    }

    /// 이 형식의 파서
    pub fn parser(&self) -> &'static dyn ManifestParser {
        match self {
            Self::PackageJson => &npm::PackageJsonParser,
            Self::PackageLock => &npm::PackageLockParser,
            Self::YarnLock => &npm::YarnLockParser,
            Self::Requirements => &python::RequirementsParser,
            Self::Pom => &maven::PomParser,
            Self::CargoLock => &cargo::CargoLockParser,
            Self::GoMod => &go::GoModParser,
            Self::ComposerJson => &composer::ComposerJsonParser,
            Self::ComposerLock => &composer::ComposerLockParser,
            Self::Gemfile => &ruby::GemfileParser,
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// 원시 바이트 매니페스트를 파싱하고 중복 제거합니다.
///
/// UTF-8이 아니면 `InvalidEncoding`, 의존성이 없으면 `Empty`를 반환합니다.
/// 부분 결과를 조용히 반환하지 않습니다.
pub fn parse_manifest(
    bytes: &[u8],
    format: ManifestFormat,
) -> Result<Vec<DependencyRecord>, ParseError> {
    let content = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidEncoding)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let records = dedup_last_wins(format.parser().parse(content)?);
    if records.is_empty() {
        return Err(ParseError::Empty {
            format: format.file_name(),
        });
    }
    Ok(records)
}

/// (name, ecosystem) 기준 중복 제거 -- 마지막 버전이 이기고 첫 등장 순서를 유지
pub fn dedup_last_wins(records: Vec<DependencyRecord>) -> Vec<DependencyRecord> {
    let mut index: HashMap<(String, Ecosystem), usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<DependencyRecord> = Vec::with_capacity(records.len());
    for record in records {
        let key = (record.name.clone(), record.ecosystem);
        match index.get(&key) {
            Some(&pos) => out[pos].version = record.version,
            None => {
                index.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

/// 범위 접두어(`^`, `~`, `>=`, `=`, `v` 등)를 제거해 기준 버전을 얻습니다.
///
/// `"^4.17.15"` -> `"4.17.15"`, `"*"`는 그대로 둡니다.
pub(crate) fn strip_range_prefix(version: &str) -> String {
    let v = version.trim();
    let stripped = v.trim_start_matches(['^', '~', '>', '<', '=', ' ']);
    let stripped = stripped
        .strip_prefix('v')
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(stripped);
    if stripped.is_empty() {
        v.to_owned()
    } else {
        stripped.to_owned()
    }
}
