//! 로컬 취약점 DB 소스 -- 오프라인 JSON 파일
//!
//! # JSON 형식
//!
//! ```json
//! [
//!   {
//!     "id": "GHSA-p6mc-m468-83gw",
//!     "aliases": ["CVE-2020-8203"],
//!     "package": "lodash",
//!     "ecosystem": "npm",
//!     "affected_ranges": [{ "introduced": "3.7.0", "fixed": "4.17.19" }],
//!     "severity": "high",
//!     "summary": "Prototype Pollution in lodash",
//!     "description": "..."
//!   }
//! ]
//! ```
//!
//! `severity`는 레이블 또는 CVSS 점수/벡터 문자열을 받습니다.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use vulnwatch_core::pipeline::BoxFuture;
use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::SourceError;
use crate::resolver::VulnerabilityRecord;
use crate::resolver::severity::{self, RawSeverity};
use crate::resolver::source::AdvisorySource;

/// DB 파일 최대 크기 (50 MB)
const MAX_DB_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// DB 엔트리 최대 개수
const MAX_DB_ENTRIES: usize = 1_000_000;

/// 로컬 DB 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryEntry {
    /// advisory ID
    pub id: String,
    /// 별칭 (CVE ID 등)
    #[serde(default)]
    pub aliases: Vec<String>,
    /// 패키지 이름
    pub package: String,
    /// 에코시스템
    pub ecosystem: Ecosystem,
    /// 영향 버전 범위
    #[serde(default)]
    pub affected_ranges: Vec<VersionRange>,
    /// 심각도 표현 (레이블, 점수, 벡터)
    #[serde(default)]
    pub severity: Option<String>,
    /// 요약
    #[serde(default)]
    pub summary: String,
    /// 상세 설명
    #[serde(default)]
    pub description: String,
}

/// 영향 버전 범위 -- `introduced <= v < fixed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRange {
    /// 도입 버전 (없으면 하한 없음)
    #[serde(default)]
    pub introduced: Option<String>,
    /// 수정 버전 (없으면 미수정)
    #[serde(default)]
    pub fixed: Option<String>,
}

impl VersionRange {
    fn render(&self) -> String {
        match (&self.introduced, &self.fixed) {
            (Some(lo), Some(hi)) => format!(">={lo}, <{hi}"),
            (Some(lo), None) => format!(">={lo}"),
            (None, Some(hi)) => format!("<{hi}"),
            (None, None) => "*".to_owned(),
        }
    }
}

/// 로컬 DB 소스
///
/// `(package, ecosystem)`으로 인덱싱되어 조회는 O(1)입니다.
pub struct LocalDbSource {
    name: String,
    entries: Vec<AdvisoryEntry>,
    index: HashMap<(String, Ecosystem), Vec<usize>>,
}

impl LocalDbSource {
    /// 엔트리 목록으로 생성합니다.
    pub fn from_entries(name: &str, entries: Vec<AdvisoryEntry>) -> Self {
        let mut index: HashMap<(String, Ecosystem), Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            index
                .entry((entry.package.clone(), entry.ecosystem))
                .or_default()
                .push(idx);
        }
        Self {
            name: name.to_owned(),
            entries,
            index,
        }
    }

    /// JSON 문자열에서 생성합니다.
    pub fn from_json(name: &str, json: &str) -> Result<Self, SourceError> {
        let entries: Vec<AdvisoryEntry> = serde_json::from_str(json)
            .map_err(|e| SourceError::Unavailable(format!("failed to parse advisory db: {e}")))?;
        if entries.len() > MAX_DB_ENTRIES {
            return Err(SourceError::Unavailable(format!(
                "advisory db has {} entries (max: {MAX_DB_ENTRIES})",
                entries.len()
            )));
        }
        Ok(Self::from_entries(name, entries))
    }

    /// 파일에서 로드합니다 (동기 I/O, 시작 시 1회).
    pub fn load(name: &str, path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        if metadata.len() > MAX_DB_FILE_SIZE {
            return Err(SourceError::Unavailable(format!(
                "{}: file size {} bytes exceeds maximum {MAX_DB_FILE_SIZE} bytes",
                path.display(),
                metadata.len()
            )));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        let db = Self::from_json(name, &content)?;
        info!(source = name, path = %path.display(), entries = db.len(), "advisory db loaded");
        Ok(db)
    }

    /// 엔트리 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 의존성 버전에 해당하는 엔트리
    pub fn lookup(&self, dependency: &DependencyRecord) -> Vec<&AdvisoryEntry> {
        self.index
            .get(&(dependency.name.clone(), dependency.ecosystem))
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&i| self.entries.get(i))
                    .filter(|e| is_affected(&dependency.version, &e.affected_ranges))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn to_record(&self, entry: &AdvisoryEntry) -> VulnerabilityRecord {
        let severity = match &entry.severity {
            Some(raw) => severity::normalize(&[
                RawSeverity::Label(raw.clone()),
                RawSeverity::Vector(raw.clone()),
            ]),
            None => severity::normalize(&[]),
        };
        VulnerabilityRecord {
            id: entry.id.clone(),
            aliases: entry.aliases.clone(),
            title: if entry.summary.is_empty() {
                entry.id.clone()
            } else {
                entry.summary.clone()
            },
            description: entry.description.clone(),
            severity,
            ranges: entry.affected_ranges.iter().map(VersionRange::render).collect(),
            sources: BTreeSet::from([self.name.clone()]),
        }
    }
}

impl AdvisorySource for LocalDbSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn query<'a>(
        &'a self,
        dependency: &'a DependencyRecord,
    ) -> BoxFuture<'a, Result<Vec<VulnerabilityRecord>, SourceError>> {
        let records = self
            .lookup(dependency)
            .into_iter()
            .map(|e| self.to_record(e))
            .collect();
        Box::pin(async move { Ok(records) })
    }
}

/// 버전이 범위 중 하나에 포함되는지 확인합니다.
///
/// SemVer로 파싱되지 않는 버전은 점 단위 숫자 비교로, 그것도 안 되면 문자열 비교로
/// fallback합니다. 정확한 버전이 아니면(`*`, 범위 제약) 매칭하지 않습니다.
pub fn is_affected(version: &str, ranges: &[VersionRange]) -> bool {
    let version = version.trim().trim_start_matches('v');
    if version.is_empty() || version == "*" || version.contains(['<', '>', '=', '~', '^', ',']) {
        return false;
    }
    ranges.iter().any(|range| is_in_range(version, range))
}

fn is_in_range(version: &str, range: &VersionRange) -> bool {
    if let Some(introduced) = &range.introduced
        && introduced != "0"
        && compare(version, introduced) == std::cmp::Ordering::Less
    {
        return false;
    }
    if let Some(fixed) = &range.fixed
        && compare(version, fixed) != std::cmp::Ordering::Less
    {
        return false;
    }
    true
}

pub(crate) fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    let b = b.trim().trim_start_matches('v');
    if let (Ok(va), Ok(vb)) = (semver::Version::parse(a), semver::Version::parse(b)) {
        return va.cmp(&vb);
    }
    match (numeric_parts(a), numeric_parts(b)) {
        (Some(pa), Some(pb)) => pa.cmp(&pb),
        _ => a.cmp(b),
    }
}

/// `1.2.10.RELEASE` -> [1, 2, 10] (숫자가 아닌 꼬리는 무시)
fn numeric_parts(version: &str) -> Option<Vec<u64>> {
    let parts: Vec<u64> = version
        .split(['.', '-', '+'])
        .map_while(|p| p.parse::<u64>().ok())
        .collect();
    if parts.is_empty() { None } else { Some(parts) }
}
