//! 취약점 해석기 -- 의존성 하나를 설정된 모든 소스에 동시에 질의하고 병합합니다.
//!
//! # 처리 순서
//!
//! 1. 소스마다 레이트 리미터 토큰 획득 (프로세스 전역 버킷)
//! 2. 호출 타임아웃을 적용해 질의, 일시적 에러는 지수 백오프로 재시도
//! 3. 재시도 소진 시 해당 소스만 실패로 기록 (`failed_sources`)
//! 4. 성공한 소스의 레코드를 중복 제거 키(CVE ID 우선)로 병합:
//!    심각도는 최댓값, 영향 범위는 합집합
//! 5. 중복 제거 키 순으로 정렬해 같은 입력에 같은 출력을 보장

pub mod local;
pub mod nvd;
pub mod osv;
pub mod ratelimit;
pub mod retry;
pub mod severity;
pub mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use vulnwatch_core::metrics as m;
use vulnwatch_core::types::{DependencyRecord, NewIssue, Severity};

use crate::error::SourceError;

pub use ratelimit::{RateLimiters, TokenBucket};
pub use retry::RetryPolicy;
pub use source::{AdvisorySource, SourceKind, build_sources};

/// 소스가 보고한 (정규화된) 취약점 레코드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnerabilityRecord {
    /// 소스 고유 ID (OSV ID, CVE ID, GHSA ID 등)
    pub id: String,
    /// 별칭
    pub aliases: Vec<String>,
    /// 제목
    pub title: String,
    /// 상세 설명
    pub description: String,
    /// 정규화된 심각도
    pub severity: Severity,
    /// 영향 버전 범위 (정보용)
    pub ranges: BTreeSet<String>,
    /// 이 레코드를 보고한 소스
    pub sources: BTreeSet<String>,
}

impl VulnerabilityRecord {
    /// ID와 별칭 중 CVE ID
    pub fn cve_id(&self) -> Option<&str> {
        std::iter::once(&self.id)
            .chain(self.aliases.iter())
            .map(String::as_str)
            .find(|id| id.starts_with("CVE-"))
    }

    /// 중복 제거 키 -- CVE ID가 있으면 CVE ID, 없으면 레코드 ID
    pub fn dedup_key(&self) -> &str {
        self.cve_id().unwrap_or(&self.id)
    }

    /// 같은 취약점의 다른 보고를 병합합니다.
    fn merge(&mut self, other: VulnerabilityRecord) {
        self.severity = self.severity.max(other.severity);
        self.ranges.extend(other.ranges);
        self.sources.extend(other.sources);
        for alias in std::iter::once(other.id).chain(other.aliases) {
            if alias != self.id && !self.aliases.contains(&alias) {
                self.aliases.push(alias);
            }
        }
        if self.description.is_empty() {
            self.description = other.description;
        }
        if self.title == self.id && other.title != self.id {
            self.title = other.title;
        }
    }

    /// 저장용 이슈로 변환합니다.
    pub fn to_new_issue(&self) -> NewIssue {
        NewIssue {
            advisory_id: self.dedup_key().to_owned(),
            title: self.title.clone(),
            description: self.description.clone(),
            severity: self.severity,
            cve_id: self.cve_id().map(str::to_owned),
            affected_ranges: self.ranges.iter().cloned().collect(),
        }
    }
}

/// 레코드들을 중복 제거 키로 병합하고 키 순으로 정렬합니다.
pub fn merge_records(records: impl IntoIterator<Item = VulnerabilityRecord>) -> Vec<VulnerabilityRecord> {
    let mut merged: BTreeMap<String, VulnerabilityRecord> = BTreeMap::new();
    for mut record in records {
        record.aliases.sort();
        record.aliases.dedup();
        let key = record.dedup_key().to_owned();
        match merged.get_mut(&key) {
            Some(existing) => existing.merge(record),
            None => {
                merged.insert(key, record);
            }
        }
    }
    merged.into_values().collect()
}

/// 의존성 하나의 해석 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// 병합된 레코드 (중복 제거 키 순)
    pub records: Vec<VulnerabilityRecord>,
    /// 재시도 소진으로 실패한 소스
    pub failed_sources: Vec<String>,
}

impl Resolution {
    /// 일부 소스가 실패했는지
    pub fn is_partial(&self) -> bool {
        !self.failed_sources.is_empty()
    }

    /// 저장용 이슈 목록
    pub fn to_new_issues(&self) -> Vec<NewIssue> {
        self.records.iter().map(VulnerabilityRecord::to_new_issue).collect()
    }
}

/// 취약점 해석기
///
/// 복제 비용이 낮으며 (모든 필드가 `Arc` 또는 `Copy`), 워커마다 복제해 사용합니다.
#[derive(Clone)]
pub struct Resolver {
    sources: Arc<[Arc<dyn AdvisorySource>]>,
    limiters: Arc<RateLimiters>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Resolver {
    /// 해석기를 생성합니다.
    pub fn new(
        sources: Vec<Arc<dyn AdvisorySource>>,
        limiters: Arc<RateLimiters>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            sources: sources.into(),
            limiters,
            retry,
            timeout,
        }
    }

    /// 설정된 소스 이름
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_owned()).collect()
    }

    /// 의존성 하나를 해석합니다. 소스 실패는 에러가 아니라 `failed_sources`로 반환됩니다.
    pub async fn resolve(&self, dependency: &DependencyRecord) -> Resolution {
        let outcomes = join_all(
            self.sources
                .iter()
                .map(|source| self.query_source(source.as_ref(), dependency)),
        )
        .await;

        let mut records = Vec::new();
        let mut failed_sources = Vec::new();
        for (source, outcome) in self.sources.iter().zip(outcomes) {
            match outcome {
                Ok(found) => records.extend(found),
                Err(err) => {
                    warn!(
                        source = source.name(),
                        dependency = %dependency,
                        error = %err,
                        "vulnerability source failed, continuing with partial results"
                    );
                    metrics::counter!(m::SOURCE_FAILURES_TOTAL, m::LABEL_SOURCE => source.name().to_owned())
                        .increment(1);
                    failed_sources.push(source.name().to_owned());
                }
            }
        }

        let records = merge_records(records);
        debug!(dependency = %dependency, vulnerabilities = records.len(), "dependency resolved");
        Resolution {
            records,
            failed_sources,
        }
    }

    async fn query_source(
        &self,
        source: &dyn AdvisorySource,
        dependency: &DependencyRecord,
    ) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        let name = source.name();
        let result = self
            .retry
            .run(name, || async {
                self.limiters.acquire(name).await;
                match tokio::time::timeout(self.timeout, source.query(dependency)).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout(self.timeout)),
                }
            })
            .await;

        let label = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            m::SOURCE_REQUESTS_TOTAL,
            m::LABEL_SOURCE => name.to_owned(),
            m::LABEL_RESULT => label
        )
        .increment(1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, aliases: &[&str], severity: Severity, source: &str) -> VulnerabilityRecord {
        VulnerabilityRecord {
            id: id.to_owned(),
            aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
            title: id.to_owned(),
            description: String::new(),
            severity,
            ranges: BTreeSet::new(),
            sources: BTreeSet::from([source.to_owned()]),
        }
    }

    #[test]
    fn dedup_key_prefers_cve() {
        let r = record("GHSA-xxxx", &["CVE-2020-8203"], Severity::High, "osv");
        assert_eq!(r.dedup_key(), "CVE-2020-8203");
        let r = record("GO-2022-0001", &[], Severity::High, "osv");
        assert_eq!(r.dedup_key(), "GO-2022-0001");
    }

    #[test]
    fn merge_keeps_max_severity_and_union() {
        let mut a = record("GHSA-xxxx", &["CVE-2020-8203"], Severity::Medium, "osv");
        a.ranges.insert(">=3.7.0, <4.17.19".to_owned());
        let mut b = record("CVE-2020-8203", &[], Severity::High, "nvd");
        b.ranges.insert("<4.17.19".to_owned());
        b.description = "Prototype pollution".to_owned();

        let merged = merge_records(vec![a, b]);
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert_eq!(m.severity, Severity::High);
        assert_eq!(m.ranges.len(), 2);
        assert_eq!(m.sources.len(), 2);
        assert_eq!(m.description, "Prototype pollution");
    }

    #[test]
    fn merge_output_is_sorted_and_stable() {
        let input = vec![
            record("CVE-2021-2", &[], Severity::Low, "osv"),
            record("CVE-2021-1", &[], Severity::Low, "osv"),
        ];
        let first = merge_records(input.clone());
        let mut reversed = input;
        reversed.reverse();
        let second = merge_records(reversed);
        assert_eq!(first, second);
        assert_eq!(first[0].id, "CVE-2021-1");
    }

    #[test]
    fn to_new_issue_carries_cve() {
        let r = record("GHSA-xxxx", &["CVE-2020-8203"], Severity::High, "osv");
        let issue = r.to_new_issue();
        assert_eq!(issue.advisory_id, "CVE-2020-8203");
        assert_eq!(issue.cve_id.as_deref(), Some("CVE-2020-8203"));
        assert_eq!(issue.severity, Severity::High);
    }
}
