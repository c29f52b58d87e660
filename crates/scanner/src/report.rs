//! 프로젝트 리포트 -- 의존성별 이슈와 위험도

use serde::Serialize;

use vulnwatch_core::types::{Dependency, Issue, Project, ScanStats, Severity};

use crate::orchestrator::ScanState;
use crate::registry::is_outdated;

/// 의존성 위험도 (이슈 최대 심각도)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// 이슈 없음
    Secure,
    /// 최대 Low
    Low,
    /// 최대 Medium
    Medium,
    /// 최대 High
    High,
    /// 최대 Critical
    Critical,
}

impl RiskLevel {
    /// 이슈 목록의 위험도
    pub fn of(issues: &[Issue]) -> Self {
        issues
            .iter()
            .map(|i| i.severity)
            .max()
            .map_or(Self::Secure, Self::from)
    }
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
            Severity::Critical => Self::Critical,
        }
    }
}

/// 의존성 하나의 리포트
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    /// 의존성
    pub dependency: Dependency,
    /// 위험도
    pub risk: RiskLevel,
    /// 레지스트리 최신 버전보다 낮은지
    pub outdated: bool,
    /// 이슈 (심각도 내림차순)
    pub issues: Vec<Issue>,
}

/// 프로젝트 리포트
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    /// 프로젝트
    pub project: Project,
    /// 현재 스캔 상태
    pub state: ScanState,
    /// 마지막 성공 스캔 집계
    pub last_scan: Option<ScanStats>,
    /// 의존성별 리포트
    pub dependencies: Vec<DependencyReport>,
}

impl ProjectReport {
    /// 가장 높은 위험도
    pub fn overall_risk(&self) -> RiskLevel {
        self.dependencies
            .iter()
            .map(|d| d.risk)
            .max()
            .unwrap_or(RiskLevel::Secure)
    }

    /// 최신 버전보다 낮은 의존성 수
    pub fn outdated_count(&self) -> usize {
        self.dependencies.iter().filter(|d| d.outdated).count()
    }
}

pub(crate) fn dependency_report(dependency: Dependency, mut issues: Vec<Issue>) -> DependencyReport {
    issues.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.advisory_id.cmp(&b.advisory_id))
    });
    let outdated = dependency
        .latest_version
        .as_deref()
        .is_some_and(|latest| is_outdated(&dependency.version, latest));
    DependencyReport {
        risk: RiskLevel::of(&issues),
        outdated,
        dependency,
        issues,
    }
}
