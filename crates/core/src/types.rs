//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 스캐너, 알림 버스, 스케줄러가 공유하는 데이터 구조를 정의합니다.
//! 저장소 trait([`crate::store`])도 이 타입들로 입출력합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 프로젝트 식별자
pub type ProjectId = u64;

/// 사용자 식별자
pub type UserId = u64;

/// 심각도 레벨
///
/// `Ord` 구현으로 비교가 가능합니다 (`Low < Medium < High < Critical`).
/// 직렬화 시 대문자(`"HIGH"`)로 표현됩니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// 낮은 심각도
    Low,
    /// 중간 심각도 (심각도를 알 수 없을 때의 기본값)
    #[default]
    Medium,
    /// 높은 심각도
    High,
    /// 치명적, 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 모든 심각도 (오름차순)
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// 텍스트 레벨에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 소스별 어휘(`moderate`, `important` 등)를 흡수합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "info" | "informational" | "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" | "important" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// CVSS 기본 점수(0.0 ~ 10.0)를 심각도로 변환합니다.
    ///
    /// CVSS v3 정성 척도 임계값을 따릅니다:
    /// `>= 9.0` Critical, `>= 7.0` High, `>= 4.0` Medium, 그 외 Low.
    pub fn from_cvss_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// 소문자 레이블 (메트릭 레이블, 이메일 본문 등)
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// 패키지 에코시스템
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// Node.js (npm, yarn)
    Npm,
    /// Python (pip)
    PyPI,
    /// Java (Maven)
    Maven,
    /// Go modules
    Go,
    /// PHP (Composer)
    Packagist,
    /// Rust (Cargo)
    Crates,
    /// Ruby (Bundler)
    RubyGems,
}

impl Ecosystem {
    /// OSV API가 사용하는 에코시스템 이름
    pub fn osv_name(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::PyPI => "PyPI",
            Self::Maven => "Maven",
            Self::Go => "Go",
            Self::Packagist => "Packagist",
            Self::Crates => "crates.io",
            Self::RubyGems => "RubyGems",
        }
    }

    /// 문자열에서 에코시스템을 파싱합니다 (대소문자 무시, 별칭 허용).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "npm" | "node" | "yarn" => Some(Self::Npm),
            "pypi" | "pip" | "python" => Some(Self::PyPI),
            "maven" | "java" => Some(Self::Maven),
            "go" | "golang" => Some(Self::Go),
            "packagist" | "composer" | "php" => Some(Self::Packagist),
            "crates" | "crates.io" | "cargo" | "rust" => Some(Self::Crates),
            "rubygems" | "gem" | "ruby" => Some(Self::RubyGems),
            _ => None,
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Npm => "npm",
            Self::PyPI => "pypi",
            Self::Maven => "maven",
            Self::Go => "go",
            Self::Packagist => "packagist",
            Self::Crates => "crates",
            Self::RubyGems => "rubygems",
        };
        f.write_str(s)
    }
}

/// 매니페스트에서 추출한 정규화된 의존성 레코드
///
/// `version`은 에코시스템마다 형식이 달라 자유 형식 문자열입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// 패키지 이름
    pub name: String,
    /// 버전 (또는 버전 제약)
    pub version: String,
    /// 에코시스템
    pub ecosystem: Ecosystem,
}

impl DependencyRecord {
    /// 새 레코드를 생성합니다.
    pub fn new(name: impl Into<String>, version: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
        }
    }
}

impl fmt::Display for DependencyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.ecosystem)
    }
}

/// 프로젝트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// 프로젝트 ID
    pub id: ProjectId,
    /// 소유 사용자
    pub owner_id: UserId,
    /// 프로젝트 이름
    pub name: String,
}

/// 저장된 의존성
///
/// (project, name, ecosystem) 조합이 유일합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// 의존성 ID
    pub id: String,
    /// 소속 프로젝트
    pub project_id: ProjectId,
    /// 패키지 이름
    pub name: String,
    /// 버전
    pub version: String,
    /// 에코시스템
    pub ecosystem: Ecosystem,
    /// 레지스트리의 최신 버전 (조회하지 않았거나 실패하면 없음)
    #[serde(default)]
    pub latest_version: Option<String>,
    /// 마지막으로 교체된 시각
    pub updated_at: DateTime<Utc>,
}

/// 저장된 취약점 이슈
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// 이슈 ID
    pub id: String,
    /// 소속 의존성
    pub dependency_id: String,
    /// 중복 제거 키 (CVE ID 또는 advisory ID)
    pub advisory_id: String,
    /// 제목
    pub title: String,
    /// 상세 설명
    pub description: String,
    /// 정규화된 심각도
    pub severity: Severity,
    /// CVE ID (있을 경우)
    pub cve_id: Option<String>,
    /// 영향 버전 범위 (정보용)
    pub affected_ranges: Vec<String>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

/// 저장 전 이슈 (ID와 시각은 저장소가 부여)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    /// 중복 제거 키
    pub advisory_id: String,
    /// 제목
    pub title: String,
    /// 상세 설명
    pub description: String,
    /// 정규화된 심각도
    pub severity: Severity,
    /// CVE ID
    pub cve_id: Option<String>,
    /// 영향 버전 범위
    pub affected_ranges: Vec<String>,
}

/// 한 의존성의 스캔 결과 (커밋 단위)
#[derive(Debug, Clone)]
pub struct DependencyScan {
    /// 의존성
    pub record: DependencyRecord,
    /// 새로 해석된 이슈 전체
    pub issues: Vec<NewIssue>,
    /// 레지스트리의 최신 버전
    pub latest_version: Option<String>,
}

/// 심각도별 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// Critical 수
    pub critical: usize,
    /// High 수
    pub high: usize,
    /// Medium 수
    pub medium: usize,
    /// Low 수
    pub low: usize,
}

impl SeverityCounts {
    /// 심각도 하나를 집계에 더합니다.
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    /// 전체 수
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// 스캔 실행 집계 (마지막 스캔 조회 및 알림 시드용)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// 프로젝트
    pub project_id: ProjectId,
    /// 시작 시각
    pub started_at: DateTime<Utc>,
    /// 종료 시각
    pub finished_at: DateTime<Utc>,
    /// 전체 의존성 수
    pub total_dependencies: usize,
    /// 전체 취약점 수
    pub total_vulnerabilities: usize,
    /// 심각도별 집계
    pub severity_counts: SeverityCounts,
    /// 일부 소스가 실패했는지 여부
    pub partial: bool,
    /// 실패한 소스 이름
    pub failed_sources: Vec<String>,
}

impl ScanStats {
    /// 스캔 소요 시간 (밀리초)
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// 알림 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    /// 시스템 알림 (스캔 실패, 다이제스트 발송 등)
    System,
    /// 보안 알림 (새 취약점)
    Security,
    /// 스캔 완료 알림
    Scan,
    /// 협업 알림
    Collaboration,
}

impl NotificationType {
    /// 문자열에서 유형을 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Some(Self::System),
            "security" => Some(Self::Security),
            "scan" => Some(Self::Scan),
            "collaboration" => Some(Self::Collaboration),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::Security => "security",
            Self::Scan => "scan",
            Self::Collaboration => "collaboration",
        };
        f.write_str(s)
    }
}

/// 저장된 알림
///
/// `read`는 읽음 처리로만 바뀌며, `delivered_at`은 다이제스트 발송 마커로
/// `read`와 독립적입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 알림 ID
    pub id: String,
    /// 수신 사용자
    pub user_id: UserId,
    /// 알림 유형
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// 메시지
    pub message: String,
    /// 부가 정보
    pub metadata: serde_json::Value,
    /// 읽음 여부
    pub read: bool,
    /// 다이제스트 발송 시각
    pub delivered_at: Option<DateTime<Utc>>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

/// 저장 전 알림
#[derive(Debug, Clone)]
pub struct NewNotification {
    /// 수신 사용자
    pub user_id: UserId,
    /// 알림 유형
    pub kind: NotificationType,
    /// 메시지
    pub message: String,
    /// 부가 정보
    pub metadata: serde_json::Value,
}

impl NewNotification {
    /// 새 알림을 생성합니다.
    pub fn new(
        user_id: UserId,
        kind: NotificationType,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
            metadata,
        }
    }
}

/// 알림 목록 조회 조건
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationQuery {
    /// 페이지 (1부터)
    pub page: usize,
    /// 페이지 크기
    pub limit: usize,
    /// 유형 필터
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    /// 읽지 않은 알림만
    pub unread_only: bool,
}

impl NotificationQuery {
    /// 페이지 크기 상한
    pub const MAX_LIMIT: usize = 100;

    /// page/limit을 허용 범위로 보정합니다.
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            kind: self.kind,
            unread_only: self.unread_only,
        }
    }
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            kind: None,
            unread_only: false,
        }
    }
}

/// 알림 목록 페이지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    /// 최신순 알림
    pub notifications: Vec<Notification>,
    /// 조건에 맞는 전체 수
    pub total: usize,
    /// 현재 페이지
    pub page: usize,
    /// 페이지 크기
    pub limit: usize,
}

/// 알림 수신 빈도
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFrequency {
    /// 알림 생성 즉시
    #[default]
    Immediate,
    /// 하루 단위 다이제스트
    Daily,
    /// 주 단위 다이제스트
    Weekly,
}

impl fmt::Display for AlertFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Immediate => "immediate",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        };
        f.write_str(s)
    }
}

/// 사용자별 알림 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    /// 사용자
    pub user_id: UserId,
    /// 이메일 알림 사용 여부
    pub email_notifications: bool,
    /// 일간 다이제스트 수신 여부
    pub daily_digest: bool,
    /// 보안 알림 수신 여부
    pub security_alerts: bool,
    /// 수신 빈도
    pub alert_frequency: AlertFrequency,
}

impl AlertConfig {
    /// 설정이 없는 사용자의 기본값
    pub fn default_for(user_id: UserId) -> Self {
        Self {
            user_id,
            email_notifications: true,
            daily_digest: true,
            security_alerts: true,
            alert_frequency: AlertFrequency::Immediate,
        }
    }

    /// 이 유형의 알림을 이메일로 받을 자격이 있는지 판단합니다.
    pub fn wants_email_for(&self, kind: NotificationType) -> bool {
        if !self.email_notifications {
            return false;
        }
        match kind {
            NotificationType::Security => self.security_alerts,
            NotificationType::Scan => true,
            NotificationType::System | NotificationType::Collaboration => false,
        }
    }
}

/// 사용자 연락처 (이메일 발송 대상)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// 사용자 ID
    pub id: UserId,
    /// 이메일 주소
    pub email: String,
    /// 표시 이름
    pub name: String,
}
