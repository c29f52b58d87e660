//! 스캔 오케스트레이터 -- 프로젝트 단위 스캔 흐름 관리
//!
//! # 상태 기계
//!
//! ```text
//! PENDING --(guard 획득)--> RUNNING --+--> SUCCEEDED
//!                                     +--> FAILED (저장소 에러)
//! ```
//!
//! 같은 프로젝트가 `RUNNING`이면 새 요청은 대기하지 않고 [`ScanError::ScanInProgress`]로
//! 거부됩니다. 이 가드가 프로젝트 데이터의 유일한 쓰기 조정 수단입니다.
//!
//! 가드를 얻은 스캔은 별도 태스크에서 실행되므로, 호출자(HTTP 요청 등)가 중간에
//! drop 되어도 완료 또는 실패까지 진행됩니다. 외부 취소 연산은 없습니다.
//!
//! # 내부 흐름
//!
//! ```text
//! manifest --> detect --> parse --> [guard] --> Resolver x worker_concurrency
//!                                                  |
//!                                     diff(old issues, new issues) --> security 알림
//!                                                  |
//!                                     commit_scan (결과 + 집계 원자적 교체)
//!                                                  |
//!                                                  +--> scan 알림
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use vulnwatch_core::metrics as m;
use vulnwatch_core::store::{NotificationStore, ProjectStore};
use vulnwatch_core::types::{
    DependencyRecord, DependencyScan, Ecosystem, NewNotification, NotificationType, Project,
    ProjectId, ScanStats, SeverityCounts,
};
use vulnwatch_notify::NotificationBus;

use crate::config::ScanConfig;
use crate::error::{ParseError, ScanError};
use crate::parser::{ManifestFormat, parse_manifest};
use crate::registry::LatestVersionSource;
use crate::report::{ProjectReport, dependency_report};
use crate::resolver::{Resolution, Resolver, VulnerabilityRecord};

/// 프로젝트 스캔 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanState {
    /// 아직 스캔이 실행된 적 없음
    Pending,
    /// 실행 중
    Running,
    /// 마지막 스캔 성공
    Succeeded,
    /// 마지막 스캔 실패 (직전 성공 데이터 유지)
    Failed,
}

/// 스캔 트리거
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// 매니페스트 업로드
    Upload,
    /// 스케줄러 재스캔
    Rescan,
}

impl ScanTrigger {
    /// 메트릭 레이블
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Rescan => "rescan",
        }
    }
}

type StateMap = Arc<Mutex<HashMap<ProjectId, ScanState>>>;

fn lock_states(states: &StateMap) -> MutexGuard<'_, HashMap<ProjectId, ScanState>> {
    states.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 프로젝트 단일 실행 가드
///
/// drop 시 종료 상태를 기록합니다. 종료 상태 없이 drop 되면 (취소/패닉) `Failed`.
struct ScanGuard {
    states: StateMap,
    project_id: ProjectId,
    outcome: Option<ScanState>,
}

impl ScanGuard {
    fn acquire(states: &StateMap, project_id: ProjectId) -> Result<Self, ScanError> {
        let mut map = lock_states(states);
        if map.get(&project_id) == Some(&ScanState::Running) {
            return Err(ScanError::ScanInProgress { project_id });
        }
        map.insert(project_id, ScanState::Running);
        drop(map);
        metrics::gauge!(m::SCAN_RUNNING).increment(1.0);
        Ok(Self {
            states: Arc::clone(states),
            project_id,
            outcome: None,
        })
    }

    fn finish(mut self, state: ScanState) {
        self.outcome = Some(state);
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let state = self.outcome.unwrap_or(ScanState::Failed);
        lock_states(&self.states).insert(self.project_id, state);
        metrics::gauge!(m::SCAN_RUNNING).decrement(1.0);
    }
}

/// 새로 나타난 고심각도 이슈 (보안 알림 대상)
struct NewFinding {
    dependency: DependencyRecord,
    record: VulnerabilityRecord,
}

/// 스캔 오케스트레이터
///
/// 복제본은 저장소, 상태, 카운터를 공유하는 핸들입니다.
pub struct ScanOrchestrator<S: ProjectStore, N: NotificationStore> {
    store: Arc<S>,
    bus: Arc<NotificationBus<N>>,
    resolver: Resolver,
    latest: Option<Arc<dyn LatestVersionSource>>,
    config: ScanConfig,
    states: StateMap,
    scans_completed: Arc<AtomicU64>,
    scans_failed: Arc<AtomicU64>,
}

impl<S: ProjectStore, N: NotificationStore> Clone for ScanOrchestrator<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            resolver: self.resolver.clone(),
            latest: self.latest.clone(),
            config: self.config.clone(),
            states: Arc::clone(&self.states),
            scans_completed: Arc::clone(&self.scans_completed),
            scans_failed: Arc::clone(&self.scans_failed),
        }
    }
}

impl<S: ProjectStore, N: NotificationStore> ScanOrchestrator<S, N> {
    /// 오케스트레이터를 생성합니다.
    pub fn new(
        store: Arc<S>,
        bus: Arc<NotificationBus<N>>,
        resolver: Resolver,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            store,
            bus,
            resolver,
            latest: None,
            config,
            states: Arc::new(Mutex::new(HashMap::new())),
            scans_completed: Arc::new(AtomicU64::new(0)),
            scans_failed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// 스캔마다 의존성의 최신 버전을 함께 조회합니다.
    pub fn with_latest_versions(mut self, source: Arc<dyn LatestVersionSource>) -> Self {
        self.latest = Some(source);
        self
    }

    /// 업로드된 매니페스트로 프로젝트를 스캔합니다.
    ///
    /// 크기 초과, 형식 판별 실패, 파싱 실패, 진행 중 스캔은 스캔을 시작하기 전에 거부됩니다.
    pub async fn scan_upload(
        &self,
        project_id: ProjectId,
        file_name: &str,
        bytes: &[u8],
        format_hint: Option<&str>,
    ) -> Result<ScanStats, ScanError> {
        if bytes.len() > self.config.max_manifest_bytes {
            reject("too_large");
            return Err(ScanError::FileTooLarge {
                size: bytes.len(),
                max: self.config.max_manifest_bytes,
            });
        }

        let format = ManifestFormat::detect(file_name, format_hint).inspect_err(|_| {
            reject("unsupported_format");
        })?;
        let records = parse_manifest(bytes, format).inspect_err(|_| reject("parse"))?;
        if records.len() > self.config.max_dependencies {
            reject("too_many_dependencies");
            return Err(ParseError::TooManyDependencies {
                count: records.len(),
                max: self.config.max_dependencies,
            }
            .into());
        }
        metrics::counter!(m::SCAN_MANIFESTS_PARSED_TOTAL, m::LABEL_FORMAT => format.file_name())
            .increment(1);
        debug!(project_id, format = %format, dependencies = records.len(), "manifest parsed");

        let project = self.load_project(project_id).await?;
        self.execute(project, ScanTrigger::Upload, Some(records)).await
    }

    /// 저장된 의존성으로 프로젝트를 다시 스캔합니다.
    pub async fn rescan(&self, project_id: ProjectId) -> Result<ScanStats, ScanError> {
        let project = self.load_project(project_id).await?;
        self.execute(project, ScanTrigger::Rescan, None).await
    }

    /// 프로젝트의 현재 스캔 상태
    pub fn scan_state(&self, project_id: ProjectId) -> ScanState {
        lock_states(&self.states)
            .get(&project_id)
            .copied()
            .unwrap_or(ScanState::Pending)
    }

    /// 실행 중인 스캔 수
    pub fn running_scans(&self) -> usize {
        lock_states(&self.states)
            .values()
            .filter(|s| **s == ScanState::Running)
            .count()
    }

    /// 의존성별 이슈와 위험도를 담은 프로젝트 리포트
    pub async fn project_report(&self, project_id: ProjectId) -> Result<ProjectReport, ScanError> {
        let project = self.load_project(project_id).await?;
        let last_scan = self.store.last_scan(project_id).await?;
        let dependencies = self
            .store
            .dependency_issues(project_id)
            .await?
            .into_iter()
            .map(|(dependency, issues)| dependency_report(dependency, issues))
            .collect();
        Ok(ProjectReport {
            project,
            state: self.scan_state(project_id),
            last_scan,
            dependencies,
        })
    }

    /// 성공한 스캔 수
    pub fn scans_completed(&self) -> u64 {
        self.scans_completed.load(Ordering::Relaxed)
    }

    /// 실패한 스캔 수
    pub fn scans_failed(&self) -> u64 {
        self.scans_failed.load(Ordering::Relaxed)
    }

    /// 프로젝트 저장소
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 알림 버스
    pub fn bus(&self) -> &Arc<NotificationBus<N>> {
        &self.bus
    }

    /// 해석기
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// 스캐너 설정
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    async fn load_project(&self, project_id: ProjectId) -> Result<Project, ScanError> {
        self.store
            .project(project_id)
            .await?
            .ok_or(ScanError::ProjectNotFound { project_id })
    }

    async fn execute(
        &self,
        project: Project,
        trigger: ScanTrigger,
        records: Option<Vec<DependencyRecord>>,
    ) -> Result<ScanStats, ScanError> {
        let guard = ScanGuard::acquire(&self.states, project.id).inspect_err(|_| {
            reject("in_progress");
        })?;
        let project_id = project.id;
        let this = self.clone();
        tokio::spawn(async move { this.run_guarded(guard, project, trigger, records).await })
            .await
            .unwrap_or_else(|e| {
                error!(project_id, error = %e, "scan task ended without a result");
                Err(ScanError::Aborted(e.to_string()))
            })
    }

    async fn run_guarded(
        &self,
        guard: ScanGuard,
        project: Project,
        trigger: ScanTrigger,
        records: Option<Vec<DependencyRecord>>,
    ) -> Result<ScanStats, ScanError> {
        let started = std::time::Instant::now();
        info!(project_id = project.id, trigger = trigger.as_label(), "scan started");

        let result = self.run_scan(&project, records).await;
        metrics::histogram!(m::SCAN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match result {
            Ok(stats) => {
                guard.finish(ScanState::Succeeded);
                self.scans_completed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    m::SCAN_RUNS_TOTAL,
                    m::LABEL_TRIGGER => trigger.as_label(),
                    m::LABEL_RESULT => "success"
                )
                .increment(1);
                info!(
                    project_id = project.id,
                    dependencies = stats.total_dependencies,
                    vulnerabilities = stats.total_vulnerabilities,
                    partial = stats.partial,
                    duration_ms = stats.duration_ms(),
                    "scan succeeded"
                );
                Ok(stats)
            }
            Err(err) => {
                guard.finish(ScanState::Failed);
                self.scans_failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    m::SCAN_RUNS_TOTAL,
                    m::LABEL_TRIGGER => trigger.as_label(),
                    m::LABEL_RESULT => "failure"
                )
                .increment(1);
                error!(project_id = project.id, error = %err, "scan failed");
                self.report_failure(&project, &err).await;
                Err(err)
            }
        }
    }

    async fn run_scan(
        &self,
        project: &Project,
        records: Option<Vec<DependencyRecord>>,
    ) -> Result<ScanStats, ScanError> {
        let started_at = Utc::now();
        let records = match records {
            Some(records) => records,
            None => self
                .store
                .dependencies(project.id)
                .await?
                .into_iter()
                .map(|d| DependencyRecord::new(d.name, d.version, d.ecosystem))
                .collect(),
        };

        // 직전 스캔의 이슈 키 (새 이슈 판별용)
        let mut previous: HashMap<(String, Ecosystem), HashSet<String>> = HashMap::new();
        for (dependency, issues) in self.store.dependency_issues(project.id).await? {
            previous
                .entry((dependency.name, dependency.ecosystem))
                .or_default()
                .extend(issues.into_iter().map(|i| i.advisory_id));
        }

        let resolutions: Vec<(DependencyRecord, Resolution, Option<String>)> =
            futures::stream::iter(records)
                .map(|record| {
                    let resolver = self.resolver.clone();
                    let latest = self.latest.clone();
                    async move {
                        let (resolution, latest_version) = tokio::join!(
                            resolver.resolve(&record),
                            lookup_latest(latest.as_deref(), &record)
                        );
                        (record, resolution, latest_version)
                    }
                })
                .buffered(self.config.worker_concurrency)
                .collect()
                .await;

        let mut counts = SeverityCounts::default();
        let mut failed_sources = BTreeSet::new();
        let mut findings = Vec::new();
        let mut scans = Vec::with_capacity(resolutions.len());
        for (record, resolution, latest_version) in resolutions {
            let known = previous.get(&(record.name.clone(), record.ecosystem));
            for vuln in &resolution.records {
                counts.record(vuln.severity);
                let is_new = known.is_none_or(|keys| !keys.contains(vuln.dedup_key()));
                if is_new && vuln.severity >= self.config.security_alert_min_severity {
                    findings.push(NewFinding {
                        dependency: record.clone(),
                        record: vuln.clone(),
                    });
                }
            }
            failed_sources.extend(resolution.failed_sources.iter().cloned());
            scans.push(DependencyScan {
                issues: resolution.to_new_issues(),
                record,
                latest_version,
            });
        }

        let total_dependencies = scans.len();
        let failed_sources: Vec<String> = failed_sources.into_iter().collect();
        let stats = ScanStats {
            project_id: project.id,
            started_at,
            finished_at: Utc::now(),
            total_dependencies,
            total_vulnerabilities: counts.total(),
            severity_counts: counts,
            partial: !failed_sources.is_empty(),
            failed_sources,
        };
        self.store.commit_scan(stats.clone(), scans).await?;
        record_persisted(&counts);

        for finding in &findings {
            self.notify_finding(project, finding).await;
        }
        self.notify_completed(project, &stats).await;
        Ok(stats)
    }

    async fn notify_finding(&self, project: &Project, finding: &NewFinding) {
        let vuln = &finding.record;
        let message = format!(
            "Security Alert: {} found in {} ({}). Severity: {}",
            vuln.title, finding.dependency.name, project.name, vuln.severity
        );
        let metadata = json!({
            "projectId": project.id,
            "dependency": finding.dependency.name,
            "version": finding.dependency.version,
            "advisoryId": vuln.dedup_key(),
            "cveId": vuln.cve_id(),
            "severity": vuln.severity,
        });
        self.publish(project, NotificationType::Security, message, metadata)
            .await;
    }

    async fn notify_completed(&self, project: &Project, stats: &ScanStats) {
        let mut message = format!(
            "Scan completed for project {}. Found {} dependencies",
            project.name, stats.total_dependencies
        );
        if stats.total_vulnerabilities > 0 {
            message.push_str(&format!(
                " with {} vulnerabilities ({} critical)",
                stats.total_vulnerabilities, stats.severity_counts.critical
            ));
        } else {
            message.push_str(" with no vulnerabilities found");
        }
        let metadata = json!({
            "projectId": project.id,
            "totalDependencies": stats.total_dependencies,
            "totalVulnerabilities": stats.total_vulnerabilities,
            "criticalVulnerabilities": stats.severity_counts.critical,
            "severityCounts": stats.severity_counts,
            "partial": stats.partial,
            "failedSources": stats.failed_sources,
        });
        self.publish(project, NotificationType::Scan, message, metadata)
            .await;
    }

    async fn report_failure(&self, project: &Project, err: &ScanError) {
        let message = format!("Scan failed for project {}: {err}", project.name);
        let metadata = json!({ "projectId": project.id, "level": "error" });
        self.publish(project, NotificationType::System, message, metadata)
            .await;
    }

    async fn publish(
        &self,
        project: &Project,
        kind: NotificationType,
        message: String,
        metadata: serde_json::Value,
    ) {
        let notification = NewNotification::new(project.owner_id, kind, message, metadata);
        if let Err(e) = self.bus.publish(notification).await {
            warn!(
                project_id = project.id,
                kind = %kind,
                error = %e,
                "failed to publish scan notification"
            );
        }
    }
}

/// 최신 버전 조회. 실패는 없음으로 취급합니다.
async fn lookup_latest(
    source: Option<&dyn LatestVersionSource>,
    record: &DependencyRecord,
) -> Option<String> {
    let source = source?;
    match source.latest(record).await {
        Ok(latest) => latest,
        Err(e) => {
            debug!(
                source = source.name(),
                dependency = %record.name,
                error = %e,
                "latest version lookup failed"
            );
            None
        }
    }
}

fn reject(reason: &'static str) {
    metrics::counter!(m::SCAN_REJECTED_TOTAL, "reason" => reason).increment(1);
}

fn record_persisted(counts: &SeverityCounts) {
    for (label, n) in [
        ("critical", counts.critical),
        ("high", counts.high),
        ("medium", counts.medium),
        ("low", counts.low),
    ] {
        if n > 0 {
            metrics::counter!(m::SCAN_ISSUES_PERSISTED_TOTAL, m::LABEL_SEVERITY => label)
                .increment(n as u64);
        }
    }
}
