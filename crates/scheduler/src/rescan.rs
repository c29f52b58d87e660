//! 전체 재스캔 -- 추적 중인 모든 프로젝트를 저장된 의존성으로 다시 스캔합니다.
//!
//! 프로젝트 간 동시성은 `project_concurrency`로 제한되며, 프로젝트 내부의
//! 의존성 동시성(`scan.worker_concurrency`)과는 별개입니다. 한 프로젝트의 실패나
//! 지연은 다른 프로젝트의 재스캔을 막지 않습니다.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use vulnwatch_core::metrics as m;
use vulnwatch_core::store::{NotificationStore, ProjectStore};
use vulnwatch_core::types::ProjectId;
use vulnwatch_scanner::{ScanError, ScanOrchestrator};

use crate::error::SchedulerError;

/// 한 번의 재스캔 사이클 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescanReport {
    /// 추적 중인 프로젝트 수
    pub projects: usize,
    /// 재스캔 성공
    pub succeeded: usize,
    /// 한 번도 스캔되지 않아 건너뜀
    pub never_scanned: usize,
    /// 이미 스캔 중이라 건너뜀
    pub in_progress: usize,
    /// 실패한 프로젝트와 사유
    pub failed: Vec<(ProjectId, String)>,
}

enum ProjectOutcome {
    Succeeded,
    NeverScanned,
    InProgress,
    Failed(String),
}

/// 재스캔 실행기
pub struct RescanRunner<S: ProjectStore, N: NotificationStore> {
    orchestrator: Arc<ScanOrchestrator<S, N>>,
    concurrency: usize,
}

impl<S: ProjectStore, N: NotificationStore> RescanRunner<S, N> {
    /// 새 실행기를 생성합니다.
    pub fn new(orchestrator: Arc<ScanOrchestrator<S, N>>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    /// 모든 프로젝트를 한 번 재스캔합니다.
    ///
    /// 프로젝트 목록 조회 실패만 에러로 반환하고, 프로젝트별 실패는 리포트에 담깁니다.
    pub async fn run(&self) -> Result<RescanReport, SchedulerError> {
        let projects = self.orchestrator.store().projects().await?;
        let mut report = RescanReport {
            projects: projects.len(),
            ..RescanReport::default()
        };
        info!(projects = projects.len(), concurrency = self.concurrency, "rescan cycle started");

        let outcomes: Vec<(ProjectId, ProjectOutcome)> = futures::stream::iter(projects)
            .map(|project| async move { (project.id, self.rescan_project(project.id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (project_id, outcome) in outcomes {
            match outcome {
                ProjectOutcome::Succeeded => report.succeeded += 1,
                ProjectOutcome::NeverScanned => report.never_scanned += 1,
                ProjectOutcome::InProgress => report.in_progress += 1,
                ProjectOutcome::Failed(reason) => report.failed.push((project_id, reason)),
            }
        }
        report.failed.sort();

        metrics::counter!(m::SCHEDULER_RESCAN_CYCLES_TOTAL).increment(1);
        info!(
            projects = report.projects,
            succeeded = report.succeeded,
            skipped = report.never_scanned + report.in_progress,
            failed = report.failed.len(),
            "rescan cycle finished"
        );
        Ok(report)
    }

    async fn rescan_project(&self, project_id: ProjectId) -> ProjectOutcome {
        match self.orchestrator.store().last_scan(project_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(project_id, "project never scanned, skipping rescan");
                return ProjectOutcome::NeverScanned;
            }
            Err(e) => {
                warn!(project_id, error = %e, "failed to read last scan");
                return ProjectOutcome::Failed(e.to_string());
            }
        }

        match self.orchestrator.rescan(project_id).await {
            Ok(stats) => {
                debug!(
                    project_id,
                    vulnerabilities = stats.total_vulnerabilities,
                    partial = stats.partial,
                    "project rescanned"
                );
                ProjectOutcome::Succeeded
            }
            Err(ScanError::ScanInProgress { .. }) => {
                debug!(project_id, "scan already running, skipping rescan");
                ProjectOutcome::InProgress
            }
            Err(e) => {
                warn!(project_id, error = %e, "project rescan failed");
                ProjectOutcome::Failed(e.to_string())
            }
        }
    }

    /// 동시 재스캔 프로젝트 수
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}
