//! 알림 스케줄러 -- 재스캔 루프와 다이제스트 루프의 생명주기 관리
//!
//! [`AlertScheduler`]는 core의 [`Pipeline`] trait을 구현하여
//! 데몬에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//!
//! ```text
//! interval(rescan_interval) --> RescanRunner --> ScanOrchestrator::rescan (project_concurrency)
//!
//! interval(digest_interval) --> DigestRunner --> pending_digest --> Mailer --> mark_delivered
//!                                                                                |
//!                                                                 NotificationBus (system)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use vulnwatch_core::error::{PipelineError, VulnwatchError};
use vulnwatch_core::pipeline::{HealthStatus, Pipeline};
use vulnwatch_core::store::{NotificationStore, ProjectStore};
use vulnwatch_scanner::ScanOrchestrator;

use crate::config::SchedulerConfig;
use crate::digest::{DigestReport, DigestRunner};
use crate::error::SchedulerError;
use crate::rescan::{RescanReport, RescanRunner};

/// 스케줄러 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum SchedulerState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 알림 스케줄러
///
/// 두 개의 고정 주기 루프(재스캔, 다이제스트)를 띄우고 `stop()`에서 중단합니다.
/// `run_rescan_once`/`run_digest_once`로 루프와 무관하게 수동 실행할 수 있습니다.
pub struct AlertScheduler<S: ProjectStore, N: NotificationStore> {
    config: SchedulerConfig,
    state: SchedulerState,
    rescan: Arc<RescanRunner<S, N>>,
    digest: Arc<DigestRunner<N>>,
    tasks: Vec<JoinHandle<()>>,
    rescan_cycles: Arc<AtomicU64>,
    digest_cycles: Arc<AtomicU64>,
    last_cycle_failed: Arc<AtomicBool>,
}

impl<S: ProjectStore, N: NotificationStore> AlertScheduler<S, N> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            SchedulerState::Initialized => "initialized",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        }
    }

    /// 완료된 재스캔 사이클 수
    pub fn rescan_cycles(&self) -> u64 {
        self.rescan_cycles.load(Ordering::Relaxed)
    }

    /// 완료된 다이제스트 사이클 수
    pub fn digest_cycles(&self) -> u64 {
        self.digest_cycles.load(Ordering::Relaxed)
    }

    /// 설정
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 재스캔을 한 번 실행합니다 (수동 트리거용).
    pub async fn run_rescan_once(&self) -> Result<RescanReport, SchedulerError> {
        let result = self.rescan.run().await;
        record_cycle(&result, &self.rescan_cycles, &self.last_cycle_failed);
        result
    }

    /// 주어진 시각 기준으로 다이제스트를 한 번 실행합니다 (수동 트리거용).
    pub async fn run_digest_once(
        &self,
        now: chrono::DateTime<Utc>,
    ) -> Result<DigestReport, SchedulerError> {
        let result = self.digest.run(now).await;
        record_cycle(&result, &self.digest_cycles, &self.last_cycle_failed);
        result
    }

    fn spawn_rescan_loop(&self) -> JoinHandle<()> {
        let runner = Arc::clone(&self.rescan);
        let cycles = Arc::clone(&self.rescan_cycles);
        let failed = Arc::clone(&self.last_cycle_failed);
        let period = self.config.rescan_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = period.as_secs(), "rescan loop started");

            loop {
                interval.tick().await;
                let result = runner.run().await;
                if let Err(e) = &result {
                    warn!(error = %e, "rescan cycle failed");
                }
                record_cycle(&result, &cycles, &failed);
            }
        })
    }

    fn spawn_digest_loop(&self) -> JoinHandle<()> {
        let runner = Arc::clone(&self.digest);
        let cycles = Arc::clone(&self.digest_cycles);
        let failed = Arc::clone(&self.last_cycle_failed);
        let period = self.config.digest_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_secs = period.as_secs(),
                boundary = %runner.boundary(),
                "digest loop started"
            );

            loop {
                interval.tick().await;
                let result = runner.run(Utc::now()).await;
                if let Err(e) = &result {
                    warn!(error = %e, "digest cycle failed");
                }
                record_cycle(&result, &cycles, &failed);
            }
        })
    }
}

fn record_cycle<T>(
    result: &Result<T, SchedulerError>,
    cycles: &AtomicU64,
    last_cycle_failed: &AtomicBool,
) {
    cycles.fetch_add(1, Ordering::Relaxed);
    last_cycle_failed.store(result.is_err(), Ordering::Relaxed);
}

impl<S: ProjectStore, N: NotificationStore> Pipeline for AlertScheduler<S, N> {
    async fn start(&mut self) -> Result<(), VulnwatchError> {
        if self.state == SchedulerState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!("starting alert scheduler");

        if self.config.enabled {
            let rescan = self.spawn_rescan_loop();
            let digest = self.spawn_digest_loop();
            self.tasks.push(rescan);
            self.tasks.push(digest);
        } else {
            info!("scheduler loops disabled, manual triggers only");
        }

        self.state = SchedulerState::Running;
        info!(tasks = self.tasks.len(), "alert scheduler started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), VulnwatchError> {
        if self.state != SchedulerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping alert scheduler");

        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }

        self.state = SchedulerState::Stopped;
        info!("alert scheduler stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            SchedulerState::Running => {
                if self.last_cycle_failed.load(Ordering::Relaxed) {
                    HealthStatus::Degraded("last scheduler cycle failed".to_owned())
                } else if !self.config.enabled {
                    HealthStatus::Degraded("scheduler loops disabled".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            SchedulerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            SchedulerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 알림 스케줄러 빌더
pub struct AlertSchedulerBuilder<S: ProjectStore, N: NotificationStore> {
    orchestrator: Arc<ScanOrchestrator<S, N>>,
    config: SchedulerConfig,
}

impl<S: ProjectStore, N: NotificationStore> AlertSchedulerBuilder<S, N> {
    /// 재스캔에 사용할 오케스트레이터로 빌더를 생성합니다.
    ///
    /// 다이제스트는 오케스트레이터의 알림 버스(저장소, 메일러)를 공유합니다.
    pub fn new(orchestrator: Arc<ScanOrchestrator<S, N>>) -> Self {
        Self {
            orchestrator,
            config: SchedulerConfig::default(),
        }
    }

    /// 스케줄러 설정을 지정합니다.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// 스케줄러를 빌드합니다.
    pub fn build(self) -> Result<AlertScheduler<S, N>, SchedulerError> {
        self.config.validate()?;

        let bus = Arc::clone(self.orchestrator.bus());
        let rescan = RescanRunner::new(self.orchestrator, self.config.project_concurrency);
        let digest = DigestRunner::new(bus, self.config.boundary);

        Ok(AlertScheduler {
            config: self.config,
            state: SchedulerState::Initialized,
            rescan: Arc::new(rescan),
            digest: Arc::new(digest),
            tasks: Vec::new(),
            rescan_cycles: Arc::new(AtomicU64::new(0)),
            digest_cycles: Arc::new(AtomicU64::new(0)),
            last_cycle_failed: Arc::new(AtomicBool::new(false)),
        })
    }
}
