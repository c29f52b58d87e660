//! 스케줄러 설정
//!
//! [`SchedulerConfig`]는 core의 [`SchedulerSection`](vulnwatch_core::config::SchedulerSection)을
//! 런타임 타입으로 옮긴 것입니다.

use std::time::Duration;

use vulnwatch_core::config::VulnwatchConfig;

use crate::boundary::BoundaryRule;
use crate::error::SchedulerError;

/// 동시 재스캔 프로젝트 수 상한
const MAX_PROJECT_CONCURRENCY: usize = 32;

/// 스케줄러 런타임 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 루프 활성화 여부 (비활성이어도 수동 트리거는 동작)
    pub enabled: bool,
    /// 전체 재스캔 주기
    pub rescan_interval: Duration,
    /// 다이제스트 평가 주기
    pub digest_interval: Duration,
    /// 재스캔 시 동시에 처리할 프로젝트 수
    pub project_concurrency: usize,
    /// 다이제스트 경계 규칙
    pub boundary: BoundaryRule,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rescan_interval: Duration::from_secs(86_400),
            digest_interval: Duration::from_secs(3_600),
            project_concurrency: 2,
            boundary: BoundaryRule::Rolling,
        }
    }
}

impl SchedulerConfig {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &VulnwatchConfig) -> Self {
        let section = &core.scheduler;
        Self {
            enabled: section.enabled,
            rescan_interval: Duration::from_secs(section.rescan_interval_secs),
            digest_interval: Duration::from_secs(section.digest_interval_secs),
            project_concurrency: section.project_concurrency,
            boundary: BoundaryRule::from_str_loose(&section.digest_boundary).unwrap_or_default(),
        }
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.rescan_interval.is_zero() {
            return Err(config_err("rescan_interval", "must be greater than 0"));
        }
        if self.digest_interval.is_zero() {
            return Err(config_err("digest_interval", "must be greater than 0"));
        }
        if self.project_concurrency == 0 || self.project_concurrency > MAX_PROJECT_CONCURRENCY {
            return Err(config_err(
                "project_concurrency",
                format!("must be 1-{MAX_PROJECT_CONCURRENCY}"),
            ));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> SchedulerError {
    SchedulerError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// [`SchedulerConfig`] 빌더
#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// 기본값으로 시작합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프 활성화 여부
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// 재스캔 주기
    pub fn rescan_interval(mut self, interval: Duration) -> Self {
        self.config.rescan_interval = interval;
        self
    }

    /// 다이제스트 평가 주기
    pub fn digest_interval(mut self, interval: Duration) -> Self {
        self.config.digest_interval = interval;
        self
    }

    /// 동시 재스캔 프로젝트 수
    pub fn project_concurrency(mut self, concurrency: usize) -> Self {
        self.config.project_concurrency = concurrency;
        self
    }

    /// 다이제스트 경계 규칙
    pub fn boundary(mut self, rule: BoundaryRule) -> Self {
        self.config.boundary = rule;
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<SchedulerConfig, SchedulerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
