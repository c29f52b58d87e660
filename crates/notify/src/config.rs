//! 알림 버스 설정
//!
//! core의 [`NotifySection`](vulnwatch_core::config::NotifySection)을 런타임 타입으로 옮깁니다.

use std::time::Duration;

use vulnwatch_core::config::VulnwatchConfig;
use vulnwatch_core::error::{ConfigError, VulnwatchError};

/// heartbeat 주기 상한
pub const MAX_HEARTBEAT: Duration = Duration::from_secs(300);

/// 알림 버스 런타임 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// 스트림 heartbeat 주기
    pub heartbeat: Duration,
    /// 구독자별 채널 버퍼 크기
    pub subscriber_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            subscriber_buffer: 64,
        }
    }
}

impl BusConfig {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &VulnwatchConfig) -> Self {
        Self {
            heartbeat: Duration::from_secs(core.notify.heartbeat_secs),
            subscriber_buffer: core.notify.subscriber_buffer,
        }
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<(), VulnwatchError> {
        if self.heartbeat.is_zero() || self.heartbeat > MAX_HEARTBEAT {
            return Err(ConfigError::InvalidValue {
                field: "notify.heartbeat_secs".to_owned(),
                reason: format!("must be 1-{}", MAX_HEARTBEAT.as_secs()),
            }
            .into());
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notify.subscriber_buffer".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }
        Ok(())
    }
}

/// [`BusConfig`] 빌더
#[derive(Debug, Default)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    /// 기본값으로 시작합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// heartbeat 주기
    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    /// 구독자 채널 버퍼 크기
    pub fn subscriber_buffer(mut self, buffer: usize) -> Self {
        self.config.subscriber_buffer = buffer;
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<BusConfig, VulnwatchError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
