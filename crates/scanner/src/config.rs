//! 스캐너 설정
//!
//! [`ScanConfig`]는 core의 [`ScanSection`](vulnwatch_core::config::ScanSection)을
//! 런타임 타입(`Duration`, `Severity`)으로 옮긴 것입니다.
//!
//! # 사용 예시
//!
//! ```
//! use vulnwatch_scanner::ScanConfigBuilder;
//!
//! let config = ScanConfigBuilder::new()
//!     .worker_concurrency(4)
//!     .max_dependencies(1000)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.worker_concurrency, 4);
//! ```

use std::time::Duration;

use vulnwatch_core::config::{MAX_MANIFEST_BYTES, VulnwatchConfig};
use vulnwatch_core::types::Severity;

use crate::error::ScanError;
use crate::resolver::RetryPolicy;

/// 스캐너 런타임 설정
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// 업로드 매니페스트 최대 크기 (바이트)
    pub max_manifest_bytes: usize,
    /// 매니페스트당 최대 의존성 수
    pub max_dependencies: usize,
    /// 프로젝트당 해석 워커 수
    pub worker_concurrency: usize,
    /// 소스 호출 타임아웃
    pub source_timeout: Duration,
    /// 소스 재시도 정책
    pub retry: RetryPolicy,
    /// 보안 알림 최소 심각도
    pub security_alert_min_severity: Severity,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_manifest_bytes: MAX_MANIFEST_BYTES,
            max_dependencies: 5_000,
            worker_concurrency: 8,
            source_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            security_alert_min_severity: Severity::High,
        }
    }
}

impl ScanConfig {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &VulnwatchConfig) -> Self {
        let scan = &core.scan;
        Self {
            max_manifest_bytes: scan.max_manifest_bytes,
            max_dependencies: scan.max_dependencies,
            worker_concurrency: scan.worker_concurrency,
            source_timeout: Duration::from_secs(scan.source_timeout_secs),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(scan.retry_base_delay_ms),
                max_delay: Duration::from_millis(scan.retry_max_delay_ms),
                max_attempts: scan.retry_max_attempts,
            },
            security_alert_min_severity: Severity::from_str_loose(&scan.security_alert_min_severity)
                .unwrap_or(Severity::High),
        }
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.max_manifest_bytes == 0 || self.max_manifest_bytes > MAX_MANIFEST_BYTES {
            return Err(config_err(
                "max_manifest_bytes",
                format!("must be 1-{MAX_MANIFEST_BYTES}"),
            ));
        }
        if self.max_dependencies == 0 {
            return Err(config_err("max_dependencies", "must be greater than 0"));
        }
        if self.worker_concurrency == 0 || self.worker_concurrency > 64 {
            return Err(config_err("worker_concurrency", "must be 1-64"));
        }
        if self.source_timeout.is_zero() {
            return Err(config_err("source_timeout", "must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(config_err("retry.max_attempts", "must be greater than 0"));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> ScanError {
    ScanError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// [`ScanConfig`] 빌더
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// 기본값으로 시작합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 매니페스트 최대 크기
    pub fn max_manifest_bytes(mut self, bytes: usize) -> Self {
        self.config.max_manifest_bytes = bytes;
        self
    }

    /// 최대 의존성 수
    pub fn max_dependencies(mut self, max: usize) -> Self {
        self.config.max_dependencies = max;
        self
    }

    /// 워커 수
    pub fn worker_concurrency(mut self, workers: usize) -> Self {
        self.config.worker_concurrency = workers;
        self
    }

    /// 소스 호출 타임아웃
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.config.source_timeout = timeout;
        self
    }

    /// 재시도 정책
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// 보안 알림 최소 심각도
    pub fn security_alert_min_severity(mut self, severity: Severity) -> Self {
        self.config.security_alert_min_severity = severity;
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<ScanConfig, ScanError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ScanConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_converts_units() {
        let mut core = VulnwatchConfig::default();
        core.scan.source_timeout_secs = 5;
        core.scan.retry_base_delay_ms = 100;
        core.scan.security_alert_min_severity = "critical".to_owned();

        let config = ScanConfig::from_core(&core);
        assert_eq!(config.source_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.security_alert_min_severity, Severity::Critical);
    }

    #[test]
    fn builder_rejects_zero_workers() {
        let err = ScanConfigBuilder::new().worker_concurrency(0).build().unwrap_err();
        assert!(err.to_string().contains("worker_concurrency"));
    }

    #[test]
    fn oversized_limit_rejected() {
        let err = ScanConfigBuilder::new()
            .max_manifest_bytes(MAX_MANIFEST_BYTES + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanError::Config { .. }));
    }
}
