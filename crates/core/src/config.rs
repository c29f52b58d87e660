//! 설정 관리: vulnwatch.toml 파싱 및 런타임 설정
//!
//! [`VulnwatchConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`VULNWATCH_SCAN_WORKER_CONCURRENCY=4` 형식)
//! 3. 설정 파일 (`vulnwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), vulnwatch_core::error::VulnwatchError> {
//! use vulnwatch_core::config::VulnwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = VulnwatchConfig::load("vulnwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = VulnwatchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, VulnwatchError};
use crate::types::Severity;

/// 매니페스트 최대 크기 상한 (10 MiB)
pub const MAX_MANIFEST_BYTES: usize = 10 * 1024 * 1024;

/// 소스 레이트 리밋 하한 (초당 요청 수, 약 17분에 1회)
pub const MIN_SOURCE_RATE_PER_SEC: f64 = 0.001;

/// VulnWatch 통합 설정
///
/// `vulnwatch.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// HTTP API 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 스캔 설정
    #[serde(default)]
    pub scan: ScanSection,
    /// 취약점 소스 목록
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    /// 알림 버스 설정
    #[serde(default)]
    pub notify: NotifySection,
    /// 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// 이메일 전송 설정
    #[serde(default)]
    pub email: EmailConfig,
    /// 최신 버전 조회 설정
    #[serde(default)]
    pub registry: RegistrySection,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for VulnwatchConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            scan: ScanSection::default(),
            sources: default_sources(),
            notify: NotifySection::default(),
            scheduler: SchedulerSection::default(),
            email: EmailConfig::default(),
            registry: RegistrySection::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl VulnwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, VulnwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, VulnwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VulnwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                VulnwatchError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, VulnwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            VulnwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `VULNWATCH_{SECTION}_{FIELD}`.
    /// 소스 토큰은 `VULNWATCH_SOURCE_{NAME}_TOKEN`으로 주입합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "VULNWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "VULNWATCH_GENERAL_LOG_FORMAT");

        // Server
        override_bool(&mut self.server.enabled, "VULNWATCH_SERVER_ENABLED");
        override_string(&mut self.server.bind, "VULNWATCH_SERVER_BIND");

        // Scan
        override_usize(
            &mut self.scan.max_manifest_bytes,
            "VULNWATCH_SCAN_MAX_MANIFEST_BYTES",
        );
        override_usize(
            &mut self.scan.max_dependencies,
            "VULNWATCH_SCAN_MAX_DEPENDENCIES",
        );
        override_usize(
            &mut self.scan.worker_concurrency,
            "VULNWATCH_SCAN_WORKER_CONCURRENCY",
        );
        override_u64(
            &mut self.scan.source_timeout_secs,
            "VULNWATCH_SCAN_SOURCE_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.scan.retry_max_attempts,
            "VULNWATCH_SCAN_RETRY_MAX_ATTEMPTS",
        );
        override_string(
            &mut self.scan.security_alert_min_severity,
            "VULNWATCH_SCAN_SECURITY_ALERT_MIN_SEVERITY",
        );

        // Sources
        for source in &mut self.sources {
            let key = format!(
                "VULNWATCH_SOURCE_{}_TOKEN",
                source.name.to_uppercase().replace(['-', '.'], "_")
            );
            override_string(&mut source.api_token, &key);
        }

        // Notify
        override_u64(
            &mut self.notify.heartbeat_secs,
            "VULNWATCH_NOTIFY_HEARTBEAT_SECS",
        );
        override_usize(
            &mut self.notify.subscriber_buffer,
            "VULNWATCH_NOTIFY_SUBSCRIBER_BUFFER",
        );

        // Scheduler
        override_bool(&mut self.scheduler.enabled, "VULNWATCH_SCHEDULER_ENABLED");
        override_u64(
            &mut self.scheduler.rescan_interval_secs,
            "VULNWATCH_SCHEDULER_RESCAN_INTERVAL_SECS",
        );
        override_u64(
            &mut self.scheduler.digest_interval_secs,
            "VULNWATCH_SCHEDULER_DIGEST_INTERVAL_SECS",
        );
        override_usize(
            &mut self.scheduler.project_concurrency,
            "VULNWATCH_SCHEDULER_PROJECT_CONCURRENCY",
        );
        override_string(
            &mut self.scheduler.digest_boundary,
            "VULNWATCH_SCHEDULER_DIGEST_BOUNDARY",
        );

        // Email
        override_bool(&mut self.email.enabled, "VULNWATCH_EMAIL_ENABLED");
        override_string(&mut self.email.endpoint, "VULNWATCH_EMAIL_ENDPOINT");
        override_string(&mut self.email.api_token, "VULNWATCH_EMAIL_API_TOKEN");
        override_string(&mut self.email.from, "VULNWATCH_EMAIL_FROM");

        // Registry
        override_bool(&mut self.registry.enabled, "VULNWATCH_REGISTRY_ENABLED");

        // Metrics
        override_bool(&mut self.metrics.enabled, "VULNWATCH_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "VULNWATCH_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "VULNWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), VulnwatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.server.enabled && self.server.bind.is_empty() {
            return Err(invalid("server.bind", "must not be empty when server is enabled"));
        }

        self.scan.validate()?;

        let mut names = HashSet::new();
        for (idx, source) in self.sources.iter().enumerate() {
            if !names.insert(source.name.as_str()) {
                return Err(invalid(
                    &format!("sources[{idx}].name"),
                    format!("duplicate source name '{}'", source.name),
                ));
            }
            source.validate(idx)?;
        }

        if self.notify.heartbeat_secs == 0 || self.notify.heartbeat_secs > 300 {
            return Err(invalid("notify.heartbeat_secs", "must be between 1 and 300"));
        }
        if self.notify.subscriber_buffer == 0 {
            return Err(invalid("notify.subscriber_buffer", "must be greater than 0"));
        }

        self.scheduler.validate()?;

        if self.email.enabled && self.email.endpoint.is_empty() {
            return Err(invalid(
                "email.endpoint",
                "must not be empty when email is enabled",
            ));
        }

        self.registry.validate()?;

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be greater than 0"));
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// HTTP API 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8080".to_owned(),
        }
    }
}

/// 스캔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// 업로드 매니페스트 최대 크기 (바이트)
    pub max_manifest_bytes: usize,
    /// 매니페스트당 최대 의존성 수
    pub max_dependencies: usize,
    /// 의존성 해석 워커 수 (프로젝트 크기와 무관하게 고정)
    pub worker_concurrency: usize,
    /// 소스 호출 1회 타임아웃 (초)
    pub source_timeout_secs: u64,
    /// 재시도 기본 지연 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 재시도 지연 상한 (밀리초)
    pub retry_max_delay_ms: u64,
    /// 소스 호출 최대 시도 횟수
    pub retry_max_attempts: u32,
    /// 보안 알림을 만들 최소 심각도 (low, medium, high, critical)
    pub security_alert_min_severity: String,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            max_manifest_bytes: MAX_MANIFEST_BYTES,
            max_dependencies: 5_000,
            worker_concurrency: 8,
            source_timeout_secs: 20,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            retry_max_attempts: 4,
            security_alert_min_severity: "high".to_owned(),
        }
    }
}

impl ScanSection {
    fn validate(&self) -> Result<(), VulnwatchError> {
        if self.max_manifest_bytes == 0 || self.max_manifest_bytes > MAX_MANIFEST_BYTES {
            return Err(invalid(
                "scan.max_manifest_bytes",
                format!("must be between 1 and {MAX_MANIFEST_BYTES}"),
            ));
        }
        if self.max_dependencies == 0 {
            return Err(invalid("scan.max_dependencies", "must be greater than 0"));
        }
        if self.worker_concurrency == 0 || self.worker_concurrency > 64 {
            return Err(invalid("scan.worker_concurrency", "must be between 1 and 64"));
        }
        if self.source_timeout_secs == 0 {
            return Err(invalid("scan.source_timeout_secs", "must be greater than 0"));
        }
        if self.retry_max_attempts == 0 || self.retry_max_attempts > 10 {
            return Err(invalid("scan.retry_max_attempts", "must be between 1 and 10"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(invalid(
                "scan.retry_max_delay_ms",
                "must not be smaller than retry_base_delay_ms",
            ));
        }
        if Severity::from_str_loose(&self.security_alert_min_severity).is_none() {
            return Err(invalid(
                "scan.security_alert_min_severity",
                "must be one of: low, medium, high, critical",
            ));
        }
        Ok(())
    }
}

/// 취약점 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 소스 이름 (레이트 리미터 키, 로그/메트릭 레이블)
    pub name: String,
    /// 소스 종류 (osv, nvd, local)
    pub kind: String,
    /// 활성화 여부
    pub enabled: bool,
    /// API 기본 URL
    pub base_url: String,
    /// 인증 토큰 (비어 있으면 미사용)
    pub api_token: String,
    /// 초당 허용 요청 수 (토큰 버킷 보충 속도)
    pub rate_per_sec: f64,
    /// 버킷 용량
    pub burst: u32,
    /// 로컬 DB 파일 경로 (kind = "local")
    pub path: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "osv".to_owned(),
            kind: "osv".to_owned(),
            enabled: true,
            base_url: "https://api.osv.dev".to_owned(),
            api_token: String::new(),
            rate_per_sec: 10.0,
            burst: 10,
            path: String::new(),
        }
    }
}

impl SourceConfig {
    fn validate(&self, idx: usize) -> Result<(), VulnwatchError> {
        let field = |name: &str| format!("sources[{idx}].{name}");

        if self.name.trim().is_empty() {
            return Err(invalid(&field("name"), "must not be empty"));
        }
        let valid_kinds = ["osv", "nvd", "local"];
        if !valid_kinds.contains(&self.kind.as_str()) {
            return Err(invalid(
                &field("kind"),
                format!("must be one of: {}", valid_kinds.join(", ")),
            ));
        }
        if !self.enabled {
            return Ok(());
        }
        if !self.rate_per_sec.is_finite() || self.rate_per_sec < MIN_SOURCE_RATE_PER_SEC {
            return Err(invalid(
                &field("rate_per_sec"),
                format!("must be a finite value of at least {MIN_SOURCE_RATE_PER_SEC}"),
            ));
        }
        if self.burst == 0 {
            return Err(invalid(&field("burst"), "must be greater than 0"));
        }
        if self.kind == "local" {
            if self.path.is_empty() {
                return Err(invalid(&field("path"), "local source requires a path"));
            }
        } else if self.base_url.is_empty() {
            return Err(invalid(&field("base_url"), "must not be empty"));
        }
        Ok(())
    }

    /// API 토큰 (비어 있으면 `None`)
    pub fn token(&self) -> Option<&str> {
        if self.api_token.is_empty() {
            None
        } else {
            Some(self.api_token.as_str())
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::default()]
}

/// 알림 버스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// 스트림 heartbeat 주기 (초)
    pub heartbeat_secs: u64,
    /// 구독자별 채널 버퍼 크기
    pub subscriber_buffer: usize,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            subscriber_buffer: 64,
        }
    }
}

/// 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 전체 재스캔 주기 (초)
    pub rescan_interval_secs: u64,
    /// 다이제스트 평가 주기 (초)
    pub digest_interval_secs: u64,
    /// 재스캔 시 동시에 처리할 프로젝트 수
    pub project_concurrency: usize,
    /// 다이제스트 경계 규칙 (rolling, calendar)
    pub digest_boundary: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            rescan_interval_secs: 86_400,
            digest_interval_secs: 3_600,
            project_concurrency: 2,
            digest_boundary: "rolling".to_owned(),
        }
    }
}

impl SchedulerSection {
    fn validate(&self) -> Result<(), VulnwatchError> {
        if self.rescan_interval_secs < 60 {
            return Err(invalid("scheduler.rescan_interval_secs", "must be at least 60"));
        }
        if self.digest_interval_secs < 60 {
            return Err(invalid("scheduler.digest_interval_secs", "must be at least 60"));
        }
        if self.project_concurrency == 0 || self.project_concurrency > 32 {
            return Err(invalid(
                "scheduler.project_concurrency",
                "must be between 1 and 32",
            ));
        }
        let valid_rules = ["rolling", "calendar"];
        if !valid_rules.contains(&self.digest_boundary.as_str()) {
            return Err(invalid(
                "scheduler.digest_boundary",
                format!("must be one of: {}", valid_rules.join(", ")),
            ));
        }
        Ok(())
    }
}

/// 이메일 전송 설정
///
/// 비활성화 상태면 메일은 로그로만 남습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 메일 전송 웹훅 URL
    pub endpoint: String,
    /// 웹훅 bearer 토큰
    pub api_token: String,
    /// 발신 주소
    pub from: String,
    /// 전송 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_token: String::new(),
            from: "alerts@vulnwatch.local".to_owned(),
            timeout_secs: 10,
        }
    }
}

/// 패키지 레지스트리 최신 버전 조회 설정
///
/// 비활성화 상태면 `latestVersion`은 비어 있고 어떤 의존성도 outdated로
/// 표시되지 않습니다. 나열되지 않은 에코시스템은 조회하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// 활성화 여부
    pub enabled: bool,
    /// npm 레지스트리 URL
    pub npm_url: String,
    /// PyPI URL
    pub pypi_url: String,
    /// crates.io URL
    pub crates_url: String,
    /// RubyGems URL
    pub rubygems_url: String,
    /// 조회 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            enabled: false,
            npm_url: "https://registry.npmjs.org".to_owned(),
            pypi_url: "https://pypi.org".to_owned(),
            crates_url: "https://crates.io".to_owned(),
            rubygems_url: "https://rubygems.org".to_owned(),
            timeout_secs: 10,
        }
    }
}

impl RegistrySection {
    fn validate(&self) -> Result<(), VulnwatchError> {
        if !self.enabled {
            return Ok(());
        }
        for (field, url) in [
            ("registry.npm_url", &self.npm_url),
            ("registry.pypi_url", &self.pypi_url),
            ("registry.crates_url", &self.crates_url),
            ("registry.rubygems_url", &self.rubygems_url),
        ] {
            if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid(field, "must be an http(s) URL or empty"));
            }
        }
        if self.timeout_secs == 0 {
            return Err(invalid("registry.timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리스닝 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> VulnwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = VulnwatchConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.scan.max_manifest_bytes, MAX_MANIFEST_BYTES);
        assert_eq!(config.scan.worker_concurrency, 8);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].kind, "osv");
        assert_eq!(config.scheduler.digest_boundary, "rolling");
        assert!(!config.email.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        VulnwatchConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = VulnwatchConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.sources[0].base_url, "https://api.osv.dev");
    }

    #[test]
    fn sources_array_replaces_default() {
        let toml = r#"
[[sources]]
name = "nvd"
kind = "nvd"
base_url = "https://services.nvd.nist.gov/rest/json/cves/2.0"
rate_per_sec = 0.16
burst = 5

[[sources]]
name = "offline"
kind = "local"
path = "/var/lib/vulnwatch/advisories.json"
"#;
        let config = VulnwatchConfig::parse(toml).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].name, "nvd");
        assert!(config.sources[1].enabled);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = VulnwatchConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            VulnwatchError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_manifest_limit() {
        let mut config = VulnwatchConfig::default();
        config.scan.max_manifest_bytes = MAX_MANIFEST_BYTES + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_manifest_bytes"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = VulnwatchConfig::default();
        config.scan.worker_concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_concurrency"));
    }

    #[test]
    fn validate_rejects_duplicate_source_names() {
        let mut config = VulnwatchConfig::default();
        config.sources.push(SourceConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate source name"));
    }

    #[test]
    fn validate_rejects_local_source_without_path() {
        let mut config = VulnwatchConfig::default();
        config.sources[0].kind = "local".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn validate_skips_rate_check_for_disabled_source() {
        let mut config = VulnwatchConfig::default();
        config.sources[0].enabled = false;
        config.sources[0].rate_per_sec = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_vanishing_rate() {
        let mut config = VulnwatchConfig::default();
        config.sources[0].rate_per_sec = 1e-30;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rate_per_sec"));

        config.sources[0].rate_per_sec = f64::INFINITY;
        assert!(config.validate().is_err());

        config.sources[0].rate_per_sec = MIN_SOURCE_RATE_PER_SEC;
        config.validate().unwrap();
    }

    #[test]
    fn validate_registry_urls_only_when_enabled() {
        let mut config = VulnwatchConfig::default();
        config.registry.npm_url = "registry.npmjs.org".to_owned();
        config.validate().unwrap();

        config.registry.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registry.npm_url"));

        config.registry.npm_url = String::new();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_digest_boundary() {
        let mut config = VulnwatchConfig::default();
        config.scheduler.digest_boundary = "lunar".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("digest_boundary"));
    }

    #[test]
    fn validate_rejects_unknown_min_severity() {
        let mut config = VulnwatchConfig::default();
        config.scan.security_alert_min_severity = "severe".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_enabled_email_without_endpoint() {
        let mut config = VulnwatchConfig::default();
        config.email.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("email.endpoint"));
    }

    #[test]
    #[serial]
    fn env_overrides_scan_and_source_token() {
        let mut config = VulnwatchConfig::default();
        // SAFETY: serial_test로 환경변수 조작 테스트를 직렬화합니다.
        unsafe {
            std::env::set_var("VULNWATCH_SCAN_WORKER_CONCURRENCY", "3");
            std::env::set_var("VULNWATCH_SOURCE_OSV_TOKEN", "secret");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("VULNWATCH_SCAN_WORKER_CONCURRENCY");
            std::env::remove_var("VULNWATCH_SOURCE_OSV_TOKEN");
        }
        assert_eq!(config.scan.worker_concurrency, 3);
        assert_eq!(config.sources[0].token(), Some("secret"));
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        let mut val = 8usize;
        // SAFETY: serial_test로 환경변수 조작 테스트를 직렬화합니다.
        unsafe { std::env::set_var("TEST_VULNWATCH_USIZE_BAD", "eight") };
        override_usize(&mut val, "TEST_VULNWATCH_USIZE_BAD");
        unsafe { std::env::remove_var("TEST_VULNWATCH_USIZE_BAD") };
        assert_eq!(val, 8);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = VulnwatchConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = VulnwatchConfig::parse(&toml_str).unwrap();
        assert_eq!(config.scan.retry_max_attempts, parsed.scan.retry_max_attempts);
        assert_eq!(config.sources[0].name, parsed.sources[0].name);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = VulnwatchConfig::from_file("/nonexistent/path/vulnwatch.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VulnwatchError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
