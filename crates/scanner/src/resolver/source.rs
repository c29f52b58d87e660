//! 취약점 소스 인터페이스와 설정 기반 생성
//!
//! 소스는 닫힌 종류 집합([`SourceKind`])에서 설정으로 선택되며, 모두
//! [`AdvisorySource`] 하나의 능력 인터페이스로 호출됩니다.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use vulnwatch_core::config::SourceConfig;
use vulnwatch_core::pipeline::BoxFuture;
use vulnwatch_core::types::DependencyRecord;

use crate::error::{ScanError, SourceError};
use crate::resolver::VulnerabilityRecord;
use crate::resolver::local::LocalDbSource;
use crate::resolver::nvd::NvdSource;
use crate::resolver::osv::OsvSource;

/// 외부 취약점 소스
///
/// 구현체는 상태 없이 재사용 가능해야 하며, 레이트 리밋과 재시도는
/// [`Resolver`](crate::resolver::Resolver)가 바깥에서 적용합니다.
pub trait AdvisorySource: Send + Sync {
    /// 소스 이름 (레이트 리미터 키, 메트릭 레이블)
    fn name(&self) -> &str;

    /// 의존성 하나에 대한 취약점 레코드를 조회합니다.
    fn query<'a>(
        &'a self,
        dependency: &'a DependencyRecord,
    ) -> BoxFuture<'a, Result<Vec<VulnerabilityRecord>, SourceError>>;
}

/// 소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// OSV.dev 질의 API
    Osv,
    /// NVD CVE API 2.0
    Nvd,
    /// 로컬 JSON 취약점 DB
    Local,
}

impl SourceKind {
    /// 설정 문자열을 해석합니다.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "osv" => Some(Self::Osv),
            "nvd" => Some(Self::Nvd),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// 활성화된 소스 설정마다 소스를 생성합니다.
///
/// 로컬 DB는 이 시점에 파일을 읽습니다 (블로킹 I/O).
pub fn build_sources(
    configs: &[SourceConfig],
    timeout: Duration,
) -> Result<Vec<Arc<dyn AdvisorySource>>, ScanError> {
    let mut sources: Vec<Arc<dyn AdvisorySource>> = Vec::new();
    for (idx, config) in configs.iter().enumerate().filter(|(_, c)| c.enabled) {
        let config_err = |reason: String| ScanError::Config {
            field: format!("sources[{idx}]"),
            reason,
        };
        let kind = SourceKind::parse(&config.kind)
            .ok_or_else(|| config_err(format!("unknown source kind '{}'", config.kind)))?;

        let source: Arc<dyn AdvisorySource> = match kind {
            SourceKind::Osv => Arc::new(
                OsvSource::new(&config.name, &config.base_url, timeout)
                    .map_err(|e| config_err(e.to_string()))?,
            ),
            SourceKind::Nvd => Arc::new(
                NvdSource::new(&config.name, &config.base_url, config.token(), timeout)
                    .map_err(|e| config_err(e.to_string()))?,
            ),
            SourceKind::Local => Arc::new(
                LocalDbSource::load(&config.name, &config.path)
                    .map_err(|e| config_err(e.to_string()))?,
            ),
        };
        tracing::info!(source = %config.name, kind = ?kind, "vulnerability source configured");
        sources.push(source);
    }
    Ok(sources)
}

/// 공통 HTTP 클라이언트 (호출 타임아웃 포함)
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("vulnwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::Unavailable(e.to_string()))
}

/// 상태 코드를 분류하고 성공 응답을 JSON으로 디코딩합니다.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::from_status(status.as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()))
}

/// 정확한 버전인지 (범위 제약이나 `*`가 아닌지)
pub(crate) fn is_concrete_version(version: &str) -> bool {
    let v = version.trim();
    !v.is_empty()
        && v != "*"
        && !v.contains(['<', '>', '=', '~', '^', ',', ' ', '|', '*'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_parse() {
        assert_eq!(SourceKind::parse("OSV"), Some(SourceKind::Osv));
        assert_eq!(SourceKind::parse(" local "), Some(SourceKind::Local));
        assert_eq!(SourceKind::parse("snyk"), None);
    }

    #[test]
    fn concrete_versions() {
        assert!(is_concrete_version("4.17.15"));
        assert!(is_concrete_version("v1.6.0"));
        assert!(is_concrete_version("5.2.0.RELEASE"));
        assert!(!is_concrete_version("*"));
        assert!(!is_concrete_version(">=2.25,<3"));
        assert!(!is_concrete_version("~=1.21.0"));
    }

    #[test]
    fn disabled_sources_are_skipped() {
        let configs = vec![SourceConfig {
            enabled: false,
            ..SourceConfig::default()
        }];
        let sources = build_sources(&configs, Duration::from_secs(1)).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn missing_local_db_is_config_error() {
        let configs = vec![SourceConfig {
            name: "offline".to_owned(),
            kind: "local".to_owned(),
            path: "/nonexistent/vulnwatch/advisories.json".to_owned(),
            ..SourceConfig::default()
        }];
        let err = build_sources(&configs, Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, ScanError::Config { .. }));
    }
}
