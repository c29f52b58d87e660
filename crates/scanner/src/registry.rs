//! 패키지 레지스트리 최신 버전 조회
//!
//! 스캔 중 의존성마다 레지스트리의 최신 안정 버전을 조회해 리포트의
//! outdated 표시에 사용합니다. 조회 실패는 스캔 결과에 영향을 주지 않습니다
//! (최신 버전 없음으로 기록).
//!
//! | 에코시스템 | 요청 | 필드 |
//! |-----------|------|------|
//! | npm | `GET {npm_url}/{name}/latest` | `version` |
//! | PyPI | `GET {pypi_url}/pypi/{name}/json` | `info.version` |
//! | crates.io | `GET {crates_url}/api/v1/crates/{name}` | `crate.max_stable_version` |
//! | RubyGems | `GET {rubygems_url}/api/v1/gems/{name}.json` | `version` |

use std::cmp::Ordering;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use vulnwatch_core::config::RegistrySection;
use vulnwatch_core::pipeline::BoxFuture;
use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::SourceError;
use crate::resolver::local::compare;
use crate::resolver::source::{decode_json, http_client};

/// 최신 버전 조회 인터페이스
pub trait LatestVersionSource: Send + Sync {
    /// 이름 (로그용)
    fn name(&self) -> &str;

    /// 의존성의 최신 버전. 지원하지 않는 에코시스템이면 `None`.
    fn latest<'a>(
        &'a self,
        dependency: &'a DependencyRecord,
    ) -> BoxFuture<'a, Result<Option<String>, SourceError>>;
}

/// `current`가 `latest`보다 낮은 버전인지
pub fn is_outdated(current: &str, latest: &str) -> bool {
    let current = current.trim().trim_start_matches('v');
    compare(current, latest) == Ordering::Less
}

/// 공개 레지스트리 HTTP 조회
pub struct HttpRegistry {
    config: RegistrySection,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct VersionField {
    version: String,
}

#[derive(Deserialize)]
struct PypiResponse {
    info: VersionField,
}

#[derive(Deserialize)]
struct CratesResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

#[derive(Deserialize)]
struct CrateInfo {
    max_stable_version: Option<String>,
}

impl HttpRegistry {
    pub fn new(config: RegistrySection) -> Result<Self, SourceError> {
        let client = http_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    /// 조회 URL. 지원하지 않거나 URL이 비어 있는 에코시스템이면 `None`.
    fn url_for(&self, dependency: &DependencyRecord) -> Option<String> {
        let (base, path) = match dependency.ecosystem {
            Ecosystem::Npm => (&self.config.npm_url, format!("{}/latest", dependency.name)),
            Ecosystem::PyPI => (&self.config.pypi_url, format!("pypi/{}/json", dependency.name)),
            Ecosystem::Crates => (
                &self.config.crates_url,
                format!("api/v1/crates/{}", dependency.name),
            ),
            Ecosystem::RubyGems => (
                &self.config.rubygems_url,
                format!("api/v1/gems/{}.json", dependency.name),
            ),
            Ecosystem::Maven | Ecosystem::Go | Ecosystem::Packagist => return None,
        };
        if base.is_empty() {
            return None;
        }
        Some(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self.client.get(url).send().await?;
        decode_json(response).await
    }

    async fn lookup(&self, dependency: &DependencyRecord) -> Result<Option<String>, SourceError> {
        let Some(url) = self.url_for(dependency) else {
            return Ok(None);
        };
        let latest = match dependency.ecosystem {
            Ecosystem::PyPI => Some(self.fetch::<PypiResponse>(&url).await?.info.version),
            Ecosystem::Crates => self.fetch::<CratesResponse>(&url).await?.krate.max_stable_version,
            _ => Some(self.fetch::<VersionField>(&url).await?.version),
        };
        Ok(latest.filter(|v| !v.is_empty()))
    }
}

impl LatestVersionSource for HttpRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    fn latest<'a>(
        &'a self,
        dependency: &'a DependencyRecord,
    ) -> BoxFuture<'a, Result<Option<String>, SourceError>> {
        Box::pin(self.lookup(dependency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HttpRegistry {
        HttpRegistry::new(RegistrySection {
            enabled: true,
            npm_url: "https://registry.example/".to_owned(),
            rubygems_url: String::new(),
            ..RegistrySection::default()
        })
        .unwrap()
    }

    #[test]
    fn outdated_compares_semver_and_numeric_versions() {
        assert!(is_outdated("4.17.15", "4.17.21"));
        assert!(is_outdated("v1.6.0", "1.10.0"));
        assert!(is_outdated("5.2.0.RELEASE", "5.3.1"));
        assert!(!is_outdated("2.31.0", "2.31.0"));
        assert!(!is_outdated("3.0.0", "2.9.9"));
    }

    #[test]
    fn urls_per_ecosystem() {
        let registry = registry();
        let npm = DependencyRecord::new("@babel/core", "7.0.0", Ecosystem::Npm);
        assert_eq!(
            registry.url_for(&npm).as_deref(),
            Some("https://registry.example/@babel/core/latest")
        );
        let pypi = DependencyRecord::new("requests", "2.25.0", Ecosystem::PyPI);
        assert_eq!(
            registry.url_for(&pypi).as_deref(),
            Some("https://pypi.org/pypi/requests/json")
        );
        let krate = DependencyRecord::new("serde", "1.0.0", Ecosystem::Crates);
        assert_eq!(
            registry.url_for(&krate).as_deref(),
            Some("https://crates.io/api/v1/crates/serde")
        );
    }

    #[test]
    fn unsupported_or_unconfigured_ecosystems_are_skipped() {
        let registry = registry();
        let maven = DependencyRecord::new("junit:junit", "4.12", Ecosystem::Maven);
        assert!(registry.url_for(&maven).is_none());
        let gem = DependencyRecord::new("rails", "6.0.0", Ecosystem::RubyGems);
        assert!(registry.url_for(&gem).is_none());
    }

    #[test]
    fn crates_response_reads_max_stable_version() {
        let body = r#"{"crate":{"name":"serde","max_stable_version":"1.0.210","max_version":"1.0.211-rc.1"}}"#;
        let parsed: CratesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.krate.max_stable_version.as_deref(), Some("1.0.210"));
    }
}
