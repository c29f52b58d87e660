//! NVD CVE API 2.0 소스 -- `GET {base_url}?keywordSearch=<name> <version>`
//!
//! 토큰이 설정되어 있으면 `apiKey` 헤더로 전달합니다. 심각도는 CVSS v3.1, v3.0, v2
//! 기본 점수 순으로, 모두 없으면 `baseSeverity` 레이블로 정합니다.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use vulnwatch_core::pipeline::BoxFuture;
use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::SourceError;
use crate::resolver::VulnerabilityRecord;
use crate::resolver::severity::{self, RawSeverity};
use crate::resolver::source::{AdvisorySource, decode_json, http_client, is_concrete_version};

/// NVD 소스
pub struct NvdSource {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdItem>,
}

#[derive(Deserialize)]
struct NvdItem {
    cve: NvdCve,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NvdCve {
    id: String,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    #[serde(default)]
    metrics: NvdMetrics,
    #[serde(default)]
    configurations: Vec<NvdConfiguration>,
}

#[derive(Deserialize)]
struct NvdDescription {
    lang: String,
    value: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdMetrics {
    #[serde(default)]
    cvss_metric_v31: Vec<NvdCvssMetric>,
    #[serde(default)]
    cvss_metric_v30: Vec<NvdCvssMetric>,
    #[serde(default)]
    cvss_metric_v2: Vec<NvdCvssMetric>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdCvssMetric {
    cvss_data: NvdCvssData,
    /// v2는 레이블이 cvssData 바깥에 있음
    #[serde(default)]
    base_severity: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdCvssData {
    #[serde(default)]
    base_score: Option<f64>,
    #[serde(default)]
    base_severity: Option<String>,
}

#[derive(Deserialize)]
struct NvdConfiguration {
    #[serde(default)]
    nodes: Vec<NvdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdNode {
    #[serde(default)]
    cpe_match: Vec<NvdCpeMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdCpeMatch {
    #[serde(default)]
    vulnerable: bool,
    #[serde(default)]
    version_start_including: Option<String>,
    #[serde(default)]
    version_start_excluding: Option<String>,
    #[serde(default)]
    version_end_including: Option<String>,
    #[serde(default)]
    version_end_excluding: Option<String>,
}

impl NvdSource {
    /// NVD 소스를 생성합니다.
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.map(str::to_owned),
            client: http_client(timeout)?,
        })
    }

    async fn fetch(&self, dependency: &DependencyRecord) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        if !is_concrete_version(&dependency.version) {
            debug!(source = %self.name, dependency = %dependency, "unpinned version, skipping");
            return Ok(Vec::new());
        }

        let keyword = format!("{} {}", search_name(dependency), dependency.version);
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("keywordSearch", keyword.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let response: NvdResponse = decode_json(request.send().await?).await?;
        Ok(response
            .vulnerabilities
            .into_iter()
            .map(|item| item.cve.into_record(&self.name))
            .collect())
    }
}

impl AdvisorySource for NvdSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn query<'a>(
        &'a self,
        dependency: &'a DependencyRecord,
    ) -> BoxFuture<'a, Result<Vec<VulnerabilityRecord>, SourceError>> {
        Box::pin(self.fetch(dependency))
    }
}

/// 키워드 검색용 이름 (Maven은 artifactId, Go는 마지막 경로 요소)
fn search_name(dependency: &DependencyRecord) -> &str {
    match dependency.ecosystem {
        Ecosystem::Maven => dependency
            .name
            .rsplit(':')
            .next()
            .unwrap_or(&dependency.name),
        Ecosystem::Go | Ecosystem::Packagist => dependency
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&dependency.name),
        _ => &dependency.name,
    }
}

impl NvdCve {
    pub(crate) fn into_record(self, source: &str) -> VulnerabilityRecord {
        let mut candidates = Vec::new();
        for metric in self
            .metrics
            .cvss_metric_v31
            .iter()
            .chain(&self.metrics.cvss_metric_v30)
            .chain(&self.metrics.cvss_metric_v2)
        {
            if let Some(score) = metric.cvss_data.base_score {
                candidates.push(RawSeverity::Score(score));
            }
        }
        for metric in self
            .metrics
            .cvss_metric_v31
            .iter()
            .chain(&self.metrics.cvss_metric_v30)
            .chain(&self.metrics.cvss_metric_v2)
        {
            if let Some(label) = metric
                .cvss_data
                .base_severity
                .as_ref()
                .or(metric.base_severity.as_ref())
            {
                candidates.push(RawSeverity::Label(label.clone()));
            }
        }

        let description = self
            .descriptions
            .iter()
            .find(|d| d.lang == "en")
            .or_else(|| self.descriptions.first())
            .map(|d| d.value.clone())
            .unwrap_or_default();

        let ranges: BTreeSet<String> = self
            .configurations
            .iter()
            .flat_map(|c| c.nodes.iter())
            .flat_map(|n| n.cpe_match.iter())
            .filter(|m| m.vulnerable)
            .filter_map(render_cpe_range)
            .collect();

        VulnerabilityRecord {
            title: self.id.clone(),
            id: self.id,
            aliases: Vec::new(),
            description,
            severity: severity::normalize(&candidates),
            ranges,
            sources: BTreeSet::from([source.to_owned()]),
        }
    }
}

fn render_cpe_range(m: &NvdCpeMatch) -> Option<String> {
    let lower = m
        .version_start_including
        .as_ref()
        .map(|v| format!(">={v}"))
        .or_else(|| m.version_start_excluding.as_ref().map(|v| format!(">{v}")));
    let upper = m
        .version_end_excluding
        .as_ref()
        .map(|v| format!("<{v}"))
        .or_else(|| m.version_end_including.as_ref().map(|v| format!("<={v}")));
    match (lower, upper) {
        (Some(lo), Some(hi)) => Some(format!("{lo}, {hi}")),
        (Some(lo), None) => Some(lo),
        (None, Some(hi)) => Some(hi),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use vulnwatch_core::types::Severity;

    use super::*;

    const LOG4SHELL: &str = r#"{
  "id": "CVE-2021-44228",
  "descriptions": [
    { "lang": "es", "value": "Apache Log4j2 ..." },
    { "lang": "en", "value": "Apache Log4j2 JNDI features do not protect against attacker controlled LDAP." }
  ],
  "metrics": {
    "cvssMetricV31": [ { "cvssData": { "baseScore": 10.0, "baseSeverity": "CRITICAL" } } ],
    "cvssMetricV2": [ { "cvssData": { "baseScore": 9.3 }, "baseSeverity": "HIGH" } ]
  },
  "configurations": [ { "nodes": [ { "cpeMatch": [
    { "vulnerable": true, "versionStartIncluding": "2.0.1", "versionEndExcluding": "2.3.1" },
    { "vulnerable": false, "versionEndExcluding": "1.0" }
  ] } ] } ]
}"#;

    #[test]
    fn converts_nvd_cve() {
        let cve: NvdCve = serde_json::from_str(LOG4SHELL).unwrap();
        let record = cve.into_record("nvd");
        assert_eq!(record.id, "CVE-2021-44228");
        assert_eq!(record.severity, Severity::Critical);
        assert!(record.description.starts_with("Apache Log4j2 JNDI"));
        assert_eq!(record.ranges, BTreeSet::from([">=2.0.1, <2.3.1".to_owned()]));
    }

    #[test]
    fn v2_label_fallback() {
        let cve: NvdCve = serde_json::from_str(
            r#"{"id": "CVE-2010-0001", "metrics": {"cvssMetricV2": [{"cvssData": {}, "baseSeverity": "LOW"}]}}"#,
        )
        .unwrap();
        assert_eq!(cve.into_record("nvd").severity, Severity::Low);
    }

    #[test]
    fn maven_and_go_search_names() {
        let dep = DependencyRecord::new("org.apache.logging.log4j:log4j-core", "2.14.1", Ecosystem::Maven);
        assert_eq!(search_name(&dep), "log4j-core");
        let dep = DependencyRecord::new("github.com/gin-gonic/gin", "v1.6.0", Ecosystem::Go);
        assert_eq!(search_name(&dep), "gin");
        let dep = DependencyRecord::new("lodash", "4.17.15", Ecosystem::Npm);
        assert_eq!(search_name(&dep), "lodash");
    }
}
