//! OSV.dev 소스 -- `POST {base_url}/v1/query`
//!
//! 응답의 `next_page_token`을 따라가며 모든 페이지를 수집합니다.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use vulnwatch_core::pipeline::BoxFuture;
use vulnwatch_core::types::DependencyRecord;

use crate::error::SourceError;
use crate::resolver::VulnerabilityRecord;
use crate::resolver::severity::{self, RawSeverity};
use crate::resolver::source::{AdvisorySource, decode_json, http_client, is_concrete_version};

/// 한 질의에서 따라갈 최대 페이지 수
const MAX_PAGES: usize = 10;

/// OSV 소스
pub struct OsvSource {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'static str,
}

#[derive(Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVulnerability>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct OsvVulnerability {
    id: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    details: String,
    #[serde(default)]
    severity: Vec<OsvSeverity>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    #[serde(default)]
    database_specific: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    kind: String,
    score: String,
}

#[derive(Deserialize)]
struct OsvAffected {
    #[serde(default)]
    ranges: Vec<OsvRange>,
    #[serde(default)]
    database_specific: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Deserialize)]
struct OsvEvent {
    #[serde(default)]
    introduced: Option<String>,
    #[serde(default)]
    fixed: Option<String>,
    #[serde(default)]
    last_affected: Option<String>,
}

impl OsvSource {
    /// OSV 소스를 생성합니다.
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            name: name.to_owned(),
            endpoint: format!("{}/v1/query", base_url.trim_end_matches('/')),
            client: http_client(timeout)?,
        })
    }

    async fn fetch(&self, dependency: &DependencyRecord) -> Result<Vec<VulnerabilityRecord>, SourceError> {
        // 범위 제약만 있는 의존성은 버전 없이 질의하면 과거 전체 이력이 나오므로 건너뛴다
        if !is_concrete_version(&dependency.version) {
            debug!(source = %self.name, dependency = %dependency, "unpinned version, skipping");
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut page_token = None;
        for _ in 0..MAX_PAGES {
            let query = OsvQuery {
                package: OsvPackage {
                    name: &dependency.name,
                    ecosystem: dependency.ecosystem.osv_name(),
                },
                version: &dependency.version,
                page_token: page_token.take(),
            };
            let response = self.client.post(&self.endpoint).json(&query).send().await?;
            let page: OsvResponse = decode_json(response).await?;

            records.extend(page.vulns.into_iter().map(|v| v.into_record(&self.name)));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(records)
    }
}

impl AdvisorySource for OsvSource {
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

impl OsvVulnerability {
    pub(crate) fn into_record(self, source: &str) -> VulnerabilityRecord {
        let mut candidates: Vec<RawSeverity> = self
            .severity
            .iter()
            .filter(|s| s.kind.starts_with("CVSS"))
            .map(|s| RawSeverity::Vector(s.score.clone()))
            .collect();
        candidates.extend(label_of(self.database_specific.as_ref()));
        candidates.extend(
            self.affected
                .iter()
                .filter_map(|a| label_of(a.database_specific.as_ref())),
        );

        let ranges: BTreeSet<String> = self
            .affected
            .iter()
            .flat_map(|a| a.ranges.iter())
            .flat_map(|r| render_events(&r.events))
            .collect();

        let title = if self.summary.trim().is_empty() {
            self.id.clone()
        } else {
            self.summary
        };

        VulnerabilityRecord {
            id: self.id,
            aliases: self.aliases,
            title,
            description: self.details,
            severity: severity::normalize(&candidates),
            ranges,
            sources: BTreeSet::from([source.to_owned()]),
        }
    }
}

fn label_of(value: Option<&serde_json::Value>) -> Option<RawSeverity> {
    value?
        .get("severity")?
        .as_str()
        .map(|s| RawSeverity::Label(s.to_owned()))
}

/// OSV 이벤트 열을 `>=a, <b` 형태의 범위 문자열로 변환합니다.
fn render_events(events: &[OsvEvent]) -> Vec<String> {
    let mut out = Vec::new();
    let mut lower: Option<&str> = None;
    let mut open = false;

    for event in events {
        if let Some(introduced) = &event.introduced {
            if open {
                out.push(render_range(lower, None));
            }
            lower = Some(introduced.as_str()).filter(|v| *v != "0");
            open = true;
        } else if let Some(fixed) = &event.fixed {
            out.push(render_range(lower, Some(format!("<{fixed}"))));
            open = false;
        } else if let Some(last) = &event.last_affected {
            out.push(render_range(lower, Some(format!("<={last}"))));
            open = false;
        }
    }
    if open {
        out.push(render_range(lower, None));
    }
    out
}

fn render_range(lower: Option<&str>, upper: Option<String>) -> String {
    match (lower, upper) {
        (Some(lo), Some(hi)) => format!(">={lo}, {hi}"),
        (Some(lo), None) => format!(">={lo}"),
        (None, Some(hi)) => hi,
        (None, None) => "*".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use vulnwatch_core::types::Severity;

    use super::*;

    const LODASH: &str = r#"{
  "id": "GHSA-p6mc-m468-83gw",
  "summary": "Prototype Pollution in lodash",
  "details": "Versions of lodash prior to 4.17.19 are vulnerable to Prototype Pollution.",
  "aliases": ["CVE-2020-8203"],
  "severity": [ { "type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:N/I:H/A:H" } ],
  "affected": [ {
    "package": { "ecosystem": "npm", "name": "lodash" },
    "ranges": [ { "type": "SEMVER", "events": [ { "introduced": "3.7.0" }, { "fixed": "4.17.19" } ] } ],
    "database_specific": { "severity": "HIGH" }
  } ]
}"#;

    #[test]
    fn converts_osv_vulnerability() {
        let vuln: OsvVulnerability = serde_json::from_str(LODASH).unwrap();
        let record = vuln.into_record("osv");
        assert_eq!(record.id, "GHSA-p6mc-m468-83gw");
        assert_eq!(record.cve_id(), Some("CVE-2020-8203"));
        assert_eq!(record.dedup_key(), "CVE-2020-8203");
        assert_eq!(record.severity, Severity::High);
        assert_eq!(record.ranges, BTreeSet::from([">=3.7.0, <4.17.19".to_owned()]));
    }

    #[test]
    fn label_used_when_vector_unreadable() {
        let vuln: OsvVulnerability = serde_json::from_str(
            r#"{"id": "PYSEC-1", "severity": [{"type": "CVSS_V4", "score": "CVSS:4.0/AV:N"}],
                "database_specific": {"severity": "CRITICAL"}}"#,
        )
        .unwrap();
        let record = vuln.into_record("osv");
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.title, "PYSEC-1");
    }

    #[test]
    fn missing_severity_defaults_to_medium() {
        let vuln: OsvVulnerability = serde_json::from_str(r#"{"id": "GO-2022-0001"}"#).unwrap();
        assert_eq!(vuln.into_record("osv").severity, Severity::Medium);
    }

    #[test]
    fn event_rendering() {
        let events: Vec<OsvEvent> = serde_json::from_str(
            r#"[{"introduced": "0"}, {"fixed": "1.2.0"}, {"introduced": "2.0.0"},
                {"last_affected": "2.1.0"}, {"introduced": "3.0.0"}]"#,
        )
        .unwrap();
        assert_eq!(
            render_events(&events),
            vec!["<1.2.0", ">=2.0.0, <=2.1.0", ">=3.0.0"]
        );
    }

    #[test]
    fn empty_response_decodes() {
        let page: OsvResponse = serde_json::from_str("{}").unwrap();
        assert!(page.vulns.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn query_body_shape() {
        let query = OsvQuery {
            package: OsvPackage {
                name: "lodash",
                ecosystem: "npm",
            },
            version: "4.17.15",
            page_token: None,
        };
        let body = serde_json::to_value(&query).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"package": {"name": "lodash", "ecosystem": "npm"}, "version": "4.17.15"})
        );
    }
}
