//! Maven `pom.xml` 파서
//!
//! `project/dependencies/dependency`와 `project/dependencyManagement/dependencies/dependency`의
//! `groupId:artifactId` 좌표를 수집합니다. `build/plugins` 안의 의존성은 무시합니다.
//! `${prop}` 버전은 `<properties>`와 `project.version`으로 해석하며, 해석할 수 없거나
//! 버전이 없으면 `*`로 둡니다.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser};

const FORMAT: &str = "pom.xml";

/// `pom.xml` 파서
pub struct PomParser;

#[derive(Default)]
struct PendingDependency {
    group_id: Option<String>,
    artifact_id: Option<String>,
    version: Option<String>,
}

impl ManifestParser for PomParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::Pom
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut properties: HashMap<String, String> = HashMap::new();
        let mut pending: Vec<PendingDependency> = Vec::new();
        let mut current: Option<PendingDependency> = None;
        let mut saw_root = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| ParseError::malformed(FORMAT, e.to_string()))?;

            match event {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    if path.is_empty() {
                        if name != "project" {
                            return Err(ParseError::malformed(
                                FORMAT,
                                format!("root element must be <project>, found <{name}>"),
                            ));
                        }
                        saw_root = true;
                    }
                    path.push(name);
                    if is_dependency_path(&path) {
                        current = Some(PendingDependency::default());
                    }
                }
                Event::End(_) => {
                    if is_dependency_path(&path)
                        && let Some(dep) = current.take()
                    {
                        pending.push(dep);
                    }
                    path.pop();
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| ParseError::malformed(FORMAT, e.to_string()))?
                        .trim()
                        .to_owned();
                    record_text(&path, value, &mut properties, current.as_mut());
                }
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data.into_inner()).trim().to_owned();
                    record_text(&path, value, &mut properties, current.as_mut());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(ParseError::malformed(FORMAT, "missing <project> element"));
        }
        if !path.is_empty() {
            return Err(ParseError::malformed(FORMAT, "unexpected end of document"));
        }

        let mut records = Vec::with_capacity(pending.len());
        for dep in pending {
            let (Some(group_id), Some(artifact_id)) = (dep.group_id, dep.artifact_id) else {
                continue;
            };
            let group_id = resolve_properties(&group_id, &properties);
            let version = dep
                .version
                .map(|v| resolve_properties(&v, &properties))
                .filter(|v| !v.is_empty() && !v.contains("${"))
                .unwrap_or_else(|| "*".to_owned());
            records.push(DependencyRecord::new(
                format!("{group_id}:{artifact_id}"),
                version,
                Ecosystem::Maven,
            ));
        }
        Ok(records)
    }
}

/// `.../dependencies/dependency` 이면서 플러그인 블록 밖인지
fn is_dependency_path(path: &[String]) -> bool {
    let n = path.len();
    n >= 3
        && path[n - 1] == "dependency"
        && path[n - 2] == "dependencies"
        && !path.iter().any(|p| p == "plugin" || p == "plugins")
}

fn record_text(
    path: &[String],
    value: String,
    properties: &mut HashMap<String, String>,
    current: Option<&mut PendingDependency>,
) {
    let n = path.len();
    if n == 0 {
        return;
    }

    if n == 3 && path[1] == "properties" {
        properties.insert(path[2].clone(), value);
        return;
    }
    if n == 2 && matches!(path[1].as_str(), "version" | "groupId" | "artifactId") {
        properties.insert(format!("project.{}", path[1]), value);
        return;
    }
    if n == 3 && path[1] == "parent" && path[2] == "version" {
        properties
            .entry("project.version".to_owned())
            .or_insert_with(|| value.clone());
        properties.insert("project.parent.version".to_owned(), value);
        return;
    }

    if let Some(dep) = current
        && n >= 2
        && path[n - 2] == "dependency"
    {
        match path[n - 1].as_str() {
            "groupId" => dep.group_id = Some(value),
            "artifactId" => dep.artifact_id = Some(value),
            "version" => dep.version = Some(value),
            _ => {}
        }
    }
}

/// `${name}` 참조를 치환합니다. 알 수 없는 참조는 원문 그대로 둡니다.
fn resolve_properties(value: &str, properties: &HashMap<String, String>) -> String {
    let mut out = value.to_owned();
    // 속성이 다른 속성을 참조할 수 있으므로 몇 차례 반복
    for _ in 0..5 {
        let Some(start) = out.find("${") else { break };
        let Some(len) = out[start..].find('}') else { break };
        let key = &out[start + 2..start + len];
        let Some(replacement) = properties.get(key) else { break };
        out = format!("{}{}{}", &out[..start], replacement, &out[start + len + 1..]);
    }
    out
}
