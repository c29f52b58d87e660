//! pip `requirements.txt` 파서
//!
//! 한 줄에 요구사항 하나. `#` 주석, `-r`/`-e` 같은 옵션 줄, URL 요구사항은 건너뜁니다.
//! `==`/`===` 고정 버전은 정확한 버전으로, 그 외 연산자는 제약식 그대로 보존하며,
//! 연산자가 없으면 `*`입니다. 이름은 PEP 503 규칙으로 정규화합니다.

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser};

const FORMAT: &str = "requirements.txt";

/// 버전 비교 연산자 (긴 것부터 매칭)
const OPERATORS: [&str; 8] = ["===", "==", "~=", "!=", ">=", "<=", ">", "<"];

/// `requirements.txt` 파서
pub struct RequirementsParser;

impl ManifestParser for RequirementsParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::Requirements
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PyPI
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let mut records = Vec::new();

        for (lineno, raw) in content.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() || line.starts_with('-') || line.contains("://") {
                continue;
            }

            // 환경 마커 제거: `foo==1.0 ; python_version < "3.8"`
            let line = line.split(';').next().unwrap_or(line).trim();
            let (name_part, version) = split_requirement(line);

            // extras 제거: `requests[security]`
            let name = name_part.split('[').next().unwrap_or(name_part).trim();
            if !is_valid_name(name) {
                return Err(ParseError::malformed(
                    FORMAT,
                    format!("line {}: invalid requirement '{}'", lineno + 1, raw.trim()),
                ));
            }

            records.push(DependencyRecord::new(
                normalize_name(name),
                version,
                Ecosystem::PyPI,
            ));
        }

        Ok(records)
    }
}

/// 인라인 주석 제거 (`#` 앞에 공백이 있거나 줄 맨 앞일 때만)
fn strip_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return "";
    }
    match line.find(" #") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// 이름 부분과 버전(정확한 버전, 제약식 원문, 또는 `*`)으로 나눕니다.
fn split_requirement(line: &str) -> (&str, String) {
    let first_op = OPERATORS
        .iter()
        .filter_map(|op| line.find(op).map(|pos| (pos, *op)))
        .min_by_key(|(pos, op)| (*pos, std::cmp::Reverse(op.len())));

    match first_op {
        Some((pos, op)) => {
            let name = &line[..pos];
            let constraint = line[pos..].trim();
            let version = if (op == "==" || op == "===") && !constraint.contains(',') {
                constraint[op.len()..].trim().to_owned()
            } else {
                constraint.replace(' ', "")
            };
            (name, version)
        }
        None => (line, "*".to_owned()),
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// PEP 503 정규화: 소문자화, `-`/`_`/`.` 연속은 `-` 하나로
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}
