//! Bundler `Gemfile` 파서
//!
//! `gem 'name'[, 'constraint'...]` 줄만 해석합니다. 첫 번째 문자열 인자가 버전 제약이면
//! 범위 접두어를 제거한 기준 버전을, 없으면 `*`를 사용합니다.

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser, strip_range_prefix};

/// `Gemfile` 파서
pub struct GemfileParser;

impl ManifestParser for GemfileParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::Gemfile
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::RubyGems
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let mut records = Vec::new();

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            let Some(args) = line.strip_prefix("gem ").or_else(|| line.strip_prefix("gem(")) else {
                continue;
            };

            let mut literals = string_literals(args);
            let Some(name) = literals.next() else {
                return Err(ParseError::malformed(
                    "Gemfile",
                    format!("line {}: gem without a quoted name", lineno + 1),
                ));
            };
            let version = literals
                .next()
                .filter(|v| v.starts_with(|c: char| c.is_ascii_digit() || "~><=!".contains(c)))
                .map(strip_range_prefix)
                .unwrap_or_else(|| "*".to_owned());

            records.push(DependencyRecord::new(name, version, Ecosystem::RubyGems));
        }

        Ok(records)
    }
}

/// 인자 목록에서 위치 인자 문자열 리터럴을 순서대로 꺼냅니다.
///
/// `key: 'value'` 형태의 옵션 값은 제외합니다.
fn string_literals(args: &str) -> impl Iterator<Item = &str> {
    args.split(',').filter_map(|arg| {
        let arg = arg.trim().trim_end_matches(')');
        let quote = arg.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let inner = &arg[1..];
        let end = inner.find(quote)?;
        Some(&inner[..end])
    })
}
