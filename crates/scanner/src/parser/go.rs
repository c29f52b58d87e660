//! Go `go.mod` 파서
//!
//! 한 줄 `require path v1.2.3`와 `require ( ... )` 블록을 모두 지원합니다.
//! `replace`/`exclude`/`retract` 블록은 건너뛰며 `// indirect` 주석은 무시합니다.
//! 버전의 `v` 접두어는 OSV 질의 형식에 맞춰 유지합니다.

use vulnwatch_core::types::{DependencyRecord, Ecosystem};

use crate::error::ParseError;
use crate::parser::{ManifestFormat, ManifestParser};

const FORMAT: &str = "go.mod";

/// `go.mod` 파서
pub struct GoModParser;

#[derive(PartialEq)]
enum Block {
    None,
    Require,
    Other,
}

impl ManifestParser for GoModParser {
    fn format(&self) -> ManifestFormat {
        ManifestFormat::GoMod
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn parse(&self, content: &str) -> Result<Vec<DependencyRecord>, ParseError> {
        let mut records = Vec::new();
        let mut block = Block::None;
        let mut saw_module = false;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.split("//").next().unwrap_or(raw).trim();
            if line.is_empty() {
                continue;
            }

            if block != Block::None {
                if line == ")" {
                    block = Block::None;
                } else if block == Block::Require {
                    records.push(require_entry(line, lineno)?);
                }
                continue;
            }

            let (directive, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let rest = rest.trim();
            match directive {
                "module" => saw_module = true,
                "require" if rest == "(" => block = Block::Require,
                "require" => records.push(require_entry(rest, lineno)?),
                "replace" | "exclude" | "retract" | "tool" | "godebug" if rest == "(" => {
                    block = Block::Other
                }
                _ => {}
            }
        }

        if block != Block::None {
            return Err(ParseError::malformed(FORMAT, "unterminated block"));
        }
        if !saw_module {
            return Err(ParseError::malformed(FORMAT, "missing module directive"));
        }
        Ok(records)
    }
}

fn require_entry(line: &str, lineno: usize) -> Result<DependencyRecord, ParseError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(path), Some(version)) => Ok(DependencyRecord::new(
            path.trim_matches('"'),
            version,
            Ecosystem::Go,
        )),
        _ => Err(ParseError::malformed(
            FORMAT,
            format!("line {}: expected '<module> <version>'", lineno + 1),
        )),
    }
}
