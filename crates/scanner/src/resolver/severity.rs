//! 심각도 정규화 -- CVSS 점수, CVSS v3 벡터, 텍스트 레벨을 4단계로
//!
//! 임계값은 고정입니다 ([`Severity::from_cvss_score`]). 어떤 표현도 해석할 수 없으면
//! `Medium`으로 둡니다.

use vulnwatch_core::types::Severity;

/// 소스가 보고한 원시 심각도 표현
#[derive(Debug, Clone, PartialEq)]
pub enum RawSeverity {
    /// 수치 점수 (0.0 ~ 10.0)
    Score(f64),
    /// CVSS 벡터 문자열
    Vector(String),
    /// 텍스트 레벨 (`HIGH`, `moderate` 등)
    Label(String),
}

/// 원시 표현 목록 중 해석 가능한 첫 번째 값을 심각도로 변환합니다.
pub fn normalize(candidates: &[RawSeverity]) -> Severity {
    candidates
        .iter()
        .find_map(normalize_one)
        .unwrap_or_default()
}

/// 단일 원시 표현을 해석합니다.
pub fn normalize_one(raw: &RawSeverity) -> Option<Severity> {
    match raw {
        RawSeverity::Score(score) if score.is_finite() && (0.0..=10.0).contains(score) => {
            Some(Severity::from_cvss_score(*score))
        }
        RawSeverity::Score(_) => None,
        RawSeverity::Vector(vector) => {
            // 일부 소스는 벡터 자리에 점수를 넣는다
            if let Ok(score) = vector.trim().parse::<f64>() {
                return normalize_one(&RawSeverity::Score(score));
            }
            cvss3_base_score(vector).map(Severity::from_cvss_score)
        }
        RawSeverity::Label(label) => Severity::from_str_loose(label),
    }
}

/// CVSS v3.x 벡터의 기본 점수를 계산합니다.
///
/// `CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H` -> 9.8
/// 필수 지표가 빠졌거나 v3가 아니면 `None`입니다.
pub fn cvss3_base_score(vector: &str) -> Option<f64> {
    let mut parts = vector.trim().split('/');
    let header = parts.next()?;
    if !header.starts_with("CVSS:3") {
        return None;
    }

    let mut av = None;
    let mut ac = None;
    let mut pr = None;
    let mut ui = None;
    let mut scope_changed = None;
    let mut c = None;
    let mut i = None;
    let mut a = None;

    for metric in parts {
        let (key, value) = metric.split_once(':')?;
        match key {
            "AV" => av = Some(match value {
                "N" => 0.85,
                "A" => 0.62,
                "L" => 0.55,
                "P" => 0.2,
                _ => return None,
            }),
            "AC" => ac = Some(match value {
                "L" => 0.77,
                "H" => 0.44,
                _ => return None,
            }),
            "PR" => pr = Some(value.to_owned()),
            "UI" => ui = Some(match value {
                "N" => 0.85,
                "R" => 0.62,
                _ => return None,
            }),
            "S" => scope_changed = Some(match value {
                "U" => false,
                "C" => true,
                _ => return None,
            }),
            "C" => c = Some(cia_weight(value)?),
            "I" => i = Some(cia_weight(value)?),
            "A" => a = Some(cia_weight(value)?),
            // 시간/환경 지표는 기본 점수에 영향 없음
            _ => {}
        }
    }

    let scope_changed = scope_changed?;
    let pr = match (pr?.as_str(), scope_changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        ("H", false) => 0.27,
        ("H", true) => 0.5,
        _ => return None,
    };

    let iss = 1.0 - (1.0 - c?) * (1.0 - i?) * (1.0 - a?);
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02_f64).powi(15)
    } else {
        6.42 * iss
    };
    let exploitability = 8.22 * av? * ac? * pr * ui?;

    if impact <= 0.0 {
        return Some(0.0);
    }
    let raw = if scope_changed {
        (1.08 * (impact + exploitability)).min(10.0)
    } else {
        (impact + exploitability).min(10.0)
    };
    Some(round_up(raw))
}

fn cia_weight(value: &str) -> Option<f64> {
    match value {
        "H" => Some(0.56),
        "L" => Some(0.22),
        "N" => Some(0.0),
        _ => None,
    }
}

/// CVSS v3.1 Roundup: 소수 첫째 자리로 올림 (부동소수 오차 보정 포함)
fn round_up(value: f64) -> f64 {
    let int_input = (value * 100_000.0).round() as i64;
    if int_input % 10_000 == 0 {
        int_input as f64 / 100_000.0
    } else {
        ((int_input / 10_000) + 1) as f64 / 10.0
    }
}
