//! 다이제스트 경계 규칙
//!
//! 사용자 빈도(daily, weekly)별로 "이번 다이제스트를 보낼 때가 되었는가"를 판단합니다.
//!
//! - [`BoundaryRule::Rolling`]: 마지막 발송 이후 한 주기가 지났는지. 발송 이력이 없으면
//!   가장 오래된 대기 항목이 한 주기만큼 묵었을 때 첫 발송합니다.
//! - [`BoundaryRule::Calendar`]: UTC 기준 하루 시작 / 월요일 시작 주를 경계로,
//!   기준 시각이 현재 구간 시작보다 앞서면 발송합니다.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use vulnwatch_core::types::AlertFrequency;

/// 다이제스트 경계 규칙
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryRule {
    /// 마지막 발송 기준 이동 구간
    #[default]
    Rolling,
    /// 달력 정렬 구간 (UTC)
    Calendar,
}

impl BoundaryRule {
    /// 문자열에서 규칙을 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rolling" => Some(Self::Rolling),
            "calendar" => Some(Self::Calendar),
            _ => None,
        }
    }

    /// 빈도별 주기 길이. `Immediate`는 다이제스트 대상이 아닙니다.
    pub fn period(frequency: AlertFrequency) -> Option<Duration> {
        match frequency {
            AlertFrequency::Immediate => None,
            AlertFrequency::Daily => Some(Duration::days(1)),
            AlertFrequency::Weekly => Some(Duration::days(7)),
        }
    }

    /// `now`가 속한 달력 구간의 시작 (UTC 자정, 주는 월요일 자정)
    pub fn period_start(frequency: AlertFrequency, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let midnight = now.date_naive().and_hms_opt(0, 0, 0)?;
        let day_start = Utc.from_utc_datetime(&midnight);
        match frequency {
            AlertFrequency::Immediate => None,
            AlertFrequency::Daily => Some(day_start),
            AlertFrequency::Weekly => {
                let back = i64::from(now.weekday().num_days_from_monday());
                Some(day_start - Duration::days(back))
            }
        }
    }

    /// 다이제스트를 보낼 때인지 판단합니다.
    ///
    /// `last_digest`가 없으면 `oldest_pending`(가장 오래된 대기 항목 생성 시각)을 기준으로 삼습니다.
    pub fn is_due(
        &self,
        frequency: AlertFrequency,
        last_digest: Option<DateTime<Utc>>,
        oldest_pending: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let anchor = last_digest.unwrap_or(oldest_pending);
        match self {
            Self::Rolling => match Self::period(frequency) {
                Some(period) => now - anchor >= period,
                None => false,
            },
            Self::Calendar => match Self::period_start(frequency, now) {
                Some(start) => anchor < start,
                None => false,
            },
        }
    }
}

impl fmt::Display for BoundaryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rolling => write!(f, "rolling"),
            Self::Calendar => write!(f, "calendar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn rolling_first_digest_waits_for_oldest_item() {
        let rule = BoundaryRule::Rolling;
        let oldest = at("2026-03-10T09:00:00Z");
        assert!(!rule.is_due(
            AlertFrequency::Daily,
            None,
            oldest,
            at("2026-03-11T08:59:59Z")
        ));
        assert!(rule.is_due(
            AlertFrequency::Daily,
            None,
            oldest,
            at("2026-03-11T09:00:00Z")
        ));
    }

    #[test]
    fn rolling_uses_last_digest_when_present() {
        let rule = BoundaryRule::Rolling;
        let last = at("2026-03-01T12:00:00Z");
        let oldest = at("2026-03-07T12:00:00Z");
        assert!(!rule.is_due(
            AlertFrequency::Weekly,
            Some(last),
            oldest,
            at("2026-03-08T11:00:00Z")
        ));
        assert!(rule.is_due(
            AlertFrequency::Weekly,
            Some(last),
            oldest,
            at("2026-03-08T12:00:00Z")
        ));
    }

    #[test]
    fn calendar_day_boundary_is_utc_midnight() {
        let rule = BoundaryRule::Calendar;
        let oldest = at("2026-03-10T23:30:00Z");
        assert!(!rule.is_due(
            AlertFrequency::Daily,
            None,
            oldest,
            at("2026-03-10T23:59:00Z")
        ));
        assert!(rule.is_due(
            AlertFrequency::Daily,
            None,
            oldest,
            at("2026-03-11T00:01:00Z")
        ));
    }

    #[test]
    fn calendar_week_starts_on_monday() {
        // 2026-03-16은 월요일
        assert_eq!(
            BoundaryRule::period_start(AlertFrequency::Weekly, at("2026-03-19T15:00:00Z")),
            Some(at("2026-03-16T00:00:00Z"))
        );
        assert_eq!(
            BoundaryRule::period_start(AlertFrequency::Weekly, at("2026-03-16T00:00:00Z")),
            Some(at("2026-03-16T00:00:00Z"))
        );

        let rule = BoundaryRule::Calendar;
        let last = at("2026-03-16T08:00:00Z");
        assert!(!rule.is_due(
            AlertFrequency::Weekly,
            Some(last),
            last,
            at("2026-03-22T23:00:00Z")
        ));
        assert!(rule.is_due(
            AlertFrequency::Weekly,
            Some(last),
            last,
            at("2026-03-23T00:00:00Z")
        ));
    }

    #[test]
    fn immediate_is_never_due() {
        let now = at("2026-03-10T00:00:00Z");
        for rule in [BoundaryRule::Rolling, BoundaryRule::Calendar] {
            assert!(!rule.is_due(
                AlertFrequency::Immediate,
                None,
                now - Duration::days(30),
                now
            ));
        }
    }

    #[test]
    fn parse_rule() {
        assert_eq!(BoundaryRule::from_str_loose("Calendar"), Some(BoundaryRule::Calendar));
        assert_eq!(BoundaryRule::from_str_loose(" rolling "), Some(BoundaryRule::Rolling));
        assert_eq!(BoundaryRule::from_str_loose("hourly"), None);
    }
}
