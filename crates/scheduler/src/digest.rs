//! 다이제스트 발송
//!
//! `daily`/`weekly` 사용자에게 읽지 않은 `security`/`scan` 알림을 한 통의 이메일로 묶어 보냅니다.
//! `immediate` 사용자는 알림 버스가 append 시점에 이미 처리했으므로 제외합니다.
//!
//! 발송 후에는 이메일 성공 여부와 관계없이 항목에 `delivered_at`을 기록하고
//! 사용자의 마지막 다이제스트 시각을 갱신합니다. 전송 실패는 재시도하지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use vulnwatch_core::error::StoreError;
use vulnwatch_core::metrics as m;
use vulnwatch_core::store::NotificationStore;
use vulnwatch_core::types::{
    AlertConfig, AlertFrequency, NewNotification, NotificationType, UserId,
};
use vulnwatch_notify::{DeliveryError, NotificationBus, render_digest};

use crate::boundary::BoundaryRule;
use crate::error::SchedulerError;

/// 한 번의 다이제스트 사이클 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    /// 다이제스트 대상 사용자 수 (daily/weekly 설정 보유)
    pub users_evaluated: usize,
    /// 발송된 다이제스트 수
    pub digests_sent: usize,
    /// 이메일 전송에 실패한 다이제스트 수
    pub emails_failed: usize,
    /// 전달 표시된 알림 수
    pub items_delivered: usize,
    /// 처리 중 저장소 에러가 난 사용자
    pub failed_users: Vec<UserId>,
}

/// 사용자 한 명에 대한 다이제스트 결과
#[derive(Debug, Clone, PartialEq, Eq)]
enum UserDigest {
    /// 대상 아님 (immediate, 옵트아웃)
    Ineligible,
    /// 대기 항목 없음 또는 경계 미도달
    NotDue,
    /// 발송함
    Sent { items: usize, emailed: bool },
}

/// 다이제스트 실행기
pub struct DigestRunner<N: NotificationStore> {
    bus: Arc<NotificationBus<N>>,
    boundary: BoundaryRule,
}

impl<N: NotificationStore> DigestRunner<N> {
    /// 새 실행기를 생성합니다.
    pub fn new(bus: Arc<NotificationBus<N>>, boundary: BoundaryRule) -> Self {
        Self { bus, boundary }
    }

    /// 경계 규칙
    pub fn boundary(&self) -> BoundaryRule {
        self.boundary
    }

    /// `now` 기준으로 다이제스트 사이클을 한 번 실행합니다.
    ///
    /// 설정 목록 조회 실패만 에러로 반환하고, 사용자별 실패는 리포트에 담깁니다.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DigestReport, SchedulerError> {
        let configs = self.bus.store().alert_configs().await?;
        let mut report = DigestReport::default();

        for config in configs {
            match self.digest_user(&config, now).await {
                Ok(UserDigest::Ineligible) => {}
                Ok(UserDigest::NotDue) => report.users_evaluated += 1,
                Ok(UserDigest::Sent { items, emailed }) => {
                    report.users_evaluated += 1;
                    report.digests_sent += 1;
                    report.items_delivered += items;
                    if !emailed {
                        report.emails_failed += 1;
                    }
                }
                Err(e) => {
                    warn!(user_id = config.user_id, error = %e, "digest failed for user");
                    report.users_evaluated += 1;
                    report.failed_users.push(config.user_id);
                }
            }
        }

        info!(
            users = report.users_evaluated,
            sent = report.digests_sent,
            email_failures = report.emails_failed,
            items = report.items_delivered,
            "digest cycle finished"
        );
        Ok(report)
    }

    async fn digest_user(
        &self,
        config: &AlertConfig,
        now: DateTime<Utc>,
    ) -> Result<UserDigest, StoreError> {
        let Some(kinds) = digest_kinds(config) else {
            return Ok(UserDigest::Ineligible);
        };
        let store = self.bus.store();
        let user_id = config.user_id;
        let frequency = config.alert_frequency;

        let last_digest = store.last_digest_at(user_id).await?;
        let items = store.pending_digest(user_id, last_digest, kinds).await?;
        let Some(oldest) = items.iter().map(|n| n.created_at).min() else {
            return Ok(UserDigest::NotDue);
        };
        if !self.boundary.is_due(frequency, last_digest, oldest, now) {
            debug!(user_id, pending = items.len(), "digest boundary not reached");
            return Ok(UserDigest::NotDue);
        }

        let result = match store.user(user_id).await {
            Ok(Some(user)) => {
                self.bus
                    .mailer()
                    .send(render_digest(&user, frequency, &items))
                    .await
            }
            Ok(None) => Err(DeliveryError::NoRecipient { user_id }),
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        };

        let ids: Vec<String> = items.iter().map(|n| n.id.clone()).collect();
        let count = ids.len();
        store.mark_delivered(ids, now).await?;
        store.set_last_digest_at(user_id, now).await?;

        let emailed = match result {
            Ok(()) => {
                metrics::counter!(m::DIGEST_SENT_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(user_id, frequency = %frequency, items = count, "digest emailed");
                self.announce(user_id, frequency, count).await;
                true
            }
            Err(e) => {
                metrics::counter!(m::DIGEST_SENT_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                warn!(user_id, frequency = %frequency, items = count, error = %e, "digest email failed");
                false
            }
        };

        Ok(UserDigest::Sent {
            items: count,
            emailed,
        })
    }

    async fn announce(&self, user_id: UserId, frequency: AlertFrequency, items: usize) {
        let notification = NewNotification::new(
            user_id,
            NotificationType::System,
            format!("Your {frequency} security digest ({items} items) was emailed"),
            serde_json::json!({
                "frequency": frequency,
                "items": items,
            }),
        );
        if let Err(e) = self.bus.publish(notification).await {
            warn!(user_id, error = %e, "failed to record digest notification");
        }
    }
}

/// 다이제스트에 포함할 알림 유형. 대상이 아니면 `None`.
fn digest_kinds(config: &AlertConfig) -> Option<Vec<NotificationType>> {
    if !config.email_notifications {
        return None;
    }
    match config.alert_frequency {
        AlertFrequency::Immediate => return None,
        AlertFrequency::Daily if !config.daily_digest => return None,
        AlertFrequency::Daily | AlertFrequency::Weekly => {}
    }

    let mut kinds = vec![NotificationType::Scan];
    if config.security_alerts {
        kinds.push(NotificationType::Security);
    }
    Some(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frequency: AlertFrequency) -> AlertConfig {
        AlertConfig {
            alert_frequency: frequency,
            ..AlertConfig::default_for(7)
        }
    }

    #[test]
    fn immediate_users_are_excluded() {
        assert_eq!(digest_kinds(&config(AlertFrequency::Immediate)), None);
    }

    #[test]
    fn daily_requires_daily_digest_flag() {
        let mut daily = config(AlertFrequency::Daily);
        assert!(digest_kinds(&daily).is_some());
        daily.daily_digest = false;
        assert_eq!(digest_kinds(&daily), None);

        let mut weekly = config(AlertFrequency::Weekly);
        weekly.daily_digest = false;
        assert!(digest_kinds(&weekly).is_some());
    }

    #[test]
    fn security_items_require_security_alerts() {
        let mut weekly = config(AlertFrequency::Weekly);
        weekly.security_alerts = false;
        assert_eq!(digest_kinds(&weekly), Some(vec![NotificationType::Scan]));
    }

    #[test]
    fn email_opt_out_excludes_user() {
        let mut daily = config(AlertFrequency::Daily);
        daily.email_notifications = false;
        assert_eq!(digest_kinds(&daily), None);
    }
}
