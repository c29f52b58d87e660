//! 알림 버스 -- 영속 기록과 라이브 팬아웃
//!
//! # 순서 보장
//!
//! [`NotificationBus::publish`]는 저장소 append가 끝난 뒤에만 푸시를 시도합니다.
//! 푸시는 연결된 구독자에게 최대 한 번이며, 나중에 연결한 구독자는 목록 조회로 따라잡습니다.
//!
//! ```text
//! publish ──▶ store.append ──▶ registry.broadcast(new_notification)
//!                                  └──▶ registry.broadcast(unread_count)
//!                                  └──▶ mailer.send (immediate 사용자만)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use vulnwatch_core::metrics as m;
use vulnwatch_core::store::NotificationStore;
use vulnwatch_core::types::{
    AlertFrequency, NewNotification, Notification, NotificationPage, NotificationQuery, UserId,
};

use crate::config::BusConfig;
use crate::error::{DeliveryError, NotifyError};
use crate::event::NotificationEvent;
use crate::mailer::{Mailer, render_immediate};
use crate::registry::SubscriberRegistry;
use crate::subscription::Subscription;

/// 알림 버스
pub struct NotificationBus<S: NotificationStore> {
    store: Arc<S>,
    registry: Arc<SubscriberRegistry>,
    mailer: Arc<dyn Mailer>,
    config: BusConfig,
    appended: AtomicU64,
}

impl<S: NotificationStore> NotificationBus<S> {
    /// 버스를 생성합니다.
    pub fn new(store: Arc<S>, mailer: Arc<dyn Mailer>, config: BusConfig) -> Self {
        let registry = Arc::new(SubscriberRegistry::new(config.subscriber_buffer));
        Self {
            store,
            registry,
            mailer,
            config,
            appended: AtomicU64::new(0),
        }
    }

    /// 알림을 저장하고 사용자의 라이브 구독자에게 푸시합니다.
    ///
    /// 저장 실패만 에러로 반환합니다. 푸시와 이메일은 최선 노력입니다.
    pub async fn publish(&self, notification: NewNotification) -> Result<Notification, NotifyError> {
        let stored = self.store.append(notification).await?;
        self.appended.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::NOTIFY_APPENDED_TOTAL, "type" => stored.kind.to_string()).increment(1);

        let delivered = self.registry.broadcast(
            stored.user_id,
            &NotificationEvent::NewNotification {
                notification: stored.clone(),
            },
        );
        debug!(
            user_id = stored.user_id,
            notification_id = %stored.id,
            kind = %stored.kind,
            subscribers = delivered,
            "notification appended"
        );
        self.push_unread_count(stored.user_id).await;
        self.send_immediate_email(&stored).await;
        Ok(stored)
    }

    /// 사용자 알림 목록 (최신순)
    pub async fn list(
        &self,
        user_id: UserId,
        query: NotificationQuery,
    ) -> Result<NotificationPage, NotifyError> {
        Ok(self.store.notifications(user_id, query.normalized()).await?)
    }

    /// 읽지 않은 알림 수
    pub async fn unread_count(&self, user_id: UserId) -> Result<usize, NotifyError> {
        Ok(self.store.unread_count(user_id).await?)
    }

    /// 알림 하나를 읽음 처리합니다. 사용자 소유가 아니면 `false`.
    pub async fn mark_read(&self, user_id: UserId, notification_id: &str) -> Result<bool, NotifyError> {
        let changed = self.store.mark_read(user_id, notification_id).await?;
        if changed {
            self.push_unread_count(user_id).await;
        }
        Ok(changed)
    }

    /// 사용자 알림 전체를 읽음 처리합니다.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<usize, NotifyError> {
        let changed = self.store.mark_all_read(user_id).await?;
        self.push_unread_count(user_id).await;
        Ok(changed)
    }

    /// 사용자의 라이브 스트림을 엽니다.
    pub fn subscribe(&self, user_id: UserId) -> Subscription {
        info!(user_id, "notification stream opened");
        Subscription::open(Arc::clone(&self.registry), user_id, self.config.heartbeat)
    }

    /// 사용자의 현재 구독자 수
    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.registry.subscriber_count(user_id)
    }

    /// 전체 구독자 수
    pub fn total_subscribers(&self) -> usize {
        self.registry.total_subscribers()
    }

    /// 이 버스가 저장한 알림 수
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// 알림 저장소
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 이메일 협력자
    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    /// 버스 설정
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    async fn push_unread_count(&self, user_id: UserId) {
        if self.registry.subscriber_count(user_id) == 0 {
            return;
        }
        match self.store.unread_count(user_id).await {
            Ok(count) => {
                self.registry
                    .broadcast(user_id, &NotificationEvent::UnreadCount { count });
            }
            Err(e) => warn!(user_id, error = %e, "failed to compute unread count"),
        }
    }

    async fn send_immediate_email(&self, notification: &Notification) {
        let user_id = notification.user_id;
        let config = match self.store.alert_config(user_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(user_id, error = %e, "failed to load alert config, skipping email");
                return;
            }
        };
        if config.alert_frequency != AlertFrequency::Immediate
            || !config.wants_email_for(notification.kind)
        {
            return;
        }

        let result = match self.store.user(user_id).await {
            Ok(Some(user)) => self.mailer.send(render_immediate(&user, notification)).await,
            Ok(None) => Err(DeliveryError::NoRecipient { user_id }),
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        };
        let label = match &result {
            Ok(()) => "success",
            Err(e) => {
                warn!(
                    user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "immediate email delivery failed"
                );
                "failure"
            }
        };
        metrics::counter!(m::NOTIFY_EMAILS_TOTAL, m::LABEL_RESULT => label).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulnwatch_core::store::MemoryStore;
    use vulnwatch_core::types::NotificationType;

    use crate::mailer::LogMailer;

    fn bus() -> NotificationBus<MemoryStore> {
        NotificationBus::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LogMailer),
            BusConfig::default(),
        )
    }

    fn scan_notification(user_id: UserId) -> NewNotification {
        NewNotification::new(user_id, NotificationType::Scan, "done", serde_json::Value::Null)
    }

    #[tokio::test]
    async fn publish_without_subscribers_still_persists() {
        let bus = bus();
        let stored = bus.publish(scan_notification(1)).await.unwrap();
        assert!(!stored.read);
        assert_eq!(bus.unread_count(1).await.unwrap(), 1);
        assert_eq!(bus.appended(), 1);
    }

    #[tokio::test]
    async fn late_subscriber_does_not_see_earlier_notification() {
        let bus = bus();
        bus.publish(scan_notification(1)).await.unwrap();

        let mut sub = bus.subscribe(1);
        assert!(matches!(
            sub.next_event().await,
            Some(NotificationEvent::Connected { .. })
        ));
        bus.mark_all_read(1).await.unwrap();
        assert_eq!(
            sub.next_event().await,
            Some(NotificationEvent::UnreadCount { count: 0 })
        );
    }

    #[tokio::test]
    async fn mark_read_of_foreign_notification_is_false() {
        let bus = bus();
        let stored = bus.publish(scan_notification(1)).await.unwrap();
        assert!(!bus.mark_read(2, &stored.id).await.unwrap());
        assert!(bus.mark_read(1, &stored.id).await.unwrap());
    }
}
