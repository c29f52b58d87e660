//! 실시간 구독 스트림
//!
//! [`Subscription`]은 `connected` 이벤트를 한 번 내보낸 뒤, 레지스트리 채널의 이벤트와
//! 고정 주기 `heartbeat`를 섞어 내보내는 [`Stream`]입니다.
//! 스트림을 drop 하면 (연결 종료) 레지스트리에서 즉시 해제됩니다.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use vulnwatch_core::types::UserId;

use crate::event::NotificationEvent;
use crate::registry::{SubscriberId, SubscriberRegistry};

/// 사용자 한 명의 라이브 구독
pub struct Subscription {
    user_id: UserId,
    id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
    rx: mpsc::Receiver<NotificationEvent>,
    heartbeat: Interval,
    connected: Option<NotificationEvent>,
}

impl Subscription {
    /// 레지스트리에 등록하고 구독을 엽니다. tokio 런타임 안에서 호출해야 합니다.
    pub(crate) fn open(
        registry: Arc<SubscriberRegistry>,
        user_id: UserId,
        heartbeat: Duration,
    ) -> Self {
        let (id, rx) = registry.register(user_id);
        let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            user_id,
            id,
            registry,
            rx,
            heartbeat: ticker,
            connected: Some(NotificationEvent::Connected {
                user_id,
                timestamp: Utc::now(),
            }),
        }
    }

    /// 구독 사용자
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 레지스트리 내 구독 ID
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// 다음 이벤트를 기다립니다. 레지스트리에서 제거되면 `None`.
    pub async fn next_event(&mut self) -> Option<NotificationEvent> {
        self.next().await
    }
}

impl Stream for Subscription {
    type Item = NotificationEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(event) = this.connected.take() {
            return Poll::Ready(Some(event));
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(event) => return Poll::Ready(event),
            Poll::Pending => {}
        }

        match this.heartbeat.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(Some(NotificationEvent::Heartbeat {
                timestamp: Utc::now(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.user_id, self.id);
    }
}
