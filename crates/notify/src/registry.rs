//! 구독자 레지스트리 -- userId -> 출력 채널 집합
//!
//! 등록/해제와 브로드캐스트가 하나의 뮤텍스를 거치므로 순회 중 집합이 바뀌지 않습니다.
//! 뮤텍스는 `Drop`에서도 잡히므로 std 뮤텍스를 쓰고, 임계 구역에서 `.await` 하지 않습니다.
//!
//! 전달은 최선 노력입니다. 버퍼가 가득 찬 구독자는 해당 이벤트를 놓치고,
//! 닫힌 채널은 레지스트리에서 제거됩니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use vulnwatch_core::metrics as m;
use vulnwatch_core::types::UserId;

use crate::event::NotificationEvent;

/// 구독 ID
pub type SubscriberId = u64;

type Channels = HashMap<UserId, HashMap<SubscriberId, mpsc::Sender<NotificationEvent>>>;

/// 사용자별 구독자 채널 레지스트리
pub struct SubscriberRegistry {
    channels: Mutex<Channels>,
    next_id: AtomicU64,
    buffer: usize,
}

impl SubscriberRegistry {
    /// 구독자별 버퍼 크기로 레지스트리를 생성합니다.
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 구독자를 등록하고 수신 채널을 반환합니다.
    pub fn register(&self, user_id: UserId) -> (SubscriberId, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut channels = self.lock();
            channels.entry(user_id).or_default().insert(id, tx);
            total_of(&channels)
        };
        metrics::gauge!(m::NOTIFY_SUBSCRIBERS).set(total as f64);
        debug!(user_id, subscriber_id = id, "subscriber registered");
        (id, rx)
    }

    /// 구독자를 해제합니다. 이미 없으면 아무 일도 하지 않습니다.
    pub fn unregister(&self, user_id: UserId, id: SubscriberId) {
        let total = {
            let mut channels = self.lock();
            if let Some(set) = channels.get_mut(&user_id) {
                set.remove(&id);
                if set.is_empty() {
                    channels.remove(&user_id);
                }
            }
            total_of(&channels)
        };
        metrics::gauge!(m::NOTIFY_SUBSCRIBERS).set(total as f64);
        debug!(user_id, subscriber_id = id, "subscriber unregistered");
    }

    /// 사용자의 모든 구독자에게 이벤트를 보내고, 전달된 구독자 수를 반환합니다.
    pub fn broadcast(&self, user_id: UserId, event: &NotificationEvent) -> usize {
        let mut delivered = 0;
        let mut dropped = 0u64;
        let mut channels = self.lock();
        let Some(set) = channels.get_mut(&user_id) else {
            return 0;
        };

        set.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                warn!(
                    user_id,
                    subscriber_id = *id,
                    event = event.kind(),
                    "subscriber buffer full, event dropped"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id, subscriber_id = *id, "subscriber channel closed, removing");
                false
            }
        });
        if set.is_empty() {
            channels.remove(&user_id);
        }
        let total = total_of(&channels);
        drop(channels);

        if dropped > 0 {
            metrics::counter!(m::NOTIFY_EVENTS_DROPPED_TOTAL).increment(dropped);
        }
        metrics::gauge!(m::NOTIFY_SUBSCRIBERS).set(total as f64);
        delivered
    }

    /// 사용자의 현재 구독자 수
    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.lock().get(&user_id).map_or(0, HashMap::len)
    }

    /// 전체 구독자 수
    pub fn total_subscribers(&self) -> usize {
        total_of(&self.lock())
    }
}

fn total_of(channels: &Channels) -> usize {
    channels.values().map(HashMap::len).sum()
}
