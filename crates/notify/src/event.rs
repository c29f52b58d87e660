//! 실시간 스트림 이벤트
//!
//! 와이어 형식은 이벤트당 `data: <json>\n\n` 한 프레임이며, JSON은 `type` 필드로
//! 구분됩니다. 프레임 구성은 HTTP 계층(SSE)이 맡고 여기서는 [`NotificationEvent::to_json`]만
//! 제공합니다.
//!
//! ```text
//! data: {"type":"connected","userId":7,"timestamp":"2024-05-01T12:00:00Z"}
//!
//! data: {"type":"new_notification","notification":{...}}
//!
//! data: {"type":"unread_count","count":3}
//!
//! data: {"type":"heartbeat","timestamp":"2024-05-01T12:00:30Z"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vulnwatch_core::types::{Notification, UserId};

/// 구독자에게 전달되는 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// 연결 직후 한 번
    #[serde(rename_all = "camelCase")]
    Connected {
        /// 구독 사용자
        user_id: UserId,
        /// 연결 시각
        timestamp: DateTime<Utc>,
    },

    /// 새 알림
    NewNotification {
        /// 저장된 알림
        notification: Notification,
    },

    /// 읽지 않은 알림 수 스냅샷
    UnreadCount {
        /// 읽지 않은 수
        count: usize,
    },

    /// 주기적 생존 신호
    Heartbeat {
        /// 발생 시각
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// 이벤트 종류 이름 (로그/메트릭용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::NewNotification { .. } => "new_notification",
            Self::UnreadCount { .. } => "unread_count",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    /// JSON 본문
    pub fn to_json(&self) -> String {
        // 모든 필드가 문자열 키 맵/기본 타입이라 직렬화는 실패하지 않는다
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"type\":\"{}\"}}", self.kind()))
    }
}
