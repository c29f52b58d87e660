//! # vulnwatch-notify
//!
//! 알림의 영속 기록과 사용자별 라이브 팬아웃을 담당합니다.
//!
//! # Module Structure
//!
//! - [`bus`]: 알림 버스 (`NotificationBus`): append, 목록, 읽음 처리, 구독
//! - [`registry`]: userId -> 출력 채널 레지스트리 (`SubscriberRegistry`)
//! - [`subscription`]: `connected` / `new_notification` / `unread_count` / `heartbeat` 스트림
//! - [`event`]: 스트림 이벤트와 SSE 와이어 형식 (`NotificationEvent`)
//! - [`mailer`]: 이메일 협력자 (`Mailer`, `LogMailer`, `WebhookMailer`)
//! - [`config`]: 버스 설정 (`BusConfig`, builder)
//! - [`error`]: 도메인 에러 (`NotifyError`, `DeliveryError`)
//!
//! # Architecture
//!
//! ```text
//! scanner / scheduler
//!        |
//!        v
//!  NotificationBus::publish --> NotificationStore::append
//!        |
//!        +--> SubscriberRegistry --> mpsc --> Subscription (SSE)
//!        |
//!        +--> Mailer (immediate 사용자)
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod mailer;
pub mod registry;
pub mod subscription;

// --- Public API Re-exports ---

pub use bus::NotificationBus;
pub use config::{BusConfig, BusConfigBuilder};
pub use error::{DeliveryError, NotifyError};
pub use event::NotificationEvent;
pub use mailer::{
    EmailMessage, LogMailer, Mailer, WebhookMailer, mailer_from_config, render_digest,
    render_immediate,
};
pub use registry::{SubscriberId, SubscriberRegistry};
pub use subscription::Subscription;
