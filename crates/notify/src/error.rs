//! 알림 모듈 에러 타입
//!
//! - [`NotifyError`]: 알림 저장/조회 실패. 호출자에게 반환됩니다.
//! - [`DeliveryError`]: 외부 이메일 전송 실패. 로그만 남기고 알림의 영속성에는 영향이 없습니다.

use vulnwatch_core::error::{NotifyError as CoreNotifyError, StoreError, VulnwatchError};

/// 알림 버스 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// 알림 저장소 에러
    #[error("notification store error: {0}")]
    Store(#[from] StoreError),
}

/// 이메일 전송 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// 수신자 주소 없음
    #[error("no email address for user {user_id}")]
    NoRecipient {
        /// 사용자
        user_id: u64,
    },

    /// 전송 서비스가 요청을 거부
    #[error("email service rejected the message: http {status}")]
    Rejected {
        /// HTTP 상태 코드
        status: u16,
    },

    /// 연결/전송 실패
    #[error("email transport failed: {0}")]
    Transport(String),

    /// 메일러 설정 에러
    #[error("mailer misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Rejected {
                status: status.as_u16(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<NotifyError> for VulnwatchError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Store(e) => VulnwatchError::Store(e),
        }
    }
}

impl From<DeliveryError> for VulnwatchError {
    fn from(err: DeliveryError) -> Self {
        VulnwatchError::Notify(CoreNotifyError::Delivery(err.to_string()))
    }
}
