//! 스케줄러 에러 타입
//!
//! 한 프로젝트/사용자의 실패는 루프 안에서 로그로 흡수되고,
//! [`SchedulerError`]는 사이클 전체를 시작할 수 없을 때만 반환됩니다.

use vulnwatch_core::error::{ConfigError, StoreError, VulnwatchError};

/// 스케줄러 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// 스케줄러 설정 에러
    #[error("scheduler config error: {field}: {reason}")]
    Config {
        /// 설정 필드
        field: String,
        /// 사유
        reason: String,
    },

    /// 저장소 에러 (프로젝트/설정 목록 조회 실패)
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SchedulerError> for VulnwatchError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Config { field, reason } => {
                VulnwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            SchedulerError::Store(e) => VulnwatchError::Store(e),
        }
    }
}
