//! 스캐너 에러 타입
//!
//! - [`ParseError`]: 매니페스트가 지원되지 않거나 손상됨. 사용자가 고칠 수 있으며 그대로 보고합니다.
//! - [`SourceError`]: 외부 취약점 소스 한 곳의 실패. 로컬에서 재시도되고, 소진되면
//!   부분 결과로 흡수되어 스캔을 중단시키지 않습니다.
//! - [`ScanError`]: 스캔 요청 단위 에러. 호출자에게 동기적으로 반환됩니다.
//!
//! `From<ScanError> for VulnwatchError` 구현으로 `?` 연산자로 상위 에러로 전파됩니다.

use std::time::Duration;

use vulnwatch_core::error::{ConfigError, ScannerError, StoreError, VulnwatchError};
use vulnwatch_core::types::ProjectId;

/// 매니페스트 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// 파일 이름/힌트로 형식을 판별할 수 없음
    #[error("unsupported manifest format: {0}")]
    UnsupportedFormat(String),

    /// UTF-8이 아닌 입력
    #[error("manifest is not valid UTF-8")]
    InvalidEncoding,

    /// 형식에 맞지 않는 내용
    #[error("malformed {format}: {reason}")]
    Malformed {
        /// 매니페스트 형식
        format: &'static str,
        /// 실패 사유
        reason: String,
    },

    /// 의존성이 하나도 없음
    #[error("{format} declares no dependencies")]
    Empty {
        /// 매니페스트 형식
        format: &'static str,
    },

    /// 의존성 수 상한 초과
    #[error("manifest declares {count} dependencies (max: {max})")]
    TooManyDependencies {
        /// 선언된 수
        count: usize,
        /// 상한
        max: usize,
    },
}

impl ParseError {
    pub(crate) fn malformed(format: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            format,
            reason: reason.into(),
        }
    }
}

/// 취약점 소스 호출 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// 호출 타임아웃
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// 소스가 요청량 제한 응답(429)을 반환
    #[error("rate limited by source")]
    RateLimited,

    /// 비정상 HTTP 상태
    #[error("unexpected http status {status}")]
    Http {
        /// 상태 코드
        status: u16,
    },

    /// 연결/전송 실패
    #[error("transport error: {0}")]
    Transport(String),

    /// 응답 디코딩 실패
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// 소스 설정/데이터 에러 (로컬 DB 로딩 등)
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// 재시도 대상 여부 (타임아웃, 5xx, 429, 전송 실패)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Transport(_) => true,
            Self::Http { status } => *status >= 500,
            Self::Decode(_) | Self::Unavailable(_) => false,
        }
    }

    /// HTTP 상태 코드로부터 에러를 만듭니다.
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            Self::RateLimited
        } else {
            Self::Http { status }
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// 스캔 요청 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 매니페스트 크기 초과 (파싱 전 거부)
    #[error("manifest too large: {size} bytes (max: {max})")]
    FileTooLarge {
        /// 입력 크기
        size: usize,
        /// 상한
        max: usize,
    },

    /// 매니페스트 파싱 실패
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// 같은 프로젝트의 스캔이 이미 실행 중
    #[error("scan already in progress for project {project_id}")]
    ScanInProgress {
        /// 프로젝트
        project_id: ProjectId,
    },

    /// 존재하지 않는 프로젝트
    #[error("project {project_id} not found")]
    ProjectNotFound {
        /// 프로젝트
        project_id: ProjectId,
    },

    /// 저장소 에러 (스캔은 FAILED로 전이)
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 스캔 태스크가 결과 없이 종료됨 (패닉 또는 런타임 종료)
    #[error("scan task aborted: {0}")]
    Aborted(String),

    /// 스캐너 설정 에러
    #[error("scanner config error: {field}: {reason}")]
    Config {
        /// 설정 필드
        field: String,
        /// 사유
        reason: String,
    },
}

impl From<ScanError> for VulnwatchError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Parse(e) => VulnwatchError::Scanner(ScannerError::Parse(e.to_string())),
            ScanError::FileTooLarge { .. }
            | ScanError::ScanInProgress { .. }
            | ScanError::ProjectNotFound { .. } => {
                VulnwatchError::Scanner(ScannerError::Rejected(err.to_string()))
            }
            ScanError::Store(e) => VulnwatchError::Store(e),
            ScanError::Aborted(reason) => VulnwatchError::Scanner(ScannerError::Failed(reason)),
            ScanError::Config { field, reason } => {
                VulnwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}
