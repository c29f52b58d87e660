//! 에러 타입: 도메인별 에러 정의
//!
//! 각 크레이트는 자체 도메인 에러를 정의하고 `From` 구현으로
//! [`VulnwatchError`]로 변환합니다. 데몬은 이 최상위 타입만 다룹니다.

/// VulnWatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum VulnwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 스캐너 에러
    #[error("scanner error: {0}")]
    Scanner(#[from] ScannerError),

    /// 알림 에러
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,

    /// 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 저장소 에러
///
/// 스캔 도중 발생하면 해당 스캔은 `FAILED`로 전이하고,
/// 직전에 성공한 스캔 데이터는 그대로 남습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// 저장소에 연결할 수 없음
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// 쿼리/트랜잭션 실패
    #[error("query failed: {0}")]
    Query(String),
}

/// 스캐너 모듈 에러 요약
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// 매니페스트 파싱 실패
    #[error("manifest parse failed: {0}")]
    Parse(String),

    /// 스캔 요청 거부 (진행 중, 크기 초과 등)
    #[error("scan rejected: {0}")]
    Rejected(String),

    /// 스캔 실패
    #[error("scan failed: {0}")]
    Failed(String),
}

/// 알림 모듈 에러 요약
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// 외부 전송(이메일) 실패
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// 알림 처리 실패
    #[error("notification failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_top_level() {
        let err: VulnwatchError = StoreError::Unavailable("connection refused".to_owned()).into();
        assert!(matches!(err, VulnwatchError::Store(StoreError::Unavailable(_))));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn config_error_display_names_field() {
        let err = ConfigError::InvalidValue {
            field: "scan.worker_concurrency".to_owned(),
            reason: "must be > 0".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value for 'scan.worker_concurrency': must be > 0"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: VulnwatchError = io.into();
        assert!(matches!(err, VulnwatchError::Io(_)));
    }
}
