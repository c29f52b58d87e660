//! 파이프라인 trait: 백그라운드 모듈의 생명주기 정의
//!
//! 스케줄러처럼 자체 태스크를 띄우는 모듈은 [`Pipeline`]을 구현하고,
//! 데몬은 [`DynPipeline`]을 통해 trait 객체로 모아 시작/정지/헬스체크합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::VulnwatchError;

/// `Send` 가능한 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 백그라운드 모듈 생명주기 trait
///
/// 구현체는 `async fn`으로 작성합니다.
///
/// ```ignore
/// impl Pipeline for AlertScheduler {
///     async fn start(&mut self) -> Result<(), VulnwatchError> { ... }
///     async fn stop(&mut self) -> Result<(), VulnwatchError> { ... }
///     async fn health_check(&self) -> HealthStatus { ... }
/// }
/// ```
pub trait Pipeline: Send + Sync {
    /// 백그라운드 태스크를 시작합니다.
    ///
    /// 이미 실행 중이면 `PipelineError::AlreadyRunning`을 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), VulnwatchError>> + Send;

    /// 백그라운드 태스크를 정지합니다.
    ///
    /// 실행 중이 아니면 `PipelineError::NotRunning`을 반환합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), VulnwatchError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// [`Pipeline`]의 dyn 호환 버전
///
/// `Vec<Box<dyn DynPipeline>>`으로 여러 모듈을 한꺼번에 관리할 때 사용합니다.
/// 모든 `Pipeline` 구현체에 자동으로 구현됩니다.
pub trait DynPipeline: Send + Sync {
    /// 시작
    fn start(&mut self) -> BoxFuture<'_, Result<(), VulnwatchError>>;

    /// 정지
    fn stop(&mut self) -> BoxFuture<'_, Result<(), VulnwatchError>>;

    /// 헬스체크
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), VulnwatchError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), VulnwatchError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
