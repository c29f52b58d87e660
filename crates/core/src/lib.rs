//! # vulnwatch-core
//!
//! VulnWatch 전 모듈이 공유하는 도메인 타입, 저장소 계약, 에러, 설정입니다.
//!
//! ```text
//! manifest ──▶ scanner(parser ▶ resolver ▶ orchestrator) ──▶ notify(bus) ──▶ live subscribers
//!                        │                                       │
//!                        ▼                                       ▼
//!                  ProjectStore                          NotificationStore ◀── scheduler(digest)
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, NotifyError, PipelineError, ScannerError, StoreError, VulnwatchError,
};

// 설정
pub use config::VulnwatchConfig;

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};

// 저장소
pub use store::{MemoryStore, NotificationStore, ProjectStore};

// 도메인 타입
pub use types::{
    AlertConfig, AlertFrequency, Dependency, DependencyRecord, DependencyScan, Ecosystem, Issue,
    NewIssue, NewNotification, Notification, NotificationPage, NotificationQuery,
    NotificationType, Project, ProjectId, ScanStats, Severity, SeverityCounts, UserId,
    UserProfile,
};
