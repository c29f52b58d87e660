//! # vulnwatch-scheduler
//!
//! 고정 주기 두 루프를 운영합니다.
//!
//! - 재스캔 루프: 추적 중인 모든 프로젝트를 프로젝트 동시성 제한 안에서 다시 스캔
//! - 다이제스트 루프: `daily`/`weekly` 사용자의 미열람 알림을 한 통의 이메일로 발송
//!
//! # Module Structure
//!
//! - [`error`]: 스케줄러 에러 (`SchedulerError`)
//! - [`config`]: 스케줄러 설정 (`SchedulerConfig`, builder)
//! - [`boundary`]: 다이제스트 경계 규칙 (`BoundaryRule`: rolling, calendar)
//! - [`rescan`]: 재스캔 실행기 (`RescanRunner`, `RescanReport`)
//! - [`digest`]: 다이제스트 실행기 (`DigestRunner`, `DigestReport`)
//! - [`scheduler`]: 생명주기 관리 (`AlertScheduler`, `Pipeline` 구현)

pub mod boundary;
pub mod config;
pub mod digest;
pub mod error;
pub mod rescan;
pub mod scheduler;

// --- Public API Re-exports ---

pub use boundary::BoundaryRule;
pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use digest::{DigestReport, DigestRunner};
pub use error::SchedulerError;
pub use rescan::{RescanReport, RescanRunner};
pub use scheduler::{AlertScheduler, AlertSchedulerBuilder};
