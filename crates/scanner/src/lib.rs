//! # vulnwatch-scanner
//!
//! 매니페스트를 파싱해 의존성을 추출하고, 외부 취약점 소스에 질의해 이슈를 만들고,
//! 프로젝트 단위로 결과를 원자적으로 교체합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 (`ParseError`, `SourceError`, `ScanError`)
//! - [`config`]: 스캐너 설정 (`ScanConfig`, builder)
//! - [`parser`]: 매니페스트 파서 (`ManifestFormat`, `ManifestParser`, 형식별 파서)
//! - [`resolver`]: 취약점 해석 (`Resolver`, `AdvisorySource`, OSV/NVD/로컬 DB, 레이트 리미터, 재시도)
//! - [`orchestrator`]: 스캔 오케스트레이터 (`ScanOrchestrator`, 상태 기계, 단일 실행 가드)
//! - [`registry`]: 레지스트리 최신 버전 조회 (`LatestVersionSource`, `HttpRegistry`)
//! - [`report`]: 프로젝트 리포트 (`ProjectReport`, `RiskLevel`, outdated 표시)
//!
//! # Architecture
//!
//! ```text
//! manifest bytes --> ManifestFormat::detect --> ManifestParser --> Vec<DependencyRecord>
//!                                                                        |
//!                                   bounded workers (worker_concurrency) |
//!                                                                        v
//!                     RateLimiters --> AdvisorySource (osv, nvd, local) x N --> merge
//!                                                                        |
//!                                                   ProjectStore::commit_scan
//!                                                                        |
//!                                              NotificationBus (security, scan, system)
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod report;
pub mod resolver;

// --- Public API Re-exports ---

// Orchestrator
pub use orchestrator::{ScanOrchestrator, ScanState, ScanTrigger};

// Configuration
pub use config::{ScanConfig, ScanConfigBuilder};

// Error
pub use error::{ParseError, ScanError, SourceError};

// Parser
pub use parser::{ManifestFormat, ManifestParser, dedup_last_wins, parse_manifest};

// Resolver
pub use resolver::local::{AdvisoryEntry, LocalDbSource, VersionRange};
pub use resolver::nvd::NvdSource;
pub use resolver::osv::OsvSource;
pub use resolver::{
    AdvisorySource, RateLimiters, Resolution, Resolver, RetryPolicy, SourceKind, TokenBucket,
    VulnerabilityRecord, build_sources, merge_records,
};

// Registry
pub use registry::{HttpRegistry, LatestVersionSource, is_outdated};

// Report
pub use report::{DependencyReport, ProjectReport, RiskLevel};
