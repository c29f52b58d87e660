//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `vulnwatch_`
//! - 모듈명: `scan_`, `source_`, `notify_`, `digest_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 취약점 소스 레이블 키
pub const LABEL_SOURCE: &str = "source";

/// 심각도 레이블 키 (low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 매니페스트 형식 레이블 키
pub const LABEL_FORMAT: &str = "format";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 스캔 트리거 레이블 키 (upload, rescan)
pub const LABEL_TRIGGER: &str = "trigger";

// ─── Scan 메트릭 ────────────────────────────────────────────────────

/// Scan: 완료된 스캔 수 (counter, label: trigger, result)
pub const SCAN_RUNS_TOTAL: &str = "vulnwatch_scan_runs_total";

/// Scan: 거부된 스캔 요청 수 (counter, label: reason)
pub const SCAN_REJECTED_TOTAL: &str = "vulnwatch_scan_rejected_total";

/// Scan: 스캔 소요 시간 (histogram, 초)
pub const SCAN_DURATION_SECONDS: &str = "vulnwatch_scan_duration_seconds";

/// Scan: 파싱된 매니페스트 수 (counter, label: format)
pub const SCAN_MANIFESTS_PARSED_TOTAL: &str = "vulnwatch_scan_manifests_parsed_total";

/// Scan: 저장된 이슈 수 (counter, label: severity)
pub const SCAN_ISSUES_PERSISTED_TOTAL: &str = "vulnwatch_scan_issues_persisted_total";

/// Scan: 현재 실행 중인 스캔 수 (gauge)
pub const SCAN_RUNNING: &str = "vulnwatch_scan_running";

// ─── Source 메트릭 ──────────────────────────────────────────────────

/// Source: 소스 요청 수 (counter, label: source, result)
pub const SOURCE_REQUESTS_TOTAL: &str = "vulnwatch_source_requests_total";

/// Source: 재시도 수 (counter, label: source)
pub const SOURCE_RETRIES_TOTAL: &str = "vulnwatch_source_retries_total";

/// Source: 재시도 소진으로 부분 실패한 수 (counter, label: source)
pub const SOURCE_FAILURES_TOTAL: &str = "vulnwatch_source_failures_total";

/// Source: 레이트 리미터 대기 시간 (histogram, 초)
pub const SOURCE_THROTTLE_SECONDS: &str = "vulnwatch_source_throttle_seconds";

// ─── Notify 메트릭 ──────────────────────────────────────────────────

/// Notify: 저장된 알림 수 (counter, label: type)
pub const NOTIFY_APPENDED_TOTAL: &str = "vulnwatch_notify_appended_total";

/// Notify: 현재 연결된 구독자 수 (gauge)
pub const NOTIFY_SUBSCRIBERS: &str = "vulnwatch_notify_subscribers";

/// Notify: 구독자 채널이 가득 차 버려진 이벤트 수 (counter)
pub const NOTIFY_EVENTS_DROPPED_TOTAL: &str = "vulnwatch_notify_events_dropped_total";

/// Notify: 즉시 이메일 전송 수 (counter, label: result)
pub const NOTIFY_EMAILS_TOTAL: &str = "vulnwatch_notify_emails_total";

// ─── Digest / Scheduler 메트릭 ──────────────────────────────────────

/// Digest: 발송된 다이제스트 수 (counter, label: result)
pub const DIGEST_SENT_TOTAL: &str = "vulnwatch_digest_sent_total";

/// Scheduler: 재스캔 주기 실행 수 (counter)
pub const SCHEDULER_RESCAN_CYCLES_TOTAL: &str = "vulnwatch_scheduler_rescan_cycles_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "vulnwatch_daemon_uptime_seconds";

/// 스캔 소요 시간 히스토그램 버킷 (초)
pub const SCAN_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SCAN_RUNS_TOTAL, "Total number of scans finished, by trigger and result");
    describe_counter!(
        SCAN_REJECTED_TOTAL,
        "Total number of scan requests rejected before running"
    );
    describe_histogram!(SCAN_DURATION_SECONDS, "Time to complete a project scan in seconds");
    describe_counter!(
        SCAN_MANIFESTS_PARSED_TOTAL,
        "Total number of manifests parsed, by format"
    );
    describe_counter!(
        SCAN_ISSUES_PERSISTED_TOTAL,
        "Total number of issues persisted, by severity"
    );
    describe_gauge!(SCAN_RUNNING, "Number of project scans currently running");

    describe_counter!(
        SOURCE_REQUESTS_TOTAL,
        "Total number of vulnerability source requests, by source and result"
    );
    describe_counter!(SOURCE_RETRIES_TOTAL, "Total number of source request retries");
    describe_counter!(
        SOURCE_FAILURES_TOTAL,
        "Total number of source lookups that exhausted retries"
    );
    describe_histogram!(
        SOURCE_THROTTLE_SECONDS,
        "Time spent waiting on a source rate limiter in seconds"
    );

    describe_counter!(NOTIFY_APPENDED_TOTAL, "Total number of notifications appended");
    describe_gauge!(NOTIFY_SUBSCRIBERS, "Number of live notification subscribers");
    describe_counter!(
        NOTIFY_EVENTS_DROPPED_TOTAL,
        "Total number of stream events dropped for slow subscribers"
    );
    describe_counter!(NOTIFY_EMAILS_TOTAL, "Total number of immediate alert emails");

    describe_counter!(DIGEST_SENT_TOTAL, "Total number of digest emails dispatched");
    describe_counter!(
        SCHEDULER_RESCAN_CYCLES_TOTAL,
        "Total number of fleet rescan cycles run"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "VulnWatch daemon uptime in seconds");
}
