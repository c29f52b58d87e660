//! Integration tests for the alert scheduler
//!
//! Tests digest batching, boundary rules, rescan isolation and the scheduler lifecycle.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use vulnwatch_core::error::StoreError;
use vulnwatch_core::pipeline::{BoxFuture, Pipeline};
use vulnwatch_core::store::{MemoryStore, NotificationStore, ProjectStore};
use vulnwatch_core::types::{
    AlertConfig, AlertFrequency, Dependency, DependencyRecord, DependencyScan, Issue,
    NewNotification, NotificationQuery, NotificationType, Project, ProjectId, ScanStats, Severity,
    UserId, UserProfile,
};
use vulnwatch_notify::{BusConfig, DeliveryError, EmailMessage, Mailer, NotificationBus};
use vulnwatch_scanner::{
    AdvisorySource, RateLimiters, Resolver, RetryPolicy, ScanConfigBuilder, ScanOrchestrator,
    SourceError, VulnerabilityRecord,
};
use vulnwatch_scheduler::{
    AlertScheduler, AlertSchedulerBuilder, BoundaryRule, SchedulerConfigBuilder,
};

const DAILY_USER: UserId = 1;
const IMMEDIATE_USER: UserId = 2;
const WEEKLY_USER: UserId = 3;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Mailer that records every message, optionally failing.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == address).collect()
    }
}

impl Mailer for RecordingMailer {
    fn send<'a>(&'a self, message: EmailMessage) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(message);
            if self.fail.load(Ordering::SeqCst) {
                Err(DeliveryError::Rejected { status: 503 })
            } else {
                Ok(())
            }
        })
    }
}

/// Source reporting one HIGH advisory for every dependency.
struct AlwaysVulnerable;

impl AdvisorySource for AlwaysVulnerable {
    fn name(&self) -> &str {
        "osv"
    }

    fn query<'a>(
        &'a self,
        dependency: &'a DependencyRecord,
    ) -> BoxFuture<'a, Result<Vec<VulnerabilityRecord>, SourceError>> {
        let record = VulnerabilityRecord {
            id: format!("GHSA-{}", dependency.name),
            aliases: Vec::new(),
            title: format!("Issue in {}", dependency.name),
            description: String::new(),
            severity: Severity::High,
            ranges: BTreeSet::new(),
            sources: BTreeSet::from(["osv".to_owned()]),
        };
        Box::pin(async move { Ok(vec![record]) })
    }
}

/// Project store whose writes fail for selected projects.
struct SelectiveStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<ProjectId>>,
}

impl SelectiveStore {
    fn check(&self, project_id: ProjectId) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(&project_id) {
            Err(StoreError::Unavailable("connection refused".to_owned()))
        } else {
            Ok(())
        }
    }
}

impl ProjectStore for SelectiveStore {
    async fn projects(&self) -> Result<Vec<Project>, StoreError> {
        self.inner.projects().await
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        self.inner.project(id).await
    }

    async fn dependencies(&self, project_id: ProjectId) -> Result<Vec<Dependency>, StoreError> {
        self.inner.dependencies(project_id).await
    }

    async fn dependency_issues(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<(Dependency, Vec<Issue>)>, StoreError> {
        self.inner.dependency_issues(project_id).await
    }

    async fn commit_scan(
        &self,
        stats: ScanStats,
        results: Vec<DependencyScan>,
    ) -> Result<(), StoreError> {
        self.check(stats.project_id)?;
        self.inner.commit_scan(stats, results).await
    }

    async fn last_scan(&self, project_id: ProjectId) -> Result<Option<ScanStats>, StoreError> {
        self.inner.last_scan(project_id).await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

struct Harness {
    store: Arc<MemoryStore>,
    projects: Arc<SelectiveStore>,
    mailer: Arc<RecordingMailer>,
    bus: Arc<NotificationBus<MemoryStore>>,
    orchestrator: Arc<ScanOrchestrator<SelectiveStore, MemoryStore>>,
}

fn email_of(user_id: UserId) -> String {
    format!("user{user_id}@example.com")
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    for id in [DAILY_USER, IMMEDIATE_USER, WEEKLY_USER] {
        store
            .upsert_user(UserProfile {
                id,
                email: email_of(id),
                name: format!("User {id}"),
            })
            .await;
    }
    set_frequency(&store, DAILY_USER, AlertFrequency::Daily).await;
    set_frequency(&store, IMMEDIATE_USER, AlertFrequency::Immediate).await;
    set_frequency(&store, WEEKLY_USER, AlertFrequency::Weekly).await;

    let mailer = Arc::new(RecordingMailer::default());
    let bus = Arc::new(NotificationBus::new(
        Arc::clone(&store),
        mailer.clone(),
        BusConfig::default(),
    ));
    let projects = Arc::new(SelectiveStore {
        inner: Arc::clone(&store),
        failing: Mutex::new(HashSet::new()),
    });
    let resolver = Resolver::new(
        vec![Arc::new(AlwaysVulnerable)],
        Arc::new(RateLimiters::unlimited()),
        RetryPolicy::no_retry(),
        Duration::from_secs(5),
    );
    let orchestrator = ScanOrchestrator::new(
        Arc::clone(&projects),
        Arc::clone(&bus),
        resolver,
        ScanConfigBuilder::new().build().unwrap(),
    )
    .unwrap();

    Harness {
        store,
        projects,
        mailer,
        bus,
        orchestrator: Arc::new(orchestrator),
    }
}

fn scheduler(h: &Harness, rule: BoundaryRule) -> AlertScheduler<SelectiveStore, MemoryStore> {
    let config = SchedulerConfigBuilder::new()
        .boundary(rule)
        .project_concurrency(2)
        .digest_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    AlertSchedulerBuilder::new(Arc::clone(&h.orchestrator))
        .config(config)
        .build()
        .unwrap()
}

async fn set_frequency(store: &MemoryStore, user_id: UserId, frequency: AlertFrequency) {
    store
        .set_alert_config(AlertConfig {
            alert_frequency: frequency,
            ..AlertConfig::default_for(user_id)
        })
        .await
        .unwrap();
}

fn security(user_id: UserId, n: usize) -> NewNotification {
    NewNotification::new(
        user_id,
        NotificationType::Security,
        format!("Security Alert: advisory {n}"),
        serde_json::json!({ "severity": "HIGH" }),
    )
}

async fn messages(store: &MemoryStore, user_id: UserId, kind: NotificationType) -> Vec<String> {
    store
        .notifications(
            user_id,
            NotificationQuery {
                kind: Some(kind),
                limit: 100,
                ..NotificationQuery::default()
            },
        )
        .await
        .unwrap()
        .notifications
        .into_iter()
        .map(|n| n.message)
        .collect()
}

fn manifest(deps: &[&str]) -> Vec<u8> {
    let body: Vec<String> = deps.iter().map(|d| format!("\"{d}\": \"1.0.0\"")).collect();
    format!("{{\"dependencies\":{{{}}}}}", body.join(",")).into_bytes()
}

// ─── Digest ─────────────────────────────────────────────────────────

/// Test that three unread security notifications produce exactly one batched email
#[tokio::test]
async fn test_daily_digest_batches_three_notifications() {
    let h = harness().await;
    for n in 0..3 {
        h.bus.publish(security(DAILY_USER, n)).await.unwrap();
    }
    assert!(h.mailer.sent().is_empty());

    let scheduler = scheduler(&h, BoundaryRule::Rolling);
    let report = scheduler
        .run_digest_once(Utc::now() + chrono::Duration::days(2))
        .await
        .unwrap();
    assert_eq!(report.digests_sent, 1);
    assert_eq!(report.items_delivered, 3);
    assert_eq!(report.emails_failed, 0);

    let sent = h.mailer.sent_to(&email_of(DAILY_USER));
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "VulnWatch daily security digest (3 items)");
    for n in 0..3 {
        assert!(sent[0].text.contains(&format!("Security Alert: advisory {n}")));
    }

    // delivered but still unread
    assert_eq!(h.bus.unread_count(DAILY_USER).await.unwrap(), 4);
    assert_eq!(
        messages(&h.store, DAILY_USER, NotificationType::System).await,
        vec!["Your daily security digest (3 items) was emailed".to_owned()]
    );
}

/// Test that delivered notifications are not sent again
#[tokio::test]
async fn test_digest_does_not_resend_delivered_items() {
    let h = harness().await;
    h.bus.publish(security(DAILY_USER, 1)).await.unwrap();
    let scheduler = scheduler(&h, BoundaryRule::Rolling);

    let first = Utc::now() + chrono::Duration::days(2);
    scheduler.run_digest_once(first).await.unwrap();
    let second = scheduler
        .run_digest_once(first + chrono::Duration::days(2))
        .await
        .unwrap();
    assert_eq!(second.digests_sent, 0);
    assert_eq!(h.mailer.sent_to(&email_of(DAILY_USER)).len(), 1);
}

/// Test that immediate users get per-notification email and no digest
#[tokio::test]
async fn test_immediate_user_is_not_batched() {
    let h = harness().await;
    for n in 0..3 {
        h.bus.publish(security(IMMEDIATE_USER, n)).await.unwrap();
    }
    assert_eq!(h.mailer.sent_to(&email_of(IMMEDIATE_USER)).len(), 3);

    let scheduler = scheduler(&h, BoundaryRule::Rolling);
    let report = scheduler
        .run_digest_once(Utc::now() + chrono::Duration::days(8))
        .await
        .unwrap();
    assert_eq!(report.digests_sent, 0);
    assert_eq!(h.mailer.sent_to(&email_of(IMMEDIATE_USER)).len(), 3);
}

/// Test that the rolling boundary waits one full period for the first digest
#[tokio::test]
async fn test_rolling_boundary_not_reached() {
    let h = harness().await;
    h.bus.publish(security(DAILY_USER, 1)).await.unwrap();
    let scheduler = scheduler(&h, BoundaryRule::Rolling);

    let report = scheduler
        .run_digest_once(Utc::now() + chrono::Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(report.users_evaluated, 2);
    assert_eq!(report.digests_sent, 0);
    assert!(h.mailer.sent().is_empty());
}

/// Test that the calendar boundary sends a weekly digest once the week rolls over
#[tokio::test]
async fn test_calendar_boundary_weekly() {
    let h = harness().await;
    h.bus.publish(security(WEEKLY_USER, 1)).await.unwrap();
    h.bus
        .publish(NewNotification::new(
            WEEKLY_USER,
            NotificationType::Scan,
            "Scan completed for project web. Found 1 dependencies with no vulnerabilities found",
            serde_json::Value::Null,
        ))
        .await
        .unwrap();
    let scheduler = scheduler(&h, BoundaryRule::Calendar);

    let now = Utc::now();
    let same_week = scheduler.run_digest_once(now).await.unwrap();
    assert_eq!(same_week.digests_sent, 0);

    let next_week = BoundaryRule::period_start(AlertFrequency::Weekly, now).unwrap()
        + chrono::Duration::days(7);
    let report = scheduler.run_digest_once(next_week).await.unwrap();
    assert_eq!(report.digests_sent, 1);
    assert_eq!(report.items_delivered, 2);

    let sent = h.mailer.sent_to(&email_of(WEEKLY_USER));
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "VulnWatch weekly security digest (2 items)");
}

/// Test that opted-out users are skipped
#[tokio::test]
async fn test_opted_out_users_are_skipped() {
    let h = harness().await;
    h.store
        .set_alert_config(AlertConfig {
            alert_frequency: AlertFrequency::Daily,
            daily_digest: false,
            ..AlertConfig::default_for(DAILY_USER)
        })
        .await
        .unwrap();
    h.store
        .set_alert_config(AlertConfig {
            alert_frequency: AlertFrequency::Weekly,
            email_notifications: false,
            ..AlertConfig::default_for(WEEKLY_USER)
        })
        .await
        .unwrap();
    h.bus.publish(security(DAILY_USER, 1)).await.unwrap();
    h.bus.publish(security(WEEKLY_USER, 1)).await.unwrap();

    let scheduler = scheduler(&h, BoundaryRule::Rolling);
    let report = scheduler
        .run_digest_once(Utc::now() + chrono::Duration::days(8))
        .await
        .unwrap();
    assert_eq!(report.users_evaluated, 0);
    assert!(h.mailer.sent().is_empty());
}

/// Test that a failed digest email still marks items delivered
#[tokio::test]
async fn test_email_failure_still_marks_delivered() {
    let h = harness().await;
    h.bus.publish(security(DAILY_USER, 1)).await.unwrap();
    h.mailer.fail.store(true, Ordering::SeqCst);

    let scheduler = scheduler(&h, BoundaryRule::Rolling);
    let now = Utc::now() + chrono::Duration::days(2);
    let report = scheduler.run_digest_once(now).await.unwrap();
    assert_eq!(report.digests_sent, 1);
    assert_eq!(report.emails_failed, 1);

    assert_eq!(h.store.last_digest_at(DAILY_USER).await.unwrap(), Some(now));
    let pending = h
        .store
        .pending_digest(DAILY_USER, None, vec![NotificationType::Security])
        .await
        .unwrap();
    assert!(pending.is_empty());
    assert!(
        messages(&h.store, DAILY_USER, NotificationType::System)
            .await
            .is_empty()
    );
}

// ─── Rescan ─────────────────────────────────────────────────────────

/// Test that one failing project does not block the rescan of others
#[tokio::test]
async fn test_rescan_isolates_failing_project() {
    let h = harness().await;
    let broken = h.store.create_project(DAILY_USER, "broken").await;
    let healthy = h.store.create_project(DAILY_USER, "healthy").await;
    let fresh = h.store.create_project(DAILY_USER, "fresh").await;

    for project in [&broken, &healthy] {
        h.orchestrator
            .scan_upload(project.id, "package.json", &manifest(&["lodash"]), None)
            .await
            .unwrap();
    }
    let before = h.store.last_scan(healthy.id).await.unwrap().unwrap();
    h.projects.failing.lock().unwrap().insert(broken.id);

    let scheduler = scheduler(&h, BoundaryRule::Rolling);
    let report = scheduler.run_rescan_once().await.unwrap();
    assert_eq!(report.projects, 3);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.never_scanned, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, broken.id);

    let after = h.store.last_scan(healthy.id).await.unwrap().unwrap();
    assert!(after.finished_at >= before.finished_at);
    assert_eq!(after.total_vulnerabilities, 1);
    assert!(h.store.last_scan(fresh.id).await.unwrap().is_none());
    assert_eq!(scheduler.rescan_cycles(), 1);

    let system = messages(&h.store, DAILY_USER, NotificationType::System).await;
    assert_eq!(system.len(), 1);
    assert!(system[0].starts_with("Scan failed for project broken"));
}

// ─── Lifecycle ──────────────────────────────────────────────────────

/// Test start/stop transitions and health reporting
#[tokio::test]
async fn test_scheduler_lifecycle() {
    let h = harness().await;
    let mut scheduler = scheduler(&h, BoundaryRule::Rolling);
    assert_eq!(scheduler.state_name(), "initialized");
    assert!(scheduler.health_check().await.is_unhealthy());

    scheduler.start().await.unwrap();
    assert!(scheduler.start().await.is_err());
    assert_eq!(scheduler.state_name(), "running");
    assert!(scheduler.health_check().await.is_healthy());

    scheduler.stop().await.unwrap();
    assert!(scheduler.stop().await.is_err());
    assert!(scheduler.health_check().await.is_unhealthy());
}

/// Test that the digest loop fires on its interval
#[tokio::test(start_paused = true)]
async fn test_digest_loop_runs_on_interval() {
    let h = harness().await;
    let mut scheduler = scheduler(&h, BoundaryRule::Rolling);
    scheduler.start().await.unwrap();
    assert_eq!(scheduler.digest_cycles(), 0);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(scheduler.digest_cycles(), 1);
    assert_eq!(scheduler.rescan_cycles(), 0);

    scheduler.stop().await.unwrap();
}

/// Test that disabled loops leave manual triggers working
#[tokio::test(start_paused = true)]
async fn test_disabled_scheduler_spawns_no_loops() {
    let h = harness().await;
    let config = SchedulerConfigBuilder::new()
        .enabled(false)
        .digest_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    let mut scheduler = AlertSchedulerBuilder::new(Arc::clone(&h.orchestrator))
        .config(config)
        .build()
        .unwrap();
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(scheduler.digest_cycles(), 0);
    assert!(!scheduler.health_check().await.is_healthy());

    scheduler.run_digest_once(Utc::now()).await.unwrap();
    assert_eq!(scheduler.digest_cycles(), 1);
    scheduler.stop().await.unwrap();
}
