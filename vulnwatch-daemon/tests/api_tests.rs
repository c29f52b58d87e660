//! HTTP API integration tests.
//!
//! Drives the full router (scan orchestrator, notification bus, in-memory
//! store) with `tower::ServiceExt::oneshot`, using a local advisory database
//! so no network is involved.

use std::path::Path;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use vulnwatch_core::config::{SourceConfig, VulnwatchConfig};
use vulnwatch_core::types::UserProfile;
use vulnwatch_daemon::api::USER_HEADER;
use vulnwatch_daemon::orchestrator::Orchestrator;
use vulnwatch_daemon::seed::{SeedData, SeedProject};

const ADVISORY_DB: &str = r#"[
  {
    "id": "GHSA-x84v-xcm2-53pg",
    "aliases": ["CVE-2018-18074"],
    "package": "requests",
    "ecosystem": "pypi",
    "affected_ranges": [{ "fixed": "2.20.0" }],
    "severity": "HIGH",
    "summary": "Insufficiently protected credentials"
  }
]"#;

const REQUIREMENTS: &str = "requests==2.19.0\nflask==2.3.0\n";

fn test_config(db_path: &Path) -> VulnwatchConfig {
    let mut config = VulnwatchConfig::default();
    config.sources = vec![SourceConfig {
        name: "local".to_owned(),
        kind: "local".to_owned(),
        path: db_path.display().to_string(),
        ..SourceConfig::default()
    }];
    config.scheduler.enabled = false;
    config.server.enabled = false;
    config
}

fn test_seed() -> SeedData {
    SeedData {
        users: vec![
            UserProfile {
                id: 1,
                email: "alice@example.com".to_owned(),
                name: "Alice".to_owned(),
            },
            UserProfile {
                id: 2,
                email: "bob@example.com".to_owned(),
                name: "Bob".to_owned(),
            },
        ],
        projects: vec![
            SeedProject {
                owner: 1,
                name: "web".to_owned(),
            },
            SeedProject {
                owner: 2,
                name: "api".to_owned(),
            },
        ],
    }
}

/// Build a daemon over a temporary advisory database.
async fn build_daemon() -> (Orchestrator, TempDir) {
    let dir = TempDir::new().expect("should create temp dir");
    let db_path = dir.path().join("advisories.json");
    std::fs::write(&db_path, ADVISORY_DB).expect("should write advisory db");
    let orchestrator = Orchestrator::build_from_config(test_config(&db_path), Some(test_seed()))
        .await
        .expect("daemon should build");
    (orchestrator, dir)
}

fn request(method: &str, uri: &str, user: Option<u64>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user.to_string());
    }
    builder.body(body).expect("request should build")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn upload_requirements(router: &Router) -> Value {
    let (status, body) = send(
        router,
        request(
            "POST",
            "/api/scan/1?file_name=requirements.txt",
            Some(1),
            Body::from(REQUIREMENTS),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "upload should succeed: {body}");
    body
}

/// Test that an upload scans every dependency and reports the vulnerable one.
#[tokio::test]
async fn test_upload_scans_manifest() {
    // Given: A daemon with one known advisory for requests < 2.20.0
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    // When: Uploading a requirements file
    let stats = upload_requirements(&router).await;

    // Then: Both dependencies are scanned and one vulnerability is found
    assert_eq!(stats["projectId"], 1);
    assert_eq!(stats["totalDependencies"], 2);
    assert_eq!(stats["totalVulnerabilities"], 1);
    assert_eq!(stats["severityCounts"]["high"], 1);
    assert_eq!(stats["partial"], false);
}

/// Test that a completed scan leaves a security alert and a scan summary.
#[tokio::test]
async fn test_upload_creates_notifications() {
    // Given: A daemon and a vulnerable upload
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();
    upload_requirements(&router).await;

    // When: Listing the owner's notifications
    let (status, page) = send(&router, request("GET", "/api/notifications", Some(1), Body::empty())).await;

    // Then: Newest first, scan summary above the security alert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    let notifications = page["notifications"].as_array().expect("array");
    assert_eq!(notifications[0]["type"], "scan");
    assert_eq!(notifications[1]["type"], "security");
    assert!(
        notifications[1]["message"]
            .as_str()
            .unwrap_or_default()
            .contains("requests")
    );

    // And the other user sees nothing
    let (_, other) = send(&router, request("GET", "/api/notifications", Some(2), Body::empty())).await;
    assert_eq!(other["total"], 0);
}

/// Test that the project report carries per-dependency risk and the overall risk.
#[tokio::test]
async fn test_project_report() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();
    upload_requirements(&router).await;

    let (status, report) = send(&router, request("GET", "/api/scan/1", Some(1), Body::empty())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["overallRisk"], "high");
    assert_eq!(report["state"], "SUCCEEDED");
    assert_eq!(report["project"]["name"], "web");
    assert_eq!(report["dependencies"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["lastScan"]["totalVulnerabilities"], 1);
}

/// Test that a project that was never scanned reports PENDING and secure.
#[tokio::test]
async fn test_report_before_first_scan() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    let (status, report) = send(&router, request("GET", "/api/scan/1", Some(1), Body::empty())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["state"], "PENDING");
    assert_eq!(report["overallRisk"], "secure");
    assert!(report["lastScan"].is_null());
}

/// Test that a rescan reuses the stored dependencies without re-alerting.
#[tokio::test]
async fn test_rescan_uses_stored_dependencies() {
    // Given: A project scanned once
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();
    upload_requirements(&router).await;

    // When: Triggering a rescan
    let (status, stats) = send(&router, request("POST", "/api/scan/1/rescan", Some(1), Body::empty())).await;

    // Then: Same dependencies, no new security alert (only a second scan summary)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalDependencies"], 2);
    assert_eq!(stats["totalVulnerabilities"], 1);
    let (_, page) = send(
        &router,
        request("GET", "/api/notifications?type=security", Some(1), Body::empty()),
    )
    .await;
    assert_eq!(page["total"], 1);
}

/// Test that requests without a user header are rejected.
#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    let (status, body) = send(&router, request("GET", "/api/notifications", None, Body::empty())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap_or_default().contains(USER_HEADER));
}

/// Test that another user's project looks like a missing project.
#[tokio::test]
async fn test_foreign_project_is_not_found() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    let (status, _) = send(
        &router,
        request(
            "POST",
            "/api/scan/1?file_name=requirements.txt",
            Some(2),
            Body::from(REQUIREMENTS),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, request("GET", "/api/scan/99", Some(1), Body::empty())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Test that unsupported and malformed manifests are client errors.
#[tokio::test]
async fn test_bad_manifests_are_rejected() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    let (status, body) = send(
        &router,
        request(
            "POST",
            "/api/scan/1?file_name=build.gradle",
            Some(1),
            Body::from("dependencies {}"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("build.gradle"));

    let (status, _) = send(
        &router,
        request(
            "POST",
            "/api/scan/1?file_name=package.json",
            Some(1),
            Body::from("{ not json"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A rejected upload never starts a scan
    let (_, report) = send(&router, request("GET", "/api/scan/1", Some(1), Body::empty())).await;
    assert_eq!(report["state"], "PENDING");
}

/// Test that an upload over the size limit is refused before parsing.
#[tokio::test]
async fn test_oversized_upload_rejected() {
    // Given: A daemon with a 1 KiB manifest limit
    let dir = TempDir::new().expect("should create temp dir");
    let db_path = dir.path().join("advisories.json");
    std::fs::write(&db_path, ADVISORY_DB).expect("should write advisory db");
    let mut config = test_config(&db_path);
    config.scan.max_manifest_bytes = 1024;
    let daemon = Orchestrator::build_from_config(config, Some(test_seed()))
        .await
        .expect("daemon should build");
    let router = daemon.router();

    // When: Uploading 4 KiB
    let body = "requests==2.19.0\n".repeat(256);
    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/api/scan/1?file_name=requirements.txt",
            Some(1),
            Body::from(body),
        ))
        .await
        .expect("router should respond");

    // Then: 413 and the project stays unscanned
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        daemon.state().scanner.scan_state(1),
        vulnwatch_scanner::ScanState::Pending
    );
}

/// Test the unread counter through mark-read and mark-all-read.
#[tokio::test]
async fn test_read_flow() {
    // Given: Two unread notifications
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();
    upload_requirements(&router).await;
    let (_, count) = send(&router, request("GET", "/api/notifications/unread-count", Some(1), Body::empty())).await;
    assert_eq!(count["count"], 2);

    // When: Marking the newest one read
    let (_, page) = send(&router, request("GET", "/api/notifications?limit=1", Some(1), Body::empty())).await;
    let id = page["notifications"][0]["id"]
        .as_str()
        .expect("notification id")
        .to_owned();
    let (status, _) = send(
        &router,
        request("POST", &format!("/api/notifications/{id}/read"), Some(1), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Then: One unread remains, and only that one is listed as unread
    let (_, count) = send(&router, request("GET", "/api/notifications/unread-count", Some(1), Body::empty())).await;
    assert_eq!(count["count"], 1);
    let (_, unread) = send(&router, request("GET", "/api/notifications?unread=true", Some(1), Body::empty())).await;
    assert_eq!(unread["total"], 1);
    assert_ne!(unread["notifications"][0]["id"], id.as_str());

    // Another user cannot touch it
    let (status, _) = send(
        &router,
        request("POST", &format!("/api/notifications/{id}/read"), Some(2), Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Mark-all-read clears the rest
    let (_, updated) = send(&router, request("POST", "/api/notifications/read-all", Some(1), Body::empty())).await;
    assert_eq!(updated["updated"], 1);
    let (_, count) = send(&router, request("GET", "/api/notifications/unread-count", Some(1), Body::empty())).await;
    assert_eq!(count["count"], 0);
}

/// Test that an unknown notification type filter is a client error.
#[tokio::test]
async fn test_unknown_type_filter_rejected() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    let (status, _) = send(
        &router,
        request("GET", "/api/notifications?type=billing", Some(1), Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Test that alert preferences default sensibly and merge partial updates.
#[tokio::test]
async fn test_alert_config_roundtrip() {
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();

    let (status, config) = send(&router, request("GET", "/api/alerts/config", Some(1), Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["alertFrequency"], "immediate");
    assert_eq!(config["emailNotifications"], true);

    let update = json!({ "alertFrequency": "daily", "securityAlerts": false });
    let (status, config) = send(
        &router,
        Request::builder()
            .method("PUT")
            .uri("/api/alerts/config")
            .header(USER_HEADER, "1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(update.to_string()))
            .expect("request should build"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["alertFrequency"], "daily");
    assert_eq!(config["securityAlerts"], false);
    assert_eq!(config["dailyDigest"], true);

    let (_, stored) = send(&router, request("GET", "/api/alerts/config", Some(1), Body::empty())).await;
    assert_eq!(stored, config);
}

/// Test that the live stream opens with a connected frame and releases its
/// subscription when the client goes away.
#[tokio::test]
async fn test_stream_connected_and_released() {
    // Given: A daemon with no subscribers
    let (daemon, _dir) = build_daemon().await;
    let router = daemon.router();
    assert_eq!(daemon.state().bus().total_subscribers(), 0);

    // When: Opening the stream
    let response = router
        .clone()
        .oneshot(request("GET", "/api/notifications/stream", Some(1), Body::empty()))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(1), frames.next())
        .await
        .expect("first frame should arrive")
        .expect("stream should not end")
        .expect("frame should be readable");

    // Then: The first frame announces the connection
    let text = String::from_utf8_lossy(&first);
    assert!(text.starts_with("data: "), "unexpected frame: {text}");
    assert!(text.contains("\"type\":\"connected\""), "unexpected frame: {text}");
    assert_eq!(daemon.state().bus().subscriber_count(1), 1);

    // And dropping the connection unregisters it
    drop(frames);
    assert_eq!(daemon.state().bus().total_subscribers(), 0);
}
