//! HTTP API.
//!
//! Thin handlers over the scan orchestrator and the notification bus.
//! Callers are identified by the `x-user-id` header; authentication itself
//! is handled in front of the daemon.
//!
//! ```text
//! POST /api/scan/:project_id?file_name=..&format=..   upload manifest, scan
//! POST /api/scan/:project_id/rescan                   rescan stored deps
//! GET  /api/scan/:project_id                          project report
//! GET  /api/notifications                             list (page, limit, type, unread)
//! GET  /api/notifications/unread-count
//! POST /api/notifications/:id/read
//! POST /api/notifications/read-all
//! GET  /api/notifications/stream                      live SSE stream
//! GET  /api/alerts/config
//! PUT  /api/alerts/config
//! GET  /health
//! ```

pub mod alerts;
pub mod notifications;
pub mod scan;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use vulnwatch_core::error::StoreError;
use vulnwatch_core::store::{MemoryStore, ProjectStore};
use vulnwatch_core::types::{Project, ProjectId, UserId};
use vulnwatch_notify::{NotificationBus, NotifyError};
use vulnwatch_scanner::{ParseError, ScanError, ScanOrchestrator};

use crate::health::{DaemonHealth, aggregate_status};
use crate::modules::ModuleRegistry;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

/// Scan orchestrator over the in-memory store.
pub type DaemonScanner = ScanOrchestrator<MemoryStore, MemoryStore>;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Scan orchestrator (owns the store and the notification bus).
    pub scanner: Arc<DaemonScanner>,
    /// Background modules, for health reporting.
    pub modules: Arc<RwLock<ModuleRegistry>>,
    /// Daemon start time.
    pub start_time: Instant,
}

impl AppState {
    /// Create the handler state.
    pub fn new(scanner: Arc<DaemonScanner>, modules: Arc<RwLock<ModuleRegistry>>) -> Self {
        Self {
            scanner,
            modules,
            start_time: Instant::now(),
        }
    }

    /// Notification bus.
    pub fn bus(&self) -> &Arc<NotificationBus<MemoryStore>> {
        self.scanner.bus()
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        self.scanner.store()
    }

    /// Aggregated daemon health.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.read().await.health().await;
        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            running_scans: self.scanner.running_scans(),
            subscribers: self.bus().total_subscribers(),
            modules,
        }
    }

    /// Load a project the user owns. Projects owned by someone else are
    /// reported as missing.
    pub async fn owned_project(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<Project, ApiError> {
        match self.store().project(project_id).await? {
            Some(project) if project.owner_id == user_id => Ok(project),
            _ => Err(ApiError::NotFound(format!("project {} not found", project_id))),
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let max_manifest_bytes = state.scanner.config().max_manifest_bytes;

    let scan_routes = Router::new()
        .route("/:project_id", post(scan::upload).get(scan::report))
        .route("/:project_id/rescan", post(scan::rescan))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_manifest_bytes));

    let notification_routes = Router::new()
        .route("/", get(notifications::list))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/stream", get(notifications::stream))
        .route("/:id/read", post(notifications::mark_read));

    let alert_routes = Router::new().route(
        "/config",
        get(alerts::get_config).put(alerts::update_config),
    );

    Router::new()
        .route("/health", get(health))
        .nest("/api/scan", scan_routes)
        .nest("/api/notifications", notification_routes)
        .nest("/api/alerts", alert_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<DaemonHealth>) {
    let health = state.health().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}

/// Authenticated caller, taken from the [`USER_HEADER`] header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .map(Self)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Handler error, rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed user header.
    Unauthorized,
    /// Invalid input the caller can fix.
    BadRequest(String),
    /// Unknown (or foreign) resource.
    NotFound(String),
    /// Conflicting operation in progress.
    Conflict(String),
    /// Upload over the size limit.
    PayloadTooLarge(String),
    /// Store or other internal failure.
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Unauthorized => format!("missing or invalid {} header", USER_HEADER),
            Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::PayloadTooLarge(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.message(), "request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::FileTooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            ScanError::Parse(ParseError::TooManyDependencies { .. }) => {
                Self::PayloadTooLarge(err.to_string())
            }
            ScanError::Parse(_) => Self::BadRequest(err.to_string()),
            ScanError::ScanInProgress { .. } => Self::Conflict(err.to_string()),
            ScanError::ProjectNotFound { .. } => Self::NotFound(err.to_string()),
            ScanError::Store(_) | ScanError::Aborted(_) | ScanError::Config { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}
