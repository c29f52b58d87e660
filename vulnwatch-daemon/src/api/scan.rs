//! Scan endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use vulnwatch_core::types::{ProjectId, ScanStats};
use vulnwatch_scanner::{ProjectReport, RiskLevel};

use super::{ApiError, AppState, AuthUser};

/// Query parameters for a manifest upload.
#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// Original file name, used for format detection.
    pub file_name: String,
    /// Explicit format hint (`npm`, `pypi`, `maven`, ...).
    pub format: Option<String>,
}

/// Project report plus its overall risk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    #[serde(flatten)]
    report: ProjectReport,
    overall_risk: RiskLevel,
    outdated_count: usize,
}

/// `POST /api/scan/:project_id`
pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<ProjectId>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<ScanStats>, ApiError> {
    state.owned_project(user_id, project_id).await?;
    tracing::info!(
        user_id,
        project_id,
        file_name = %params.file_name,
        bytes = body.len(),
        "manifest upload received"
    );
    let stats = state
        .scanner
        .scan_upload(project_id, &params.file_name, &body, params.format.as_deref())
        .await?;
    Ok(Json(stats))
}

/// `POST /api/scan/:project_id/rescan`
pub async fn rescan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<ScanStats>, ApiError> {
    state.owned_project(user_id, project_id).await?;
    let stats = state.scanner.rescan(project_id).await?;
    Ok(Json(stats))
}

/// `GET /api/scan/:project_id`
pub async fn report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<ReportResponse>, ApiError> {
    state.owned_project(user_id, project_id).await?;
    let report = state.scanner.project_report(project_id).await?;
    let overall_risk = report.overall_risk();
    let outdated_count = report.outdated_count();
    Ok(Json(ReportResponse {
        report,
        overall_risk,
        outdated_count,
    }))
}
