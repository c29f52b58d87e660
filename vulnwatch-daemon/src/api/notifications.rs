//! Notification endpoints and the live stream.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use vulnwatch_core::types::{NotificationPage, NotificationQuery, NotificationType};

use super::{ApiError, AppState, AuthUser};

/// Query parameters for listing notifications.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Page number, from 1.
    pub page: Option<usize>,
    /// Page size.
    pub limit: Option<usize>,
    /// Type filter.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Only unread notifications.
    pub unread: Option<bool>,
}

impl ListParams {
    fn into_query(self) -> Result<NotificationQuery, ApiError> {
        let defaults = NotificationQuery::default();
        let kind = match self.kind.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(NotificationType::from_str_loose(raw).ok_or_else(|| {
                ApiError::BadRequest(format!("unknown notification type '{}'", raw))
            })?),
        };
        Ok(NotificationQuery {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
            kind,
            unread_only: self.unread.unwrap_or(false),
        })
    }
}

/// `GET /api/notifications`
pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<NotificationPage>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.bus().list(user_id, query).await?))
}

/// `GET /api/notifications/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let count = state.bus().unread_count(user_id).await?;
    Ok(Json(json!({ "count": count })))
}

/// `POST /api/notifications/:id/read`
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.bus().mark_read(user_id, &id).await? {
        return Err(ApiError::NotFound(format!("notification {} not found", id)));
    }
    Ok(Json(json!({ "id": id, "read": true })))
}

/// `POST /api/notifications/read-all`
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let updated = state.bus().mark_all_read(user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// `GET /api/notifications/stream`
///
/// One `data: <json>` frame per event. The subscription is released when
/// the client disconnects and the stream is dropped.
pub async fn stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.bus().subscribe(user_id);
    Sse::new(subscription.map(|event| Ok(Event::default().data(event.to_json()))))
}
