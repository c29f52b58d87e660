//! Alert preference endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use vulnwatch_core::store::NotificationStore;
use vulnwatch_core::types::{AlertConfig, AlertFrequency};

use super::{ApiError, AppState, AuthUser};

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlertConfigUpdate {
    pub email_notifications: Option<bool>,
    pub daily_digest: Option<bool>,
    pub security_alerts: Option<bool>,
    pub alert_frequency: Option<AlertFrequency>,
}

impl AlertConfigUpdate {
    /// Merge into an existing configuration.
    pub fn apply(self, mut config: AlertConfig) -> AlertConfig {
        if let Some(v) = self.email_notifications {
            config.email_notifications = v;
        }
        if let Some(v) = self.daily_digest {
            config.daily_digest = v;
        }
        if let Some(v) = self.security_alerts {
            config.security_alerts = v;
        }
        if let Some(v) = self.alert_frequency {
            config.alert_frequency = v;
        }
        config
    }
}

/// `GET /api/alerts/config`
pub async fn get_config(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<AlertConfig>, ApiError> {
    Ok(Json(state.store().alert_config(user_id).await?))
}

/// `PUT /api/alerts/config`
pub async fn update_config(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(update): Json<AlertConfigUpdate>,
) -> Result<Json<AlertConfig>, ApiError> {
    let current = state.store().alert_config(user_id).await?;
    let updated = update.apply(current);
    state.store().set_alert_config(updated.clone()).await?;
    tracing::info!(
        user_id,
        frequency = %updated.alert_frequency,
        email = updated.email_notifications,
        "alert configuration updated"
    );
    Ok(Json(updated))
}
