//! Connection settings endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::json;

use super::{ApiError, ApiResult, success, success_with};
use crate::AppState;
use crate::settings::SettingsUpdate;

/// GET /api/settings - the password itself is never returned
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult {
    let settings = state.settings.get();
    Ok(success_with(
        "",
        json!({
            "settings": {
                "host": settings.host,
                "user": settings.user,
                "hasPassword": !settings.password.is_empty(),
            }
        }),
    ))
}

/// POST /api/settings
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = payload?;
    if update.host.trim().is_empty() || update.user.trim().is_empty() {
        return Err(ApiError::bad_request(
            "Missing required settings: host and user",
        ));
    }

    state.settings.save(update).map_err(|e| {
        tracing::error!("Failed to save settings: {:?}", e);
        ApiError::internal("Failed to save settings")
    })?;
    Ok(success("Settings saved successfully"))
}
