//! Device connectivity, restart and configuration endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiResult, success, success_with};
use crate::AppState;

/// GET /api/connection
pub async fn check_connection(State(state): State<Arc<AppState>>) -> ApiResult {
    state.device.check_connection().await?;
    Ok(success("Connected to device"))
}

/// POST /api/device/restart
pub async fn restart(State(state): State<Arc<AppState>>) -> ApiResult {
    state.device.restart().await?;
    Ok(success("Device UI restarted"))
}

/// GET /api/device/config
pub async fn read_config(State(state): State<Arc<AppState>>) -> ApiResult {
    let config = state.device.read_config().await?;
    Ok(success_with("", json!({ "config": config })))
}

#[derive(Debug, Deserialize)]
pub struct WriteConfigRequest {
    pub config: String,
    #[serde(default)]
    pub restart: bool,
}

/// POST /api/device/config
pub async fn write_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WriteConfigRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    state.device.write_config(&req.config, req.restart).await?;

    let message = if req.restart {
        "Configuration saved and device UI restarted"
    } else {
        "Configuration saved"
    };
    Ok(success(message))
}
