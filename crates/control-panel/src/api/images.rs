//! System image endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResult, success, success_with};
use crate::AppState;

/// GET /api/images
pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult {
    let images = state.images.list_system_images().await?;
    Ok(success_with("", json!({ "images": images })))
}

#[derive(Debug, Deserialize)]
pub struct RawQuery {
    #[serde(default)]
    pub path: String,
}

/// GET /api/images/raw?path= - PNG bytes, used for thumbnails and full views
pub async fn raw(State(state): State<Arc<AppState>>, Query(query): Query<RawQuery>) -> ApiResult {
    if query.path.is_empty() {
        return Err(ApiError::bad_request("Missing path parameter"));
    }

    let bytes = state.images.fetch_image(&query.path).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRequest {
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub replacement_filename: String,
}

/// POST /api/images/replace
pub async fn replace(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReplaceRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    if req.target_path.is_empty() || req.replacement_filename.is_empty() {
        return Err(ApiError::bad_request(
            "Missing target path or replacement filename",
        ));
    }

    state
        .images
        .replace(&req.target_path, &req.replacement_filename)
        .await?;
    Ok(success("System image replaced successfully"))
}
