//! Template library and device template endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State, rejection::JsonRejection},
};
use device_sync::ContentKind;
use device_sync::library::DEFAULT_TEMPLATE_NAME;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResult, success, success_with};
use crate::AppState;

/// GET /api/templates/local
pub async fn list_local(State(state): State<Arc<AppState>>) -> ApiResult {
    let templates = state.library.list()?;
    Ok(success_with("", json!({ "templates": templates })))
}

/// POST /api/templates/local - multipart `template_file`, `template_name`
pub async fn upload_local(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut name = String::new();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "template_file" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((original, bytes.to_vec()));
            }
            "template_name" => name = field.text().await?.trim().to_string(),
            _ => {}
        }
    }

    let Some((original, bytes)) = file else {
        return Err(ApiError::bad_request("No file uploaded"));
    };
    ContentKind::Template.check(&original)?;

    if name.is_empty() {
        name = DEFAULT_TEMPLATE_NAME.to_string();
    }
    let filename = state
        .library
        .store(&bytes, &name, ContentKind::Template.extension())?;

    Ok(success_with(
        "Template uploaded to local library successfully",
        json!({ "filename": filename, "name": name }),
    ))
}

/// GET /api/templates/device
pub async fn list_device(State(state): State<Arc<AppState>>) -> ApiResult {
    let templates = state.sync.device_templates().await?;
    Ok(success_with("", json!({ "templates": templates })))
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub name: String,
}

/// POST /api/templates/push
pub async fn push(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    if req.filename.is_empty() || req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Missing filename or template name"));
    }

    state.sync.push_to_remote(&req.filename, req.name.trim()).await?;
    Ok(success("Template uploaded to device successfully"))
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub filename: String,
}

/// POST /api/templates/pull
pub async fn pull(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    if req.filename.is_empty() {
        return Err(ApiError::bad_request("Missing filename"));
    }

    let item = state.sync.pull_from_remote(&req.filename).await?;
    Ok(success_with(
        "Template downloaded successfully",
        json!({ "template": item }),
    ))
}
