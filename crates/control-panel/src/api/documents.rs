//! PDF upload with one-time code pairing
//!
//! A request carrying only `pdf_file` starts a new attempt. A request carrying
//! only `one_time_code` completes the attempt parked for this browser. A request
//! carrying both parks the file and submits the code in one step.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Multipart, State},
};
use device_sync::UploadOutcome;

use super::{ApiError, ApiResult, needs_auth, success};
use crate::AppState;
use crate::session::UserContext;

const UPLOADED: &str = "PDF uploaded successfully to your reMarkable device.";
const AUTH_REQUIRED: &str = "Authentication required to upload to reMarkable.";

/// POST /api/documents
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(UserContext(user)): Extension<UserContext>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut code = String::new();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "pdf_file" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if !original.is_empty() {
                    file = Some((original, bytes.to_vec()));
                }
            }
            "one_time_code" => code = field.text().await?.trim().to_string(),
            _ => {}
        }
    }

    let outcome = match (file, code.is_empty()) {
        (Some((original, bytes)), true) => {
            state.pairing.attempt_upload(&user, &original, &bytes).await?
        }
        (Some((original, bytes)), false) => {
            state.pairing.park(&user, &original, &bytes).await?;
            state.pairing.submit_code(&user, &code).await?
        }
        (None, false) => state.pairing.submit_code(&user, &code).await?,
        (None, true) => return Err(ApiError::bad_request("No file uploaded")),
    };

    Ok(match outcome {
        UploadOutcome::Registered => success(UPLOADED),
        UploadOutcome::AwaitingCode => needs_auth(AUTH_REQUIRED),
    })
}
