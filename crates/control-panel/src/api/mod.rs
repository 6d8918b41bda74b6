//! JSON API handlers.
//!
//! Every response except raw image bytes is an envelope
//! `{success, message, ...}`; pairing failures add `needsAuth`.

pub mod device;
pub mod documents;
pub mod images;
pub mod settings;
pub mod templates;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

pub type ApiResult = Result<Response, ApiError>;

fn envelope(status: StatusCode, success: bool, message: String, extra: Value) -> Response {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(success));
    body.insert("message".to_string(), Value::String(message));
    if let Value::Object(fields) = extra {
        body.extend(fields);
    }
    (status, Json(Value::Object(body))).into_response()
}

pub fn success(message: impl Into<String>) -> Response {
    envelope(StatusCode::OK, true, message.into(), Value::Null)
}

/// Success envelope with operation-specific fields merged in.
pub fn success_with(message: impl Into<String>, extra: Value) -> Response {
    envelope(StatusCode::OK, true, message.into(), extra)
}

/// A completed request that still asks the user for a pairing code.
pub fn needs_auth(message: impl Into<String>) -> Response {
    envelope(
        StatusCode::OK,
        false,
        message.into(),
        serde_json::json!({ "needsAuth": true }),
    )
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    needs_auth: bool,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            needs_auth: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            needs_auth: false,
        }
    }
}

impl From<device_sync::Error> for ApiError {
    fn from(err: device_sync::Error) -> Self {
        use device_sync::Error as E;

        let status = match &err {
            E::ContentMissing(_) => StatusCode::NOT_FOUND,
            E::UnsupportedContentType(_)
            | E::InvalidCodeFormat
            | E::InvalidCode
            | E::NoPendingUpload
            | E::InvalidName(_)
            | E::InvalidRemotePath(_) => StatusCode::BAD_REQUEST,
            E::NoRemoteConfigured => StatusCode::CONFLICT,
            E::TransferFailed(_)
            | E::ManifestUnreadable(_)
            | E::ManifestUpdateFailed(_)
            | E::BackupFailed(_)
            | E::PermissionFixFailed(_) => StatusCode::BAD_GATEWAY,
            E::Library(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", err);
        }
        Self {
            status,
            needs_auth: err.needs_auth(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid JSON: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(format!("Invalid upload: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let extra = if self.needs_auth {
            serde_json::json!({ "needsAuth": true })
        } else {
            Value::Null
        };
        envelope(self.status, false, self.message, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_map_to_status() {
        let err = ApiError::from(device_sync::Error::ContentMissing("a.png".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(!err.needs_auth);

        let err = ApiError::from(device_sync::Error::BackupFailed("cp: denied".into()));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("cp: denied"));

        let err = ApiError::from(device_sync::Error::InvalidCode);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.needs_auth);
    }
}
