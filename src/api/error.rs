use crate::services::upload_service::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// The request body could not be read.
    #[error("{1}")]
    Body(StatusCode, String),
}

pub fn status_for(err: &UploadError) -> StatusCode {
    match err {
        UploadError::InvalidArgument(_)
        | UploadError::InvalidPart(_)
        | UploadError::MissingPart(_)
        | UploadError::DuplicatePart(_)
        | UploadError::PartTooSmall { .. } => StatusCode::BAD_REQUEST,
        UploadError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        UploadError::SessionClosed { .. } => StatusCode::CONFLICT,
        UploadError::BackendUnavailable(_) | UploadError::CompletionFailed(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        UploadError::BackendRejected(_) => StatusCode::BAD_GATEWAY,
        UploadError::Store(_) | UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retryable, message) = match self {
            AppError::Upload(e) => {
                let status = status_for(&e);
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal error: {:?}", e);
                    "Internal Server Error".to_string()
                } else {
                    if status.is_server_error() {
                        tracing::warn!("Upstream storage error: {}", e);
                    }
                    e.to_string()
                };
                (status, e.code(), e.is_retryable(), message)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", false, msg),
            AppError::Body(status, msg) => (status, "INVALID_PART", false, msg),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}
