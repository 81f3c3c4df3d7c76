use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::media::{FailureReason, ItemFailure, MediaError};

/// AppError
///
/// The request-level error taxonomy. Every handler and every core component that can fail
/// on behalf of a caller returns this type, and the `IntoResponse` impl below is the single
/// place where a variant becomes a transport status.
///
/// `Unauthenticated` carries no detail: the gate logs the verification reason and the
/// caller only ever learns that authentication failed.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, expired or otherwise unusable credentials, or a deactivated identity.
    #[error("authentication required")]
    Unauthenticated,

    /// Valid identity, but the role or resource ownership does not allow the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input: bad payload, rejected upload, batch or quota pre-flight failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// The request body exceeded the configured upload ceiling.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unique constraint on a user-supplied value (email, username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The object store rejected or failed a single-item operation.
    #[error("storage error: {0}")]
    StoreFailed(String),

    /// A batch upload where not a single item made it through.
    #[error("no file in the batch could be uploaded")]
    UploadFailed { failed: Vec<ItemFailure> },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::UploadFailed { failed } => {
                if failed.iter().all(|f| f.reason == FailureReason::StoreFailed) {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            }
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the caller. Store and database diagnostics stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::StoreFailed(_) => "storage backend rejected the request".to_string(),
            AppError::Database(_) | AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::StoreFailed(detail) => tracing::error!("object store failure: {}", detail),
            AppError::Database(e) => tracing::error!("database failure: {:?}", e),
            AppError::Internal(detail) => tracing::error!("internal failure: {}", detail),
            _ => {}
        }

        let mut body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.public_message(),
            }
        });
        if let AppError::UploadFailed { failed } = &self {
            body["failed"] = serde_json::to_value(failed).unwrap_or_default();
        }

        (status, Json(body)).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(e.body_text())
        } else {
            AppError::Validation(format!("malformed multipart body: {}", e.body_text()))
        }
    }
}

impl From<MediaError> for AppError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::StoreFailed(detail) => AppError::StoreFailed(detail),
            MediaError::ForeignTemp(url) => {
                AppError::Forbidden(format!("not your temporary upload: {}", url))
            }
            other => AppError::Validation(other.to_string()),
        }
    }
}
