// src/error.rs

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

use crate::{store::DataError, utils::validation::messages};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (stale version)
    Conflict(String),

    // 422 Unprocessable Entity, one message per invalid field
    ValidationFailed(ValidationErrors),
}

impl AppError {
    pub fn not_found() -> Self {
        AppError::NotFound("the requested resource could not be found".to_string())
    }

    pub fn edit_conflict() -> Self {
        AppError::Conflict("unable to update the record due to an edit conflict, please try again".to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!("the server encountered a problem and could not process your request"),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!(msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!(msg)),
            AppError::ValidationFailed(errors) => (StatusCode::UNPROCESSABLE_ENTITY, json!(messages(&errors))),
        };

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Maps store outcomes onto responses: expected outcomes keep their meaning,
/// everything else becomes a 500.
impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound => AppError::not_found(),
            DataError::EditConflict => AppError::edit_conflict(),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::ValidationFailed(errors)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}
