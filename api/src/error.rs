//! Error types for the API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types following RFC 7807 Problem Details.
///
/// Pipeline runs never surface here: a run whose stages failed is still a
/// 200 with `success` set accordingly. These are for requests that cannot
/// be served at all.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400) - malformed request
    BadRequest(String),

    /// Validation error (400) - specific field validation failed
    ValidationError {
        field: String,
        message: String,
        request_id: Option<String>,
    },

    /// Not found (404)
    NotFound(String),

    /// Internal server error (500)
    Internal(String),
}

impl ApiError {
    /// Shorthand for a field-level [`ApiError::ValidationError`].
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
            request_id: None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            Self::ValidationError { field, message, .. } => {
                write!(f, "Validation Error [field: {}]: {}", field, message)
            }
            Self::NotFound(msg) => write!(f, "Not Found: {}", msg),
            Self::Internal(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// RFC 7807 Problem Details response.
#[derive(Debug, Serialize, Deserialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    type_uri: String,
    title: String,
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    /// Field-specific validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title, detail, request_id, errors) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", msg, None, None),
            Self::ValidationError {
                field,
                message,
                request_id,
            } => (
                StatusCode::BAD_REQUEST,
                "Validation Error",
                format!("Field '{}': {}", field, message),
                request_id,
                Some(serde_json::json!({ field: message })),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg, None, None),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", msg, None, None),
        };

        let problem = ProblemDetails {
            type_uri: format!("/errors/{}", title.to_lowercase().replace(' ', "-")),
            title: title.to_string(),
            status: status.as_u16(),
            detail,
            request_id,
            errors,
        };

        (status, Json(problem)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("Failed to encode response: {}", err))
    }
}
