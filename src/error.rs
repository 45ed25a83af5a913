use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::query::InvalidQuery;

/// Error type for API handlers
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl ApiError {
    pub fn internal(message: impl Into<String>, err: &anyhow::Error) -> Self {
        ApiError::Internal {
            message: message.into(),
            details: Some(format!("{err:#}")),
        }
    }

    /// Invalid filters become 400s; anything else is a 500 under `message`.
    pub fn from_query(message: &str, err: anyhow::Error) -> Self {
        match err.downcast_ref::<InvalidQuery>() {
            Some(invalid) => ApiError::BadRequest(invalid.to_string()),
            None => ApiError::internal(message, &err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Internal { message, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message, "details": details }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal {
            message: "Background task failed".to_string(),
            details: Some(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
