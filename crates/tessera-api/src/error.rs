//! API error handling
//!
//! Every failure leaves the server as
//! `{"success": false, "error": {"code", "message", "details"?}}`.
//! Lower-layer errors are converted here; internal details are logged and
//! never returned to the caller.
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tessera_core::StoreError;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;

/// Message returned for every authentication failure
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or expired credentials";

/// API error body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Per-field validation details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Error envelope
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::BadRequest { message, details } => {
                let error = ApiError::new("BAD_REQUEST", message);
                match details {
                    Some(details) => error.with_details(details),
                    None => error,
                }
            }
            AppError::Unauthorized => ApiError::new("UNAUTHORIZED", UNAUTHORIZED_MESSAGE),
            AppError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::NotFound(resource) => {
                ApiError::new("NOT_FOUND", format!("{resource} not found"))
            }
            AppError::TooManyRequests => ApiError::new(
                "TOO_MANY_REQUESTS",
                "Rate limit exceeded. Please try again later.",
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                ApiError::new("INTERNAL_ERROR", "Internal server error")
            }
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(resource) => AppError::NotFound(resource),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Database(msg) => AppError::Internal(format!("store: {msg}")),
            StoreError::InvalidData(msg) => AppError::Internal(format!("stored data: {msg}")),
        }
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Encoding(e) => AppError::Internal(format!("token encoding: {e}")),
            _ => AppError::Unauthorized,
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(format!("password hasher: {err}"))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let details: serde_json::Map<String, serde_json::Value> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages: Vec<serde_json::Value> = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                            .into()
                    })
                    .collect();
                (field.to_string(), serde_json::Value::Array(messages))
            })
            .collect();

        AppError::BadRequest {
            message: "Validation failed".to_string(),
            details: Some(serde_json::Value::Object(details)),
        }
    }
}
