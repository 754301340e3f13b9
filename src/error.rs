use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Recorder failures
///
/// Ingestion never hands these back to the observed application; they only
/// surface from `initialize`, the read side and maintenance operations.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Store could not be reached or a statement failed
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Entry could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid setting
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Main index was cleaned but a tag index was not
    #[error("partial cleanup: {0}")]
    PartialCleanup(String),

    /// Read attempted before `initialize`
    #[error("recorder store is not initialized")]
    NotInitialized,

    /// Entry or filter that does not fit the model
    #[error("invalid entry: {0}")]
    InvalidEntry(String),
}

impl From<sqlx::Error> for RecorderError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for RecorderError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::StoreUnavailable(format!("migration failed: {}", err))
    }
}

pub type Result<T, E = RecorderError> = std::result::Result<T, E>;

/// HTTP-facing error of the query API
#[derive(Debug)]
pub enum AppError {
    /// Malformed query parameter
    BadRequest(String),
    /// Unknown entry or watcher
    NotFound(String),
    /// Store not initialized or unreachable
    Unavailable(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::BadRequest(_) => "bad_request",
        AppError::NotFound(_) => "not_found",
        AppError::Unavailable(_) => "store_unavailable",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<RecorderError> for AppError {
    fn from(err: RecorderError) -> Self {
        match err {
            RecorderError::StoreUnavailable(_) | RecorderError::NotInitialized => {
                Self::Unavailable(err.to_string())
            }
            RecorderError::InvalidEntry(_) => Self::BadRequest(err.to_string()),
            RecorderError::Serialization(_)
            | RecorderError::Configuration(_)
            | RecorderError::PartialCleanup(_) => Self::InternalError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}
