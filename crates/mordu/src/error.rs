//! Error types for mordu

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mongodb::error::{ErrorKind, WriteFailure};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mordu operations
pub type MorduResult<T> = Result<T, MorduError>;

/// MongoDB duplicate key error code
const DUPLICATE_KEY_CODE: i32 = 11000;

/// mordu error types
#[derive(Debug, Error)]
pub enum MorduError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote store unreachable or timed out. Recoverable; the engine backs off.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Remote rejected a write because the origin-reference is already stored.
    #[error("Duplicate origin reference: {0}")]
    Duplicate(String),

    /// Local collection file exists but cannot be parsed. Fatal at open.
    #[error("Corrupt collection file {}: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MorduError {
    /// Whether the failure is worth retrying on a later cycle
    pub fn is_connectivity(&self) -> bool {
        matches!(self, MorduError::Connectivity(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, MorduError::Duplicate(_))
    }
}

impl From<std::io::Error> for MorduError {
    fn from(err: std::io::Error) -> Self {
        MorduError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MorduError {
    fn from(err: serde_json::Error) -> Self {
        MorduError::Serialization(err.to_string())
    }
}

impl From<bson::ser::Error> for MorduError {
    fn from(err: bson::ser::Error) -> Self {
        MorduError::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for MorduError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        MorduError::Connectivity("operation timed out".to_string())
    }
}

impl From<mongodb::error::Error> for MorduError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE => {
                MorduError::Duplicate(e.message.clone())
            }
            ErrorKind::Command(e) if e.code == DUPLICATE_KEY_CODE => {
                MorduError::Duplicate(e.message.clone())
            }
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => MorduError::Connectivity(err.to_string()),
            _ => MorduError::Database(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for MorduError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            MorduError::Connectivity(err.to_string())
        } else if err.is_decode() {
            MorduError::Serialization(err.to_string())
        } else {
            MorduError::Internal(err.to_string())
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl MorduError {
    /// Convert to API error code
    pub fn code(&self) -> &'static str {
        match self {
            MorduError::NotFound(_) => "NOT_FOUND",
            MorduError::Validation(_) => "VALIDATION_ERROR",
            MorduError::Connectivity(_) => "STORE_UNAVAILABLE",
            MorduError::Duplicate(_) => "DUPLICATE",
            MorduError::Corruption { .. } => "CORRUPTION",
            MorduError::Database(_) => "DATABASE_ERROR",
            MorduError::Io(_) => "IO_ERROR",
            MorduError::Serialization(_) => "SERIALIZATION_ERROR",
            MorduError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            MorduError::NotFound(_) => StatusCode::NOT_FOUND,
            MorduError::Validation(_) => StatusCode::BAD_REQUEST,
            MorduError::Duplicate(_) => StatusCode::CONFLICT,
            MorduError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            MorduError::Corruption { .. }
            | MorduError::Database(_)
            | MorduError::Io(_)
            | MorduError::Serialization(_)
            | MorduError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MorduError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiError {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
        };

        (status, axum::Json(body)).into_response()
    }
}
