//! Structured error types with machine-readable codes and HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation errors (400)
    InvalidInput { field: String, reason: String },
    InvalidCanvasPath(String),
    MissingTargetTime,

    // Not found errors (404)
    OperationNotFound(String),
    SnapshotNotFound(String),
    /// TIMEPOINT resolution found no snapshot at or before the target time.
    NoSnapshotBeforeTime(String),

    // Conflict errors (409)
    DuplicateOperation(String),

    // Internal errors (500)
    /// Malformed JSON in a stored canvas or index file. Never auto-repaired.
    CanvasDecode { path: String, reason: String },
    /// The pre-rollback checkpoint could not be created.
    BackupFailure(String),
    StorageError(String),
    SerializationError(String),
    CompressionError(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidCanvasPath(_) => "INVALID_CANVAS_PATH",
            Self::MissingTargetTime => "MISSING_TARGET_TIME",
            Self::OperationNotFound(_) => "OPERATION_NOT_FOUND",
            Self::SnapshotNotFound(_) => "SNAPSHOT_NOT_FOUND",
            Self::NoSnapshotBeforeTime(_) => "NO_SNAPSHOT_BEFORE_TIME",
            Self::DuplicateOperation(_) => "DUPLICATE_OPERATION",
            Self::CanvasDecode { .. } => "CANVAS_DECODE_ERROR",
            Self::BackupFailure(_) => "BACKUP_FAILURE",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::CompressionError(_) => "COMPRESSION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::InvalidCanvasPath(_) | Self::MissingTargetTime => {
                StatusCode::BAD_REQUEST
            }

            Self::OperationNotFound(_)
            | Self::SnapshotNotFound(_)
            | Self::NoSnapshotBeforeTime(_) => StatusCode::NOT_FOUND,

            Self::DuplicateOperation(_) => StatusCode::CONFLICT,

            Self::CanvasDecode { .. }
            | Self::BackupFailure(_)
            | Self::StorageError(_)
            | Self::SerializationError(_)
            | Self::CompressionError(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::InvalidCanvasPath(path) => format!("Invalid canvas path: {path}"),
            Self::MissingTargetTime => {
                "target_time is required for TIMEPOINT rollback".to_string()
            }
            Self::OperationNotFound(id) => format!("Operation not found: {id}"),
            Self::SnapshotNotFound(id) => format!("Snapshot not found: {id}"),
            Self::NoSnapshotBeforeTime(detail) => format!("No snapshot found {detail}"),
            Self::DuplicateOperation(id) => format!("Operation already recorded: {id}"),
            Self::CanvasDecode { path, reason } => {
                format!("Failed to decode canvas '{path}': {reason}")
            }
            Self::BackupFailure(msg) => format!("Pre-rollback backup failed: {msg}"),
            Self::StorageError(msg) => format!("Storage error: {msg}"),
            Self::SerializationError(msg) => format!("Serialization error: {msg}"),
            Self::CompressionError(msg) => format!("Compression error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// True for errors raised while resolving a rollback target, before
    /// anything was written.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OperationNotFound(_) | Self::SnapshotNotFound(_) | Self::NoSnapshotBeforeTime(_)
        )
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details: None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_response();

        (status, Json(body)).into_response()
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
